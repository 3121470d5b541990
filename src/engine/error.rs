//! Engine error types.

use thiserror::Error;

use crate::graph::{Edge, GraphError, NodeId};
use crate::plugin::InstantiationError;

use super::device::DeviceConfig;

/// Compilation failures. The previously published plan stays live.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("audio-rate cycle through nodes {nodes:?}")]
    CycleDetected { nodes: Vec<NodeId> },

    #[error(
        "edge {edge} joins a {source_channels}-channel output to a {dest_channels}-channel input"
    )]
    PortArityMismatch {
        edge: Edge,
        source_channels: usize,
        dest_channels: usize,
    },

    #[error("plan needs {needed} buffers, limit is {limit}")]
    OutOfBuffers { needed: usize, limit: usize },
}

/// Errors from the audio device boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no audio output device found")]
    NoOutputDevice,

    #[error("audio device '{0}' not found")]
    DeviceNotFound(String),

    #[error("failed to query device configuration: {0}")]
    Configuration(String),

    #[error("failed to create audio stream: {0}")]
    StreamCreation(String),

    #[error("failed to control audio playback: {0}")]
    Playback(String),

    #[error("audio device is already open")]
    AlreadyOpen,

    #[error("audio device is not open")]
    NotOpen,
}

/// Errors returned by [`Engine`](super::Engine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("device configuration {config} is not supported: {reason}")]
    DeviceConfigUnsupported { config: DeviceConfig, reason: String },

    #[error("cannot {operation} while the engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    #[error("engine command queue is full")]
    QueueFull,

    #[error("all {limit} processor slots are in use")]
    NodeCapacity { limit: usize },

    #[error("node {0} has no processor to run")]
    MissingProcessor(NodeId),

    #[error("audio driver did not hand the runner back on close")]
    RunnerLost,
}
