//! Structural errors raised by graph edits.

use thiserror::Error;

use crate::dsp::{PortDirection, SignalType};

use super::edge::Edge;
use super::node::NodeId;
use super::validation::incompatibility_reason;

/// Errors returned by [`Graph`](super::Graph) mutations.
///
/// A failed call leaves the graph exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The node was already added to a graph.
    #[error("node already belongs to a graph as {0}")]
    DuplicateNode(NodeId),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has no {} port {index}", direction.name().to_lowercase())]
    UnknownPort {
        node: NodeId,
        direction: PortDirection,
        index: usize,
    },

    #[error(
        "cannot connect {} output to {} input: {}",
        from.name(),
        to.name(),
        incompatibility_reason(*from, *to)
    )]
    IncompatiblePortKind { from: SignalType, to: SignalType },

    /// A second source into an input that does not sum.
    #[error("input {node}:{index} already has a source and does not sum")]
    InputAlreadyConnected { node: NodeId, index: usize },

    #[error("edge {0} already exists")]
    DuplicateEdge(Edge),

    #[error("no edge {0}")]
    UnknownEdge(Edge),

    #[error("edge {0} would create an audio-rate cycle")]
    WouldCreateCycle(Edge),

    #[error("node {node} has no parameter '{name}'")]
    UnknownParameter { node: NodeId, name: String },
}
