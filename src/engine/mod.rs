//! Engine module
//!
//! Scheduling and real-time execution of the processing graph.
//! Handles plan compilation, buffer allocation, the lock-free hand-off to
//! the audio thread, device (cpal) integration and MIDI input (midir).

pub mod audio_engine;
pub mod buffer_pool;
pub mod channels;
pub mod commands;
pub mod device;
pub mod error;
pub mod midi_engine;
pub mod plan;
pub mod runner;
pub mod scheduler;

pub use audio_engine::{Engine, EngineMetrics, EngineSettings, EngineState};
pub use buffer_pool::BufferPool;
pub use channels::{
    ControlHandle, EngineChannels, RunnerHandle, DEFAULT_COMMAND_BUFFER_SIZE,
    DEFAULT_RETIRE_BUFFER_SIZE,
};
pub use commands::{Retired, RunnerCommand, SlotEntry};
pub use device::{
    enumerate_devices, AudioDriver, CpalDriver, DeviceCallback, DeviceConfig, DeviceInfo,
    OfflineDriver,
};
pub use error::{CompileError, DeviceError, EngineError};
pub use midi_engine::{MidiDeviceInfo, MidiEngine, MidiError, DEFAULT_MIDI_BUFFER_SIZE};
pub use plan::{BufferId, BufferSpec, CompiledPlan, MixStep, PlanStep};
pub use runner::{AudioRunner, CallbackSlot, RunnerConfig, RunnerCounters, RunnerStatus};
pub use scheduler::{execution_order, CompileOptions, Scheduler};
