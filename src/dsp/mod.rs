//! DSP module
//!
//! Core node contract and the data that flows between nodes: signal kinds
//! and buffers, ports, parameters, the process context and the registry of
//! built-in processor types.

pub mod context;
pub mod parameter;
pub mod port;
pub mod processor;
pub mod ramp;
pub mod registry;
pub mod signal;

#[cfg(test)]
pub mod test_support;

pub use context::ProcessContext;
pub use parameter::{ParameterBank, ParameterDefinition};
pub use port::{PortDefinition, PortDirection};
pub use processor::{port_counts, Inputs, IoRole, ModuleCategory, ModuleInfo, Processor};
pub use ramp::Ramp;
pub use registry::{ModuleFactory, ModuleRegistry};
pub use signal::{EventBuffer, MidiEvent, MidiMessage, PortBuffer, SignalBuffer, SignalType};
