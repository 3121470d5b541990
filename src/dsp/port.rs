//! Port definitions for processors.
//!
//! Ports are the connection points on nodes where signals flow in and out.
//! A port's kind, direction and width are fixed once the processor exists.

use serde::{Deserialize, Serialize};

use super::SignalType;

/// Direction of a port on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// An input port that receives signals.
    Input,
    /// An output port that sends signals.
    Output,
}

impl PortDirection {
    /// Returns a human-readable name for the port direction.
    pub fn name(&self) -> &'static str {
        match self {
            PortDirection::Input => "Input",
            PortDirection::Output => "Output",
        }
    }
}

/// Definition of a port on a processor.
///
/// Each port has a unique ID within the processor, a display name,
/// a direction (input/output), a signal type and a channel width.
#[derive(Clone, Debug, PartialEq)]
pub struct PortDefinition {
    /// Unique identifier for this port within the processor.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Whether this is an input or output port.
    pub direction: PortDirection,
    /// The type of signal this port accepts or produces.
    pub signal_type: SignalType,
    /// Number of channels carried by the port.
    pub channels: usize,
    /// Whether an input accepts several sources and sums (or merges) them.
    /// Ignored for outputs.
    pub summing: bool,
    /// Value an unconnected input reads. Ignored for outputs.
    pub default_value: f32,
}

impl PortDefinition {
    /// Creates a new mono input port.
    ///
    /// Event inputs merge their sources; audio and control inputs accept a
    /// single source unless built with [`PortDefinition::summing`].
    pub fn input(id: &'static str, name: &'static str, signal_type: SignalType) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Input,
            signal_type,
            channels: 1,
            summing: signal_type == SignalType::Event,
            default_value: 0.0,
        }
    }

    /// Creates a new input port with a custom default value.
    pub fn input_with_default(
        id: &'static str,
        name: &'static str,
        signal_type: SignalType,
        default_value: f32,
    ) -> Self {
        Self {
            default_value,
            ..Self::input(id, name, signal_type)
        }
    }

    /// Creates a new mono output port.
    pub fn output(id: &'static str, name: &'static str, signal_type: SignalType) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Output,
            signal_type,
            channels: 1,
            summing: false,
            default_value: 0.0,
        }
    }

    /// Sets the channel width.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// Marks an input as accepting several sources.
    pub fn summing(mut self) -> Self {
        self.summing = true;
        self
    }

    /// Returns true if this is an input port.
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Returns true if this is an output port.
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_direction_names() {
        assert_eq!(PortDirection::Input.name(), "Input");
        assert_eq!(PortDirection::Output.name(), "Output");
    }

    #[test]
    fn test_input_port_creation() {
        let port = PortDefinition::input("audio_in", "Audio In", SignalType::Audio);
        assert_eq!(port.id, "audio_in");
        assert!(port.is_input());
        assert!(!port.is_output());
        assert_eq!(port.channels, 1);
        assert!(!port.summing);
        assert_eq!(port.default_value, 0.0);
    }

    #[test]
    fn test_event_inputs_merge_by_default() {
        let port = PortDefinition::input("midi", "MIDI", SignalType::Event);
        assert!(port.summing);
    }

    #[test]
    fn test_builder_flags() {
        let port = PortDefinition::input("in", "In", SignalType::Audio)
            .with_channels(2)
            .summing();
        assert_eq!(port.channels, 2);
        assert!(port.summing);

        let zero = PortDefinition::output("out", "Out", SignalType::Audio).with_channels(0);
        assert_eq!(zero.channels, 1);
    }

    #[test]
    fn test_input_port_with_default() {
        let port = PortDefinition::input_with_default("cv", "CV", SignalType::Control, 1.0);
        assert_eq!(port.default_value, 1.0);
        assert!(port.is_input());
    }
}
