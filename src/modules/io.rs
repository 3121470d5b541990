//! Device endpoint modules.
//!
//! These nodes connect the graph to the audio device. They do no work in
//! `process`; the runner fills the outputs of the input endpoints from the
//! device before the plan runs and adds the input of the output endpoint
//! into the device buffer after its step.

use crate::dsp::{
    Inputs, IoRole, ModuleCategory, ModuleInfo, ParameterDefinition, PortBuffer, PortDefinition,
    ProcessContext, Processor, SignalType,
};

/// Width of the device endpoints' audio ports.
pub const DEVICE_CHANNELS: usize = 2;

/// The audio output endpoint that routes audio to the speakers.
///
/// # Ports
///
/// - **In** (Audio, stereo, summing): everything connected here is summed
///   and written to the device. A mono source is broadcast to both sides.
///   Device channels beyond the second wrap around.
pub struct AudioOutput {
    ports: Vec<PortDefinition>,
}

impl AudioOutput {
    /// Creates a new audio output endpoint.
    pub fn new() -> Self {
        Self {
            ports: vec![PortDefinition::input("in", "In", SignalType::Audio)
                .with_channels(DEVICE_CHANNELS)
                .summing()],
        }
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for AudioOutput {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "io.audio_out",
            name: "Audio Output",
            category: ModuleCategory::Io,
            description: "Sends its summed input to the audio device",
        };
        &INFO
    }

    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }

    fn parameters(&self) -> &[ParameterDefinition] {
        &[]
    }

    fn prepare(&mut self, _sample_rate: f32, _max_block_size: usize) {}

    fn process(&mut self, _: &Inputs<'_>, _: &mut [PortBuffer], _: &[f32], _: &ProcessContext) {}

    fn io_role(&self) -> IoRole {
        IoRole::AudioOutput
    }
}

/// The audio input endpoint.
///
/// # Ports
///
/// - **Out** (Audio, stereo): the device input for this block. With a mono
///   device both sides carry the same signal; with no input channels the
///   output stays silent.
pub struct AudioInput {
    ports: Vec<PortDefinition>,
}

impl AudioInput {
    /// Creates a new audio input endpoint.
    pub fn new() -> Self {
        Self {
            ports: vec![PortDefinition::output("out", "Out", SignalType::Audio)
                .with_channels(DEVICE_CHANNELS)],
        }
    }
}

impl Default for AudioInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for AudioInput {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "io.audio_in",
            name: "Audio Input",
            category: ModuleCategory::Io,
            description: "Reads the audio device input",
        };
        &INFO
    }

    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }

    fn parameters(&self) -> &[ParameterDefinition] {
        &[]
    }

    fn prepare(&mut self, _sample_rate: f32, _max_block_size: usize) {}

    fn process(&mut self, _: &Inputs<'_>, _: &mut [PortBuffer], _: &[f32], _: &ProcessContext) {}

    fn io_role(&self) -> IoRole {
        IoRole::AudioInput
    }
}

/// The MIDI input endpoint.
///
/// # Ports
///
/// - **MIDI** (Event): events received from the connected MIDI port since
///   the previous callback, all at offset zero.
pub struct MidiInput {
    ports: Vec<PortDefinition>,
}

impl MidiInput {
    /// Creates a new MIDI input endpoint.
    pub fn new() -> Self {
        Self {
            ports: vec![PortDefinition::output("midi", "MIDI", SignalType::Event)],
        }
    }
}

impl Default for MidiInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for MidiInput {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "io.midi_in",
            name: "MIDI Input",
            category: ModuleCategory::Io,
            description: "Events from the connected MIDI port",
        };
        &INFO
    }

    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }

    fn parameters(&self) -> &[ParameterDefinition] {
        &[]
    }

    fn prepare(&mut self, _sample_rate: f32, _max_block_size: usize) {}

    fn process(&mut self, _: &Inputs<'_>, _: &mut [PortBuffer], _: &[f32], _: &ProcessContext) {}

    fn io_role(&self) -> IoRole {
        IoRole::MidiInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DeviceConfig, Engine, EngineSettings, OfflineDriver};
    use crate::graph::{Node, NodeKind, PortRef};
    use crate::modules::SineOscillator;

    fn builtin(processor: impl Processor) -> Node {
        let id = processor.info().id;
        Node::new(NodeKind::builtin(id), Box::new(processor))
    }

    #[test]
    fn test_endpoint_roles() {
        assert_eq!(AudioOutput::new().io_role(), IoRole::AudioOutput);
        assert_eq!(AudioInput::new().io_role(), IoRole::AudioInput);
        assert_eq!(MidiInput::new().io_role(), IoRole::MidiInput);
    }

    #[test]
    fn test_audio_output_port_is_stereo_summing() {
        let output = AudioOutput::new();
        let port = &output.ports()[0];
        assert!(port.is_input());
        assert!(port.summing);
        assert_eq!(port.channels, DEVICE_CHANNELS);
    }

    #[test]
    fn test_midi_input_has_event_output() {
        let midi = MidiInput::new();
        assert_eq!(midi.ports()[0].signal_type, SignalType::Event);
        assert!(midi.ports()[0].is_output());
    }

    #[test]
    fn test_input_to_output_through_device() {
        let driver = OfflineDriver::new();
        let mut engine = Engine::new(Box::new(driver.clone()), EngineSettings::default());
        let input = engine.add_node(builtin(AudioInput::new())).unwrap();
        let output = engine.add_node(builtin(AudioOutput::new())).unwrap();
        engine
            .connect(PortRef::new(input, 0), PortRef::new(output, 0))
            .unwrap();
        engine
            .prepare(DeviceConfig::new(48000, 4).with_channels(2, 2))
            .unwrap();
        engine.start().unwrap();

        let interleaved = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        let rendered = driver.render_with_input(&interleaved, 4).unwrap();
        assert_eq!(rendered, interleaved.to_vec());
    }

    #[test]
    fn test_mono_source_reaches_both_sides() {
        let driver = OfflineDriver::new();
        let mut engine = Engine::new(Box::new(driver.clone()), EngineSettings::default());
        let osc = engine.add_node(builtin(SineOscillator::new())).unwrap();
        let output = engine.add_node(builtin(AudioOutput::new())).unwrap();
        engine
            .connect(PortRef::new(osc, 0), PortRef::new(output, 0))
            .unwrap();
        engine.prepare(DeviceConfig::new(48000, 64)).unwrap();
        engine.start().unwrap();

        let rendered = driver.render(1).unwrap();
        assert_eq!(rendered.len(), 128);
        for frame in rendered.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(rendered.iter().any(|s| s.abs() > 0.1));
    }
}
