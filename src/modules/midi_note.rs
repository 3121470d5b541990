//! MIDI Note module.
//!
//! Converts MIDI note events into control signals (V/Oct pitch, gate,
//! velocity, aftertouch), sample-accurately at each event's offset.

use crate::dsp::{
    Inputs, MidiEvent, MidiMessage, ModuleCategory, ModuleInfo, ParameterDefinition, PortBuffer,
    PortDefinition, ProcessContext, Processor, SignalType,
};

/// Notes remembered while held, for returning to an earlier note on release.
const NOTE_STACK_SIZE: usize = 16;

/// Voice priority modes for handling several held notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoicePriority {
    /// Most recently pressed note takes priority.
    Last = 0,
    /// Lowest note takes priority.
    Low = 1,
    /// Highest note takes priority.
    High = 2,
}

impl VoicePriority {
    /// Convert from parameter value (0-2) to voice priority.
    pub fn from_param(value: f32) -> Self {
        match value as usize {
            1 => VoicePriority::Low,
            2 => VoicePriority::High,
            _ => VoicePriority::Last,
        }
    }
}

/// A monophonic MIDI to CV converter.
///
/// # Ports
///
/// **Inputs:**
/// - **MIDI** (Event): note, aftertouch events. Several sources merge.
///
/// **Outputs:**
/// - **Pitch** (Control): V/Oct. 0.0 = C4 (MIDI 60), +1.0 = C5, -1.0 = C3.
/// - **Gate** (Control): 1.0 while any note is held.
/// - **Velocity** (Control): velocity of the sounding note (0.0-1.0).
/// - **Aftertouch** (Control): channel pressure (0.0-1.0).
///
/// # Parameters
///
/// - **Channel** (0-16): MIDI channel filter (0=Omni, 1-16=specific).
/// - **Octave** (-4 to +4): Octave shift.
/// - **Priority** (0-2): Last, Low, High.
pub struct MidiNote {
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    held: [u8; NOTE_STACK_SIZE],
    held_len: usize,
    note: u8,
    velocity: f32,
    aftertouch: f32,
}

impl MidiNote {
    /// Creates a new MIDI Note module.
    pub fn new() -> Self {
        Self {
            ports: vec![
                PortDefinition::input("midi", "MIDI", SignalType::Event),
                PortDefinition::output("pitch", "Pitch", SignalType::Control),
                PortDefinition::output("gate", "Gate", SignalType::Control),
                PortDefinition::output("velocity", "Velocity", SignalType::Control),
                PortDefinition::output("aftertouch", "Aftertouch", SignalType::Control),
            ],
            parameters: vec![
                ParameterDefinition::new("channel", "Channel", 0.0, 16.0, 0.0, ""),
                ParameterDefinition::new("octave", "Octave", -4.0, 4.0, 0.0, "oct"),
                ParameterDefinition::new("priority", "Priority", 0.0, 2.0, 0.0, ""),
            ],
            held: [0; NOTE_STACK_SIZE],
            held_len: 0,
            note: 60,
            velocity: 0.0,
            aftertouch: 0.0,
        }
    }

    const PORT_MIDI: usize = 0;
    const PORT_PITCH: usize = 0;
    const PORT_GATE: usize = 1;
    const PORT_VELOCITY: usize = 2;
    const PORT_AFTERTOUCH: usize = 3;

    const PARAM_CHANNEL: usize = 0;
    const PARAM_OCTAVE: usize = 1;
    const PARAM_PRIORITY: usize = 2;

    /// Convert MIDI note number to V/Oct pitch CV.
    ///
    /// Middle C (MIDI 60) = 0.0
    /// C5 (MIDI 72) = +1.0
    /// C3 (MIDI 48) = -1.0
    #[inline]
    pub fn midi_to_voct(midi_note: f32) -> f32 {
        (midi_note - 60.0) / 12.0
    }

    fn press(&mut self, note: u8, velocity: u8, priority: VoicePriority) {
        self.release_note(note);
        if self.held_len == NOTE_STACK_SIZE {
            self.held.copy_within(1.., 0);
            self.held_len -= 1;
        }
        self.held[self.held_len] = note;
        self.held_len += 1;
        self.velocity = MidiMessage::velocity_to_float(velocity);
        self.select(priority);
    }

    fn release_note(&mut self, note: u8) {
        if let Some(pos) = self.held[..self.held_len].iter().position(|&n| n == note) {
            self.held.copy_within(pos + 1..self.held_len, pos);
            self.held_len -= 1;
        }
    }

    fn select(&mut self, priority: VoicePriority) {
        let held = &self.held[..self.held_len];
        let chosen = match priority {
            VoicePriority::Last => held.last(),
            VoicePriority::Low => held.iter().min(),
            VoicePriority::High => held.iter().max(),
        };
        if let Some(&note) = chosen {
            self.note = note;
        }
    }

    fn apply(&mut self, event: &MidiEvent, priority: VoicePriority) {
        match event.message {
            MidiMessage::NoteOn { note, velocity } => self.press(note, velocity, priority),
            MidiMessage::NoteOff { note, .. } => {
                self.release_note(note);
                self.select(priority);
            }
            MidiMessage::Aftertouch { pressure } => {
                self.aftertouch = MidiMessage::velocity_to_float(pressure);
            }
            _ => {}
        }
    }

    fn gate(&self) -> f32 {
        if self.held_len > 0 {
            1.0
        } else {
            0.0
        }
    }
}

impl Default for MidiNote {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for MidiNote {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "midi.note",
            name: "MIDI Note",
            category: ModuleCategory::Utility,
            description: "Convert MIDI note events to control signals",
        };
        &INFO
    }

    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }

    fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    fn prepare(&mut self, _sample_rate: f32, _max_block_size: usize) {}

    fn process(
        &mut self,
        inputs: &Inputs<'_>,
        outputs: &mut [PortBuffer],
        params: &[f32],
        context: &ProcessContext,
    ) {
        let channel = params[Self::PARAM_CHANNEL].round() as u8;
        let octave = params[Self::PARAM_OCTAVE].round();
        let priority = VoicePriority::from_param(params[Self::PARAM_PRIORITY]);
        let frames = context.block_size;

        let mut cursor = 0;
        if let Some(events) = inputs.events(Self::PORT_MIDI) {
            for event in events.iter() {
                if channel != 0 && event.channel + 1 != channel {
                    continue;
                }
                let offset = (event.sample_offset as usize).clamp(cursor, frames);
                self.fill(outputs, cursor..offset, octave);
                cursor = offset;
                self.apply(event, priority);
            }
        }
        self.fill(outputs, cursor..frames, octave);
    }

    fn reset(&mut self) {
        self.held_len = 0;
        self.note = 60;
        self.velocity = 0.0;
        self.aftertouch = 0.0;
    }
}

impl MidiNote {
    fn fill(&self, outputs: &mut [PortBuffer], range: std::ops::Range<usize>, octave: f32) {
        if range.is_empty() {
            return;
        }
        let values = [
            (Self::PORT_PITCH, Self::midi_to_voct(self.note as f32) + octave),
            (Self::PORT_GATE, self.gate()),
            (Self::PORT_VELOCITY, self.velocity),
            (Self::PORT_AFTERTOUCH, self.aftertouch),
        ];
        for (port, value) in values {
            if let Some(signal) = outputs.get_mut(port).and_then(PortBuffer::signal_mut) {
                signal.channel_mut(0)[range.clone()].fill(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::EventBuffer;

    fn run(module: &mut MidiNote, events: &[MidiEvent], params: &[f32], frames: usize) -> Vec<Vec<f32>> {
        let mut buffer = EventBuffer::with_capacity(16);
        for event in events {
            buffer.push(*event);
        }
        let arena = vec![PortBuffer::Events(buffer)];
        let bindings = [0];
        let mut outputs: Vec<PortBuffer> = (0..4)
            .map(|_| PortBuffer::for_port(SignalType::Control, 1, frames, 0))
            .collect();
        module.process(
            &Inputs::new(&arena, &bindings),
            &mut outputs,
            params,
            &ProcessContext::new(48000.0, frames),
        );
        outputs
            .iter()
            .map(|buf| buf.signal().unwrap().samples.clone())
            .collect()
    }

    #[test]
    fn test_midi_note_info() {
        let module = MidiNote::new();
        assert_eq!(module.info().id, "midi.note");
        assert_eq!(module.ports().len(), 5);
        assert_eq!(module.ports()[0].signal_type, SignalType::Event);
    }

    #[test]
    fn test_midi_to_voct() {
        assert_eq!(MidiNote::midi_to_voct(60.0), 0.0);
        assert_eq!(MidiNote::midi_to_voct(72.0), 1.0);
        assert_eq!(MidiNote::midi_to_voct(48.0), -1.0);
    }

    #[test]
    fn test_voice_priority_conversion() {
        assert_eq!(VoicePriority::from_param(0.0), VoicePriority::Last);
        assert_eq!(VoicePriority::from_param(1.0), VoicePriority::Low);
        assert_eq!(VoicePriority::from_param(2.0), VoicePriority::High);
        assert_eq!(VoicePriority::from_param(7.0), VoicePriority::Last);
    }

    #[test]
    fn test_note_on_is_sample_accurate() {
        let mut module = MidiNote::new();
        let out = run(&mut module, &[MidiEvent::note_on(2, 0, 72, 127)], &[0.0, 0.0, 0.0], 4);

        assert_eq!(out[1], vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(out[0][3], 1.0);
        assert_eq!(out[2][3], 1.0);
    }

    #[test]
    fn test_gate_held_across_blocks_until_note_off() {
        let mut module = MidiNote::new();
        run(&mut module, &[MidiEvent::note_on(0, 0, 60, 100)], &[0.0, 0.0, 0.0], 4);
        let held = run(&mut module, &[], &[0.0, 0.0, 0.0], 4);
        assert!(held[1].iter().all(|&g| g == 1.0));

        let released = run(&mut module, &[MidiEvent::note_off(1, 0, 60, 0)], &[0.0, 0.0, 0.0], 4);
        assert_eq!(released[1], vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_last_note_priority_returns_to_held_note() {
        let mut module = MidiNote::new();
        let events = [
            MidiEvent::note_on(0, 0, 60, 100),
            MidiEvent::note_on(1, 0, 64, 100),
            MidiEvent::note_off(2, 0, 64, 0),
        ];
        let out = run(&mut module, &events, &[0.0, 0.0, 0.0], 4);

        let e = MidiNote::midi_to_voct(64.0);
        assert_eq!(out[0], vec![0.0, e, 0.0, 0.0]);
        assert!(out[1].iter().all(|&g| g == 1.0));
    }

    #[test]
    fn test_low_priority_keeps_lowest() {
        let mut module = MidiNote::new();
        let events = [MidiEvent::note_on(0, 0, 60, 100), MidiEvent::note_on(0, 0, 67, 100)];
        let out = run(&mut module, &events, &[0.0, 0.0, 1.0], 2);
        assert_eq!(out[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_octave_shift() {
        let mut module = MidiNote::new();
        let out = run(&mut module, &[MidiEvent::note_on(0, 0, 60, 100)], &[0.0, 2.0, 0.0], 2);
        assert_eq!(out[0], vec![2.0, 2.0]);
    }

    #[test]
    fn test_channel_filter() {
        let mut module = MidiNote::new();
        // Channel parameter 2 listens to zero-based channel 1 only.
        let out = run(&mut module, &[MidiEvent::note_on(0, 0, 60, 100)], &[2.0, 0.0, 0.0], 2);
        assert_eq!(out[1], vec![0.0, 0.0]);

        let out = run(&mut module, &[MidiEvent::note_on(0, 1, 60, 100)], &[2.0, 0.0, 0.0], 2);
        assert_eq!(out[1], vec![1.0, 1.0]);
    }

    #[test]
    fn test_aftertouch() {
        let mut module = MidiNote::new();
        let pressure = MidiEvent::new(0, 0, MidiMessage::Aftertouch { pressure: 127 });
        let out = run(&mut module, &[pressure], &[0.0, 0.0, 0.0], 2);
        assert_eq!(out[3], vec![1.0, 1.0]);
    }

    #[test]
    fn test_reset_releases_notes() {
        let mut module = MidiNote::new();
        run(&mut module, &[MidiEvent::note_on(0, 0, 60, 100)], &[0.0, 0.0, 0.0], 2);
        module.reset();
        let out = run(&mut module, &[], &[0.0, 0.0, 0.0], 2);
        assert_eq!(out[1], vec![0.0, 0.0]);
    }
}
