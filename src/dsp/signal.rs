//! Signal kinds and buffers for the processing graph.
//!
//! Defines the three kinds of data that flow between ports (audio,
//! control and MIDI events) and the pre-allocated buffers that carry them.

use serde::{Deserialize, Serialize};

/// The kind of signal flowing through a connection.
///
/// - **Audio**: Sample streams, typically -1.0 to 1.0
/// - **Control**: Per-sample modulation/parameter values
/// - **Event**: Timestamped MIDI events
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Audio,
    Control,
    Event,
}

impl SignalType {
    /// Checks if a connection from this signal type to another is valid.
    ///
    /// Connection rules:
    /// - Same type to same type: Always allowed
    /// - Audio <-> Control: Allowed (audio-rate modulation)
    /// - Event -> Any other type (and back): Not allowed (needs converter node)
    pub fn can_connect_to(&self, target: SignalType) -> bool {
        match (self, target) {
            (a, b) if *a == b => true,
            (SignalType::Audio, SignalType::Control) => true,
            (SignalType::Control, SignalType::Audio) => true,
            _ => false,
        }
    }

    /// Returns true for kinds that carry per-sample buffers.
    ///
    /// Edges from audio-rate outputs are hard scheduling dependencies.
    pub fn is_audio_rate(&self) -> bool {
        matches!(self, SignalType::Audio | SignalType::Control)
    }

    /// Returns a human-readable name for the signal type.
    pub fn name(&self) -> &'static str {
        match self {
            SignalType::Audio => "Audio",
            SignalType::Control => "Control",
            SignalType::Event => "Event",
        }
    }
}

/// A planar buffer of samples.
///
/// Holds `channels` contiguous runs of `frames` samples each. The buffer is
/// sized for the maximum block once, off the audio thread; processing a
/// shorter block only touches the leading frames of each channel.
#[derive(Clone, Debug)]
pub struct SignalBuffer {
    /// The sample data, channel after channel.
    pub samples: Vec<f32>,
    /// The type of signal stored in this buffer.
    pub signal_type: SignalType,
    channels: usize,
    frames: usize,
}

impl SignalBuffer {
    /// Creates a new zeroed buffer.
    pub fn new(frames: usize, channels: usize, signal_type: SignalType) -> Self {
        Self {
            samples: vec![0.0; frames * channels],
            signal_type,
            channels,
            frames,
        }
    }

    /// Creates a new mono audio buffer.
    pub fn audio(frames: usize) -> Self {
        Self::new(frames, 1, SignalType::Audio)
    }

    /// Creates a new mono control buffer.
    pub fn control(frames: usize) -> Self {
        Self::new(frames, 1, SignalType::Control)
    }

    /// Number of channels in the buffer.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Returns one channel's samples.
    ///
    /// Out-of-range channels wrap, so a mono buffer can be read as any channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        let index = if self.channels == 0 { 0 } else { index % self.channels };
        let start = index * self.frames;
        &self.samples[start..start + self.frames]
    }

    /// Returns one channel's samples mutably.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let index = if self.channels == 0 { 0 } else { index % self.channels };
        let start = index * self.frames;
        &mut self.samples[start..start + self.frames]
    }

    /// Clears the buffer, setting all samples to zero.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Fills the buffer with a constant value.
    pub fn fill(&mut self, value: f32) {
        self.samples.fill(value);
    }

    /// Adds `frames` samples of `source` into this buffer, channel by channel.
    ///
    /// A mono source is broadcast to every channel.
    pub fn mix_from(&mut self, source: &SignalBuffer, frames: usize) {
        let frames = frames.min(self.frames).min(source.frames);
        for ch in 0..self.channels {
            let src = source.channel(ch);
            let dst = self.channel_mut(ch);
            for (d, s) in dst[..frames].iter_mut().zip(&src[..frames]) {
                *d += *s;
            }
        }
    }

    /// Returns the total number of samples in the buffer.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Resizes every channel to the given frame count, zeroing the contents.
    pub fn resize(&mut self, frames: usize) {
        self.frames = frames;
        self.samples.clear();
        self.samples.resize(frames * self.channels, 0.0);
    }
}

/// A MIDI message type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    /// Note On: (note number 0-127, velocity 1-127)
    NoteOn { note: u8, velocity: u8 },
    /// Note Off: (note number 0-127, velocity 0-127)
    NoteOff { note: u8, velocity: u8 },
    /// Control Change: (controller number 0-127, value 0-127)
    ControlChange { controller: u8, value: u8 },
    /// Pitch Bend: (-8192 to 8191, centered at 0)
    PitchBend { value: i16 },
    /// Channel Aftertouch: (pressure 0-127)
    Aftertouch { pressure: u8 },
    /// Polyphonic Aftertouch: (note, pressure)
    PolyPressure { note: u8, pressure: u8 },
    /// Program Change: (program number 0-127)
    ProgramChange { program: u8 },
}

impl MidiMessage {
    /// Converts a note number to frequency in Hz (A4 = 440 Hz).
    pub fn note_to_frequency(note: u8) -> f32 {
        440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
    }

    /// Converts a velocity value (0-127) to a normalized float (0.0-1.0).
    pub fn velocity_to_float(velocity: u8) -> f32 {
        velocity as f32 / 127.0
    }
}

/// A MIDI event with timing information.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    /// The frame offset within the current block where this event occurs.
    pub sample_offset: u32,
    /// The MIDI channel (0-15).
    pub channel: u8,
    /// The MIDI message.
    pub message: MidiMessage,
}

impl MidiEvent {
    /// Creates a new MIDI event.
    pub fn new(sample_offset: u32, channel: u8, message: MidiMessage) -> Self {
        Self {
            sample_offset,
            channel,
            message,
        }
    }

    /// Creates a Note On event.
    pub fn note_on(sample_offset: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(sample_offset, channel, MidiMessage::NoteOn { note, velocity })
    }

    /// Creates a Note Off event.
    pub fn note_off(sample_offset: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(sample_offset, channel, MidiMessage::NoteOff { note, velocity })
    }

    /// Parses a raw MIDI message.
    ///
    /// Returns `None` for system messages and malformed data. A Note On
    /// with velocity 0 is reported as Note Off.
    pub fn from_bytes(sample_offset: u32, data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        let channel = status & 0x0F;
        let byte = |i: usize| rest.get(i).map(|b| b & 0x7F);

        let message = match status & 0xF0 {
            0x80 => MidiMessage::NoteOff {
                note: byte(0)?,
                velocity: byte(1)?,
            },
            0x90 => {
                let (note, velocity) = (byte(0)?, byte(1)?);
                if velocity == 0 {
                    MidiMessage::NoteOff { note, velocity: 0 }
                } else {
                    MidiMessage::NoteOn { note, velocity }
                }
            }
            0xA0 => MidiMessage::PolyPressure {
                note: byte(0)?,
                pressure: byte(1)?,
            },
            0xB0 => MidiMessage::ControlChange {
                controller: byte(0)?,
                value: byte(1)?,
            },
            0xC0 => MidiMessage::ProgramChange { program: byte(0)? },
            0xD0 => MidiMessage::Aftertouch { pressure: byte(0)? },
            0xE0 => {
                // 14-bit, centered at 8192
                let lsb = byte(0)? as i16;
                let msb = byte(1)? as i16;
                MidiMessage::PitchBend {
                    value: ((msb << 7) | lsb) - 8192,
                }
            }
            _ => return None,
        };

        Some(Self::new(sample_offset, channel, message))
    }
}

/// A bounded list of events for one block.
///
/// Capacity is reserved up front; pushing past it drops the event instead
/// of growing the allocation.
#[derive(Clone, Debug, Default)]
pub struct EventBuffer {
    events: Vec<MidiEvent>,
    dropped: usize,
}

impl EventBuffer {
    /// Creates an empty buffer able to hold `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            dropped: 0,
        }
    }

    /// Appends an event. Returns false if the buffer was full.
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() < self.events.capacity() {
            self.events.push(event);
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    /// Appends every event from another buffer.
    pub fn extend_from(&mut self, other: &EventBuffer) {
        for event in other.iter() {
            self.push(*event);
        }
    }

    /// Iterates the events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }

    /// Number of events stored.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events are stored.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dropped since the last `take_dropped`.
    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }

    /// Removes all events, keeping the allocation.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// The buffer bound to one port: samples for audio/control ports, events for
/// event ports.
#[derive(Clone, Debug)]
pub enum PortBuffer {
    Signal(SignalBuffer),
    Events(EventBuffer),
}

impl PortBuffer {
    /// Allocates a buffer suited to a port of the given kind.
    pub fn for_port(
        signal_type: SignalType,
        channels: usize,
        frames: usize,
        event_capacity: usize,
    ) -> Self {
        match signal_type {
            SignalType::Event => PortBuffer::Events(EventBuffer::with_capacity(event_capacity)),
            kind => PortBuffer::Signal(SignalBuffer::new(frames, channels.max(1), kind)),
        }
    }

    /// Returns the sample buffer, if this is an audio or control buffer.
    pub fn signal(&self) -> Option<&SignalBuffer> {
        match self {
            PortBuffer::Signal(buf) => Some(buf),
            PortBuffer::Events(_) => None,
        }
    }

    /// Returns the sample buffer mutably.
    pub fn signal_mut(&mut self) -> Option<&mut SignalBuffer> {
        match self {
            PortBuffer::Signal(buf) => Some(buf),
            PortBuffer::Events(_) => None,
        }
    }

    /// Returns the event buffer, if this is an event buffer.
    pub fn events(&self) -> Option<&EventBuffer> {
        match self {
            PortBuffer::Events(buf) => Some(buf),
            PortBuffer::Signal(_) => None,
        }
    }

    /// Returns the event buffer mutably.
    pub fn events_mut(&mut self) -> Option<&mut EventBuffer> {
        match self {
            PortBuffer::Events(buf) => Some(buf),
            PortBuffer::Signal(_) => None,
        }
    }

    /// Zeroes samples or drops events.
    pub fn clear(&mut self) {
        match self {
            PortBuffer::Signal(buf) => buf.clear(),
            PortBuffer::Events(buf) => buf.clear(),
        }
    }
}

impl Default for PortBuffer {
    /// An empty placeholder; constructing it never allocates.
    fn default() -> Self {
        PortBuffer::Events(EventBuffer::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type_connections() {
        assert!(SignalType::Audio.can_connect_to(SignalType::Audio));
        assert!(SignalType::Control.can_connect_to(SignalType::Control));
        assert!(SignalType::Event.can_connect_to(SignalType::Event));
    }

    #[test]
    fn test_audio_control_connections() {
        assert!(SignalType::Audio.can_connect_to(SignalType::Control));
        assert!(SignalType::Control.can_connect_to(SignalType::Audio));
    }

    #[test]
    fn test_event_isolation() {
        assert!(!SignalType::Event.can_connect_to(SignalType::Audio));
        assert!(!SignalType::Event.can_connect_to(SignalType::Control));
        assert!(!SignalType::Audio.can_connect_to(SignalType::Event));
        assert!(!SignalType::Control.can_connect_to(SignalType::Event));
    }

    #[test]
    fn test_audio_rate_kinds() {
        assert!(SignalType::Audio.is_audio_rate());
        assert!(SignalType::Control.is_audio_rate());
        assert!(!SignalType::Event.is_audio_rate());
    }

    #[test]
    fn test_signal_buffer_planar_channels() {
        let mut buffer = SignalBuffer::new(4, 2, SignalType::Audio);
        assert_eq!(buffer.len(), 8);
        buffer.channel_mut(1).fill(0.5);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.0));
        assert!(buffer.channel(1).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_mono_buffer_reads_as_any_channel() {
        let mut buffer = SignalBuffer::audio(4);
        buffer.fill(0.25);
        assert_eq!(buffer.channel(3), &[0.25; 4]);
    }

    #[test]
    fn test_mix_from_broadcasts_mono() {
        let mut mono = SignalBuffer::audio(4);
        mono.fill(0.5);
        let mut stereo = SignalBuffer::new(4, 2, SignalType::Audio);
        stereo.mix_from(&mono, 4);
        stereo.mix_from(&mono, 2);
        assert_eq!(stereo.channel(0), &[1.0, 1.0, 0.5, 0.5]);
        assert_eq!(stereo.channel(1), &[1.0, 1.0, 0.5, 0.5]);
    }

    #[test]
    fn test_signal_buffer_resize() {
        let mut buffer = SignalBuffer::new(64, 2, SignalType::Audio);
        buffer.resize(128);
        assert_eq!(buffer.frames(), 128);
        assert_eq!(buffer.len(), 256);
    }

    #[test]
    fn test_event_buffer_is_bounded() {
        let mut events = EventBuffer::with_capacity(2);
        assert!(events.push(MidiEvent::note_on(0, 0, 60, 100)));
        assert!(events.push(MidiEvent::note_off(10, 0, 60, 0)));
        assert!(!events.push(MidiEvent::note_on(20, 0, 62, 100)));
        assert_eq!(events.len(), 2);
        assert_eq!(events.take_dropped(), 1);
        assert_eq!(events.take_dropped(), 0);

        events.clear();
        assert!(events.is_empty());
        assert!(events.push(MidiEvent::note_on(0, 0, 64, 90)));
    }

    #[test]
    fn test_parse_note_on_with_zero_velocity_is_note_off() {
        let event = MidiEvent::from_bytes(7, &[0x91, 60, 0]).unwrap();
        assert_eq!(event.channel, 1);
        assert_eq!(event.sample_offset, 7);
        assert_eq!(event.message, MidiMessage::NoteOff { note: 60, velocity: 0 });
    }

    #[test]
    fn test_parse_pitch_bend_center() {
        let event = MidiEvent::from_bytes(0, &[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(event.message, MidiMessage::PitchBend { value: 0 });
    }

    #[test]
    fn test_parse_rejects_truncated_and_system() {
        assert!(MidiEvent::from_bytes(0, &[]).is_none());
        assert!(MidiEvent::from_bytes(0, &[0x90, 60]).is_none());
        assert!(MidiEvent::from_bytes(0, &[0xF8]).is_none());
    }

    #[test]
    fn test_midi_note_to_frequency() {
        assert!((MidiMessage::note_to_frequency(69) - 440.0).abs() < 0.001);
        assert!((MidiMessage::note_to_frequency(57) - 220.0).abs() < 0.001);
    }

    #[test]
    fn test_port_buffer_for_port() {
        let audio = PortBuffer::for_port(SignalType::Audio, 2, 16, 8);
        assert_eq!(audio.signal().unwrap().channels(), 2);
        assert!(audio.events().is_none());

        let events = PortBuffer::for_port(SignalType::Event, 1, 16, 8);
        assert!(events.events().is_some());
        assert!(events.signal().is_none());
    }
}
