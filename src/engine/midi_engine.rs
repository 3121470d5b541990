//! MIDI Engine
//!
//! Handles MIDI input from hardware controllers and virtual MIDI ports.
//! Uses midir for cross-platform MIDI access and rtrb for lock-free
//! communication with the audio thread, where the runner hands the events
//! to the device MIDI input node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use midir::{MidiInput, MidiInputConnection};
use rtrb::{Consumer, Producer, RingBuffer};
use thiserror::Error;
use tracing::{info, warn};

use crate::dsp::MidiEvent;

/// Default buffer size for MIDI events.
pub const DEFAULT_MIDI_BUFFER_SIZE: usize = 512;

const CLIENT_NAME: &str = "modular-host";

/// Information about a MIDI input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Internal port index.
    pub index: usize,
}

/// Error type for MIDI operations.
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("MIDI init error: {0}")]
    Init(String),

    #[error("MIDI connection error: {0}")]
    Connection(String),

    #[error("MIDI device '{0}' not found")]
    DeviceNotFound(String),
}

/// Lists the MIDI input ports currently visible.
pub fn enumerate_devices() -> Result<Vec<MidiDeviceInfo>, MidiError> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| MidiDeviceInfo {
            name: midi_in
                .port_name(port)
                .unwrap_or_else(|_| "Unknown".to_string()),
            index,
        })
        .collect())
}

/// Parses raw messages into the event queue, counting what does not fit.
struct Feed {
    producer: Producer<MidiEvent>,
    dropped: Arc<AtomicU64>,
}

impl Feed {
    fn push_bytes(&mut self, data: &[u8]) {
        if let Some(event) = MidiEvent::from_bytes(0, data) {
            if self.producer.push(event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// MIDI engine for receiving MIDI input.
///
/// Holds the producer side of the queue the runner drains once per
/// callback. Only one port is connected at a time; the producer travels
/// into the midir callback and comes back when the connection closes.
pub struct MidiEngine {
    feed: Option<Feed>,
    connection: Option<MidiInputConnection<Feed>>,
    connected_name: Option<String>,
    dropped: Arc<AtomicU64>,
}

impl MidiEngine {
    /// Create a new MIDI engine.
    ///
    /// Returns the engine and a consumer for receiving MIDI events.
    pub fn new(capacity: usize) -> (Self, Consumer<MidiEvent>) {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let engine = Self {
            feed: Some(Feed {
                producer,
                dropped: Arc::clone(&dropped),
            }),
            connection: None,
            connected_name: None,
            dropped,
        };
        (engine, consumer)
    }

    /// Connect to the first port whose name contains `name`.
    pub fn connect_by_name(&mut self, name: &str) -> Result<(), MidiError> {
        let index = enumerate_devices()?
            .into_iter()
            .find(|device| device.name.contains(name))
            .map(|device| device.index)
            .ok_or_else(|| MidiError::DeviceNotFound(name.to_string()))?;
        self.connect(index)
    }

    /// Connect to a MIDI device by index.
    pub fn connect(&mut self, device_index: usize) -> Result<(), MidiError> {
        self.disconnect();

        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        let ports = midi_in.ports();
        let port = ports
            .get(device_index)
            .ok_or_else(|| MidiError::DeviceNotFound(format!("#{device_index}")))?;
        let name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let feed = self
            .feed
            .take()
            .ok_or_else(|| MidiError::Connection("event queue already in use".to_string()))?;

        let connection = midi_in
            .connect(
                port,
                "modular-host-input",
                |_timestamp_us, data, feed: &mut Feed| feed.push_bytes(data),
                feed,
            )
            .map_err(|e| {
                // The queue is lost with the failed connection attempt.
                MidiError::Connection(e.to_string())
            })?;

        info!(device = %name, "MIDI input connected");
        self.connection = Some(connection);
        self.connected_name = Some(name);
        Ok(())
    }

    /// Disconnect from the current MIDI device, taking the queue back.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            let (_, feed) = connection.close();
            self.feed = Some(feed);
            info!(device = ?self.connected_name.take(), "MIDI input disconnected");
        }
    }

    /// Check if currently connected to a device.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_name(&self) -> Option<&str> {
        self.connected_name.as_deref()
    }

    /// Events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Feeds raw bytes as if they came from a port. Used when no hardware
    /// is attached.
    pub fn inject(&mut self, data: &[u8]) {
        match self.feed.as_mut() {
            Some(feed) => feed.push_bytes(data),
            None => warn!("MIDI queue is owned by a live connection; injected message ignored"),
        }
    }
}

impl Drop for MidiEngine {
    fn drop(&mut self) {
        self.disconnect();
    }
}
