//! Device boundary.
//!
//! The engine only needs a buffer geometry ([`DeviceConfig`]) and somewhere
//! to register its callback. [`AudioDriver`] is that boundary; [`CpalDriver`]
//! talks to system audio hardware and [`OfflineDriver`] invokes the callback
//! synchronously, for tests and offline rendering.

use std::fmt;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat, SampleRate, Stream, StreamConfig};
use rtrb::RingBuffer;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::error::DeviceError;

/// Lowest sample rate the engine accepts.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest sample rate the engine accepts.
pub const MAX_SAMPLE_RATE: u32 = 384_000;
/// Largest block the engine will prepare processors for.
pub const MAX_BLOCK_SIZE: usize = 8192;
/// Upper bound on device channels in either direction.
pub const MAX_CHANNELS: usize = 64;

/// Buffer geometry of an audio device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    /// Maximum frames per processing block.
    pub block_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
}

impl DeviceConfig {
    /// A stereo output configuration with no inputs.
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            input_channels: 0,
            output_channels: 2,
        }
    }

    pub fn with_channels(mut self, input_channels: usize, output_channels: usize) -> Self {
        self.input_channels = input_channels;
        self.output_channels = output_channels;
        self
    }

    /// Checks the geometry against the engine's own limits.
    ///
    /// Returns the reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".to_string());
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(format!(
                "sample rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE} Hz"
            ));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(format!("block size must be between 1 and {MAX_BLOCK_SIZE} frames"));
        }
        if self.input_channels > MAX_CHANNELS || self.output_channels > MAX_CHANNELS {
            return Err(format!("at most {MAX_CHANNELS} channels per direction"));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new(48_000, 256)
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} frames, {} in / {} out",
            self.sample_rate, self.block_size, self.input_channels, self.output_channels
        )
    }
}

/// Device callback: interleaved input, interleaved output, frame count.
///
/// Called on the audio thread. Implementations must not allocate, lock or
/// block.
pub type DeviceCallback = Box<dyn FnMut(&[f32], &mut [f32], usize) + Send + 'static>;

/// Something that can run a [`DeviceCallback`] at a given geometry.
///
/// Closing a driver must drop the callback it was given.
pub trait AudioDriver {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Returns the reason if the device cannot run `config`.
    fn supports(&self, config: &DeviceConfig) -> Result<(), String>;

    /// Starts calling `callback`. On failure the callback is dropped.
    fn open(&mut self, config: &DeviceConfig, callback: DeviceCallback) -> Result<(), DeviceError>;

    /// Stops calling the callback and drops it.
    fn close(&mut self) -> Result<(), DeviceError>;

    fn is_open(&self) -> bool;
}

struct OfflineState {
    config: Option<DeviceConfig>,
    callback: Option<DeviceCallback>,
    sample_rates: Option<Vec<u32>>,
    frames_rendered: u64,
}

/// A driver that renders on demand from the calling thread.
///
/// Clones share the same device, so a test can hand one clone to the engine
/// and keep another to pull audio through it.
#[derive(Clone)]
pub struct OfflineDriver {
    state: Arc<Mutex<OfflineState>>,
}

impl Default for OfflineDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(OfflineState {
                config: None,
                callback: None,
                sample_rates: None,
                frames_rendered: 0,
            })),
        }
    }

    /// Restricts the sample rates the device claims to support.
    pub fn with_sample_rates(self, rates: Vec<u32>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.sample_rates = Some(rates);
        }
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, OfflineState>, DeviceError> {
        self.state
            .lock()
            .map_err(|_| DeviceError::Playback("offline device state poisoned".to_string()))
    }

    /// Renders `blocks` blocks of silence-in, returning the interleaved output.
    pub fn render(&self, blocks: usize) -> Result<Vec<f32>, DeviceError> {
        let mut state = self.lock()?;
        let config = state.config.ok_or(DeviceError::NotOpen)?;
        let frames = config.block_size;
        let input = vec![0.0; frames * config.input_channels];
        let mut block = vec![0.0; frames * config.output_channels];
        let mut rendered = Vec::with_capacity(blocks * block.len());
        for _ in 0..blocks {
            let callback = state.callback.as_mut().ok_or(DeviceError::NotOpen)?;
            callback(&input, &mut block, frames);
            rendered.extend_from_slice(&block);
            state.frames_rendered += frames as u64;
        }
        Ok(rendered)
    }

    /// Runs one callback over `frames` frames of the given interleaved input.
    pub fn render_with_input(&self, input: &[f32], frames: usize) -> Result<Vec<f32>, DeviceError> {
        let mut state = self.lock()?;
        let config = state.config.ok_or(DeviceError::NotOpen)?;
        let mut output = vec![0.0; frames * config.output_channels];
        let callback = state.callback.as_mut().ok_or(DeviceError::NotOpen)?;
        callback(input, &mut output, frames);
        state.frames_rendered += frames as u64;
        Ok(output)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.state.lock().map(|s| s.frames_rendered).unwrap_or(0)
    }
}

impl AudioDriver for OfflineDriver {
    fn name(&self) -> &str {
        "offline"
    }

    fn supports(&self, config: &DeviceConfig) -> Result<(), String> {
        let state = self.lock().map_err(|e| e.to_string())?;
        match &state.sample_rates {
            Some(rates) if !rates.contains(&config.sample_rate) => {
                Err(format!("device does not run at {} Hz", config.sample_rate))
            }
            _ => Ok(()),
        }
    }

    fn open(&mut self, config: &DeviceConfig, callback: DeviceCallback) -> Result<(), DeviceError> {
        let mut state = self.lock()?;
        if state.callback.is_some() {
            return Err(DeviceError::AlreadyOpen);
        }
        state.config = Some(*config);
        state.callback = Some(callback);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        // Take the callback out first so it is dropped after the lock is released.
        let callback = {
            let mut state = self.lock()?;
            state.config = None;
            state.callback.take()
        };
        drop(callback);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().map(|s| s.callback.is_some()).unwrap_or(false)
    }
}

/// Information about an audio device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Whether this is the host's default device in its direction.
    pub is_default: bool,
    /// Index in the device list (for selection).
    pub index: usize,
    /// Capture device rather than playback.
    pub is_input: bool,
}

fn list_devices<I: Iterator<Item = Device>>(
    devices: Result<I, cpal::DevicesError>,
    default: &Option<String>,
    is_input: bool,
) -> Vec<DeviceInfo> {
    devices
        .map(|devices| {
            devices
                .enumerate()
                .filter_map(|(index, device)| {
                    device.name().ok().map(|name| DeviceInfo {
                        is_default: Some(&name) == default.as_ref(),
                        name,
                        index,
                        is_input,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Lists the output and input devices of the default host.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    let default_input = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = list_devices(host.output_devices(), &default_output, false);
    devices.extend(list_devices(host.input_devices(), &default_input, true));
    devices
}

/// Driver for system audio hardware through cpal.
pub struct CpalDriver {
    host: Host,
    output_device: Option<String>,
    output: Option<Stream>,
    input: Option<Stream>,
}

impl CpalDriver {
    /// Uses the named output device, or the host default.
    pub fn new(output_device: Option<String>) -> Self {
        Self {
            host: cpal::default_host(),
            output_device,
            output: None,
            input: None,
        }
    }

    fn find_output(&self) -> Result<Device, DeviceError> {
        match &self.output_device {
            None => self
                .host
                .default_output_device()
                .ok_or(DeviceError::NoOutputDevice),
            Some(wanted) => self
                .host
                .output_devices()
                .map_err(|e| DeviceError::Configuration(e.to_string()))?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| DeviceError::DeviceNotFound(wanted.clone())),
        }
    }

    fn find_input(&self) -> Result<Device, DeviceError> {
        self.host
            .default_input_device()
            .ok_or_else(|| DeviceError::DeviceNotFound("default input".to_string()))
    }

    /// Name of the output device that would be opened.
    pub fn current_device_name(&self) -> String {
        self.find_output()
            .and_then(|d| d.name().map_err(|e| DeviceError::Configuration(e.to_string())))
            .unwrap_or_else(|_| "Unknown".to_string())
    }
}

fn range_fits(range: &cpal::SupportedStreamConfigRange, channels: usize, sample_rate: u32) -> bool {
    range.channels() as usize == channels
        && range.sample_format() == SampleFormat::F32
        && range.min_sample_rate().0 <= sample_rate
        && sample_rate <= range.max_sample_rate().0
}

impl AudioDriver for CpalDriver {
    fn name(&self) -> &str {
        "cpal"
    }

    fn supports(&self, config: &DeviceConfig) -> Result<(), String> {
        let device = self.find_output().map_err(|e| e.to_string())?;
        let mut ranges = device
            .supported_output_configs()
            .map_err(|e| e.to_string())?;
        if !ranges.any(|r| range_fits(&r, config.output_channels, config.sample_rate)) {
            return Err(format!(
                "output device has no f32 configuration with {} channels at {} Hz",
                config.output_channels, config.sample_rate
            ));
        }
        if config.input_channels > 0 {
            let device = self.find_input().map_err(|e| e.to_string())?;
            let mut ranges = device.supported_input_configs().map_err(|e| e.to_string())?;
            if !ranges.any(|r| range_fits(&r, config.input_channels, config.sample_rate)) {
                return Err(format!(
                    "input device has no f32 configuration with {} channels at {} Hz",
                    config.input_channels, config.sample_rate
                ));
            }
        }
        Ok(())
    }

    fn open(&mut self, config: &DeviceConfig, mut callback: DeviceCallback) -> Result<(), DeviceError> {
        if self.output.is_some() {
            return Err(DeviceError::AlreadyOpen);
        }
        let device = self.find_output()?;
        let out_channels = config.output_channels.max(1);
        let in_channels = config.input_channels;
        let stream_config = |channels: usize| StreamConfig {
            channels: channels as u16,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Captured input reaches the output callback through a ring sized for
        // a few blocks; the output callback pulls it in block-sized pieces.
        let block = config.block_size.max(1);
        let (mut capture_tx, mut capture_rx) = RingBuffer::<f32>::new((block * in_channels * 8).max(1));
        let mut scratch = vec![0.0f32; block * in_channels];

        let input = if in_channels > 0 {
            let stream = self
                .find_input()?
                .build_input_stream(
                    &stream_config(in_channels),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        for &sample in data {
                            if capture_tx.push(sample).is_err() {
                                break;
                            }
                        }
                    },
                    move |err| error!(error = %err, "audio input stream error"),
                    None,
                )
                .map_err(|e| DeviceError::StreamCreation(e.to_string()))?;
            Some(stream)
        } else {
            None
        };

        let output = device
            .build_output_stream(
                &stream_config(out_channels),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // REAL-TIME SAFE: no allocations, no locks, no blocking
                    for chunk in data.chunks_mut(block * out_channels) {
                        let frames = chunk.len() / out_channels;
                        let wanted = frames * in_channels;
                        for sample in scratch[..wanted].iter_mut() {
                            *sample = capture_rx.pop().unwrap_or(0.0);
                        }
                        callback(&scratch[..wanted], chunk, frames);
                    }
                },
                move |err| error!(error = %err, "audio output stream error"),
                None,
            )
            .map_err(|e| DeviceError::StreamCreation(e.to_string()))?;

        if let Some(input) = &input {
            input
                .play()
                .map_err(|e| DeviceError::Playback(e.to_string()))?;
        }
        output
            .play()
            .map_err(|e| DeviceError::Playback(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            config = %config,
            "audio device opened"
        );
        self.output = Some(output);
        self.input = input;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        let Some(output) = self.output.take() else {
            return Ok(());
        };
        let paused = output.pause();
        drop(output);
        if let Some(input) = self.input.take() {
            let _ = input.pause();
        }
        debug!("audio device closed");
        paused.map_err(|e| DeviceError::Playback(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.output.is_some()
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
