//! Processing context for processors.
//!
//! Provides runtime information that nodes need during a process call.

/// Context provided to every node for one block.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// The audio sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: f32,
    /// The number of frames in the current block (never above the prepared maximum).
    pub block_size: usize,
    /// Frames rendered since the engine started, at the start of this block.
    pub sample_position: u64,
}

impl ProcessContext {
    /// Creates a new process context at position zero.
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            sample_position: 0,
        }
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(44100.0, 256)
    }
}
