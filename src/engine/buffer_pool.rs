//! Buffer allocation for compiled plans.
//!
//! The BufferPool hands out arena slots while the scheduler walks the
//! execution order. With reuse enabled it works like register allocation:
//! an audio-rate output is live from the step that writes it to the last
//! step that reads it, after which its slot can be handed to a later port
//! of the same shape. Event buffers, feedback outputs and constants are
//! pinned and never shared.

use std::collections::BTreeMap;

use crate::dsp::{PortBuffer, SignalType};

use super::error::CompileError;
use super::plan::{BufferId, BufferSpec};

pub struct BufferPool {
    specs: Vec<BufferSpec>,
    /// Released slots: (last step that reads it, id).
    free: Vec<(usize, BufferId)>,
    constants: BTreeMap<(SignalType, usize, u32), BufferId>,
    reuse: bool,
    limit: usize,
}

impl BufferPool {
    /// Creates an empty pool that refuses to grow past `limit` buffers.
    pub fn new(limit: usize, reuse: bool) -> Self {
        Self {
            specs: Vec::new(),
            free: Vec::new(),
            constants: BTreeMap::new(),
            reuse,
            limit,
        }
    }

    /// Number of buffers handed out so far.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[BufferSpec] {
        &self.specs
    }

    fn push(&mut self, spec: BufferSpec) -> Result<BufferId, CompileError> {
        if self.specs.len() >= self.limit {
            return Err(CompileError::OutOfBuffers {
                needed: self.specs.len() + 1,
                limit: self.limit,
            });
        }
        self.specs.push(spec);
        Ok(self.specs.len() - 1)
    }

    /// A shared read-only buffer holding `value` on every channel.
    pub fn constant(
        &mut self,
        kind: SignalType,
        channels: usize,
        value: f32,
    ) -> Result<BufferId, CompileError> {
        let key = (kind, channels, value.to_bits());
        if let Some(&id) = self.constants.get(&key) {
            return Ok(id);
        }
        let id = self.push(BufferSpec {
            kind,
            channels,
            constant: Some(value),
            pinned: true,
        })?;
        self.constants.insert(key, id);
        Ok(id)
    }

    /// A buffer that is never shared.
    pub fn pinned(&mut self, kind: SignalType, channels: usize) -> Result<BufferId, CompileError> {
        self.push(BufferSpec {
            kind,
            channels,
            constant: None,
            pinned: true,
        })
    }

    /// A buffer written at `step`, reusing a released slot of the same shape
    /// whose last reader ran strictly before `step`.
    pub fn acquire(
        &mut self,
        kind: SignalType,
        channels: usize,
        step: usize,
    ) -> Result<BufferId, CompileError> {
        if !self.reuse || !kind.is_audio_rate() {
            return self.pinned(kind, channels);
        }
        let specs = &self.specs;
        let reusable = self.free.iter().position(|&(last_read, id)| {
            last_read < step && specs[id].kind == kind && specs[id].channels == channels
        });
        if let Some(index) = reusable {
            return Ok(self.free.remove(index).1);
        }
        self.push(BufferSpec {
            kind,
            channels,
            constant: None,
            pinned: false,
        })
    }

    /// Marks `id` free for any step after `last_read`.
    pub fn release(&mut self, id: BufferId, last_read: usize) {
        if self.reuse && !self.specs[id].pinned {
            self.free.push((last_read, id));
        }
    }

    /// Allocates the arena. Runs on the control thread only.
    pub fn build_arena(
        &self,
        frames: usize,
        event_capacity: usize,
    ) -> Result<Vec<PortBuffer>, CompileError> {
        let mut arena = Vec::new();
        arena
            .try_reserve_exact(self.specs.len())
            .map_err(|_| CompileError::OutOfBuffers {
                needed: self.specs.len(),
                limit: self.limit,
            })?;
        for spec in &self.specs {
            let mut buffer = PortBuffer::for_port(spec.kind, spec.channels, frames, event_capacity);
            if let (Some(value), Some(signal)) = (spec.constant, buffer.signal_mut()) {
                signal.fill(value);
            }
            arena.push(buffer);
        }
        Ok(arena)
    }
}
