//! The real-time runner.
//!
//! [`AudioRunner`] lives inside the device callback. It owns the processors
//! (in fixed slots) and the active plan, receives new plans and processors
//! from the control thread through a lock-free command queue, and sends
//! everything it lets go of back through a retire queue so nothing is ever
//! freed on the audio thread.
//!
//! REAL-TIME SAFE: `process` and everything it calls never allocate, lock,
//! block or log.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::dsp::{EventBuffer, Inputs, IoRole, MidiEvent, PortBuffer, ProcessContext};

use super::channels::RunnerHandle;
use super::commands::{Retired, RunnerCommand, SlotEntry};
use super::plan::{CompiledPlan, MixStep};

/// State the audio thread publishes for the control thread.
#[derive(Debug, Default)]
pub struct RunnerStatus {
    active_generation: AtomicU64,
    callbacks: AtomicU64,
    plan_swaps: AtomicU64,
    dropped_events: AtomicU64,
    missing_slots: AtomicU64,
    deferred_commands: AtomicU64,
    in_callback: AtomicBool,
    stop_requested: AtomicBool,
}

/// A point-in-time copy of the runner counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunnerCounters {
    pub active_generation: u64,
    pub callbacks: u64,
    pub plan_swaps: u64,
    pub dropped_events: u64,
    pub missing_slots: u64,
    pub deferred_commands: u64,
}

impl RunnerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the plan the audio thread is running (0 for none).
    pub fn active_generation(&self) -> u64 {
        self.active_generation.load(Ordering::Acquire)
    }

    /// Callbacks completed, used as the audio thread's epoch.
    pub fn epoch(&self) -> u64 {
        self.callbacks.load(Ordering::Acquire)
    }

    pub fn in_callback(&self) -> bool {
        self.in_callback.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn counters(&self) -> RunnerCounters {
        RunnerCounters {
            active_generation: self.active_generation(),
            callbacks: self.epoch(),
            plan_swaps: self.plan_swaps.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            missing_slots: self.missing_slots.load(Ordering::Relaxed),
            deferred_commands: self.deferred_commands.load(Ordering::Relaxed),
        }
    }
}

/// Fixed geometry of a runner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunnerConfig {
    pub sample_rate: f32,
    pub max_block_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
    pub max_nodes: usize,
    pub event_capacity: usize,
}

/// What a runner gives back when it is torn down.
pub struct RunnerParts {
    pub entries: Vec<SlotEntry>,
    pub plan: Option<Box<CompiledPlan>>,
    pub midi: Option<Consumer<MidiEvent>>,
    /// Commands that were queued but never applied.
    pub pending: Vec<RunnerCommand>,
}

/// Drives the active plan once per device callback.
pub struct AudioRunner {
    config: RunnerConfig,
    status: Arc<RunnerStatus>,
    handle: RunnerHandle,
    slots: Vec<Option<SlotEntry>>,
    plan: Option<Box<CompiledPlan>>,
    midi: Option<Consumer<MidiEvent>>,
    midi_block: EventBuffer,
    position: u64,
}

impl AudioRunner {
    /// Creates a runner with `max_nodes` empty slots. Allocates; call off
    /// the audio thread.
    pub fn new(
        config: RunnerConfig,
        status: Arc<RunnerStatus>,
        handle: RunnerHandle,
    ) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(config.max_nodes).collect(),
            midi_block: EventBuffer::with_capacity(config.event_capacity),
            config,
            status,
            handle,
            plan: None,
            midi: None,
            position: 0,
        }
    }

    /// Attaches the device MIDI feed.
    pub fn with_midi(mut self, feed: Option<Consumer<MidiEvent>>) -> Self {
        self.midi = feed;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The plan currently being run.
    pub fn plan(&self) -> Option<&CompiledPlan> {
        self.plan.as_deref()
    }

    /// Frames rendered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Applies queued commands in order.
    ///
    /// Every command retires at most one item, so a command is only taken
    /// while the retire queue has room; the rest wait for the next call.
    pub fn drain_commands(&mut self) {
        while let Some(command) = self.handle.recv_command() {
            let retired = match command {
                RunnerCommand::Install { slot, entry } => match self.slots.get_mut(slot) {
                    Some(place) => place
                        .replace(entry)
                        .map(|old| Retired::Node { slot, entry: old }),
                    None => Some(Retired::Rejected(entry)),
                },
                RunnerCommand::Remove { slot } => self
                    .slots
                    .get_mut(slot)
                    .and_then(Option::take)
                    .map(|entry| Retired::Node { slot, entry }),
                RunnerCommand::Publish(plan) => {
                    let generation = plan.generation();
                    let old = self.plan.replace(plan);
                    self.status
                        .active_generation
                        .store(generation, Ordering::Release);
                    self.status.plan_swaps.fetch_add(1, Ordering::Relaxed);
                    old.map(Retired::Plan)
                }
            };
            if let Some(item) = retired {
                let _ = self.handle.retire(item);
            }
        }
        if self.handle.commands_pending() > 0 {
            self.status.deferred_commands.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Renders one device callback.
    ///
    /// `input` and `output` are interleaved with the configured channel
    /// counts. Callbacks longer than the maximum block are rendered in
    /// chunks.
    pub fn process(&mut self, input: &[f32], output: &mut [f32], frames: usize) {
        self.status.in_callback.store(true, Ordering::SeqCst);
        output.fill(0.0);

        if !self.status.stop_requested() {
            self.drain_commands();
            self.collect_midi();

            let max_block = self.config.max_block_size.max(1);
            let mut offset = 0;
            while offset < frames {
                let chunk = (frames - offset).min(max_block);
                self.render_chunk(input, output, offset, chunk);
                offset += chunk;
            }
            self.position += frames as u64;
        }

        self.status.callbacks.fetch_add(1, Ordering::AcqRel);
        self.status.in_callback.store(false, Ordering::SeqCst);
    }

    fn collect_midi(&mut self) {
        self.midi_block.clear();
        let Some(feed) = self.midi.as_mut() else {
            return;
        };
        let mut dropped = 0;
        while let Ok(event) = feed.pop() {
            if !self.midi_block.push(event) {
                dropped += 1;
            }
        }
        self.midi_block.take_dropped();
        if dropped > 0 {
            self.status.dropped_events.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    fn render_chunk(&mut self, input: &[f32], output: &mut [f32], offset: usize, frames: usize) {
        let Some(plan) = self.plan.as_deref_mut() else {
            return;
        };
        let CompiledPlan {
            steps, arena, stash, ..
        } = plan;
        let context = ProcessContext {
            sample_rate: self.config.sample_rate,
            block_size: frames,
            sample_position: self.position + offset as u64,
        };
        let in_channels = self.config.input_channels;
        let out_channels = self.config.output_channels;
        let mut dropped = 0u64;

        for step in steps.iter() {
            for mix in &step.mixes {
                mix_into(arena, mix, frames);
            }

            let Some(entry) = step
                .slot
                .and_then(|slot| self.slots.get_mut(slot))
                .and_then(Option::as_mut)
            else {
                self.status.missing_slots.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let outputs = &mut stash[..step.outputs.len()];
            for (held, &id) in outputs.iter_mut().zip(&step.outputs) {
                std::mem::swap(held, &mut arena[id]);
                held.clear();
            }

            match step.role {
                IoRole::AudioInput if in_channels > 0 => {
                    if let Some(signal) = outputs.first_mut().and_then(PortBuffer::signal_mut) {
                        for ch in 0..signal.channels() {
                            let samples = signal.channel_mut(ch);
                            let source = ch % in_channels;
                            for (i, sample) in samples[..frames].iter_mut().enumerate() {
                                *sample = input
                                    .get((offset + i) * in_channels + source)
                                    .copied()
                                    .unwrap_or(0.0);
                            }
                        }
                    }
                }
                IoRole::MidiInput if offset == 0 => {
                    if let Some(events) = outputs.first_mut().and_then(PortBuffer::events_mut) {
                        events.extend_from(&self.midi_block);
                    }
                }
                _ => {}
            }

            entry.parameters.snapshot_into(&mut entry.values);
            entry.processor.process(
                &Inputs::new(arena, &step.inputs),
                outputs,
                &entry.values,
                &context,
            );

            for (held, &id) in outputs.iter_mut().zip(&step.outputs) {
                if let Some(events) = held.events_mut() {
                    dropped += events.take_dropped() as u64;
                }
                std::mem::swap(held, &mut arena[id]);
            }

            if step.role == IoRole::AudioOutput && out_channels > 0 {
                if let Some(signal) = step.inputs.first().and_then(|&id| arena[id].signal()) {
                    for ch in 0..out_channels {
                        let samples = signal.channel(ch);
                        for (i, sample) in samples[..frames].iter().enumerate() {
                            if let Some(out) = output.get_mut((offset + i) * out_channels + ch) {
                                *out += *sample;
                            }
                        }
                    }
                }
            }
        }

        if dropped > 0 {
            self.status.dropped_events.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    /// Tears the runner down, returning everything it owned.
    pub fn into_parts(mut self) -> RunnerParts {
        let pending = self.handle.take_pending();
        RunnerParts {
            entries: self.slots.drain(..).flatten().collect(),
            plan: self.plan.take(),
            midi: self.midi.take(),
            pending,
        }
    }
}

/// Fills a mix target from its sources.
fn mix_into(arena: &mut [PortBuffer], mix: &MixStep, frames: usize) {
    let mut target = std::mem::take(&mut arena[mix.target]);
    match &mut target {
        PortBuffer::Signal(signal) => {
            signal.clear();
            for &source in &mix.sources {
                if let Some(source) = arena[source].signal() {
                    signal.mix_from(source, frames);
                }
            }
        }
        PortBuffer::Events(events) => {
            events.clear();
            for &source in &mix.sources {
                if let Some(source) = arena[source].events() {
                    events.extend_from(source);
                }
            }
        }
    }
    arena[mix.target] = target;
}

/// The runner as held by a device callback.
///
/// Dropping the slot (when the driver closes the stream and drops its
/// callback) sends the runner home so the control thread can recover the
/// processors.
pub struct CallbackSlot {
    runner: Option<AudioRunner>,
    home: Producer<AudioRunner>,
}

impl CallbackSlot {
    /// Wraps `runner`; returns the slot and the receiving end of its way home.
    pub fn new(runner: AudioRunner) -> (Self, Consumer<AudioRunner>) {
        let (home, returned) = RingBuffer::new(1);
        (
            Self {
                runner: Some(runner),
                home,
            },
            returned,
        )
    }

    #[inline]
    pub fn process(&mut self, input: &[f32], output: &mut [f32], frames: usize) {
        match self.runner.as_mut() {
            Some(runner) => runner.process(input, output, frames),
            None => output.fill(0.0),
        }
    }
}

impl Drop for CallbackSlot {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.take() {
            let _ = self.home.push(runner);
        }
    }
}
