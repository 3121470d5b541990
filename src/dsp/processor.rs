//! The core `Processor` trait and supporting types.
//!
//! This module defines the uniform node contract that every built-in
//! processor and every plugin adapter implements, so the graph and the
//! scheduler never see the underlying plugin ABI.

use super::context::ProcessContext;
use super::parameter::ParameterDefinition;
use super::port::PortDefinition;
use super::signal::{EventBuffer, PortBuffer, SignalBuffer};

/// Category of a processor, used for organization and listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleCategory {
    /// Sound sources (oscillators, noise generators, samplers).
    Source,
    /// Audio effects (delay, filters, dynamics).
    Effect,
    /// Utility processors (mixers, gains, converters).
    Utility,
    /// Device endpoints (audio/MIDI input and output).
    Io,
    /// Externally loaded plugin instances.
    Plugin,
}

impl ModuleCategory {
    /// Returns a human-readable name for the category.
    pub fn name(&self) -> &'static str {
        match self {
            ModuleCategory::Source => "Source",
            ModuleCategory::Effect => "Effect",
            ModuleCategory::Utility => "Utility",
            ModuleCategory::Io => "I/O",
            ModuleCategory::Plugin => "Plugin",
        }
    }
}

/// Static information about a processor type.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleInfo {
    /// Unique identifier for the processor type (e.g., "osc.sine").
    pub id: &'static str,
    /// Human-readable name (e.g., "Sine Oscillator").
    pub name: &'static str,
    /// The category this processor belongs to.
    pub category: ModuleCategory,
    /// A brief description of what the processor does.
    pub description: &'static str,
}

impl ModuleInfo {
    /// Creates a new module info.
    pub fn new(
        id: &'static str,
        name: &'static str,
        category: ModuleCategory,
        description: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            category,
            description,
        }
    }
}

/// How a node is tied to the audio device.
///
/// The runner fills the outputs of `AudioInput`/`MidiInput` nodes from the
/// device before the plan runs and reads the inputs of `AudioOutput` nodes
/// after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoRole {
    None,
    AudioInput,
    AudioOutput,
    MidiInput,
}

/// Read-only view of a node's input buffers for one process call.
///
/// Inputs either alias an upstream output buffer, a dedicated mix buffer,
/// or a constant buffer holding the port default.
#[derive(Clone, Copy)]
pub struct Inputs<'a> {
    arena: &'a [PortBuffer],
    bindings: &'a [usize],
}

impl<'a> Inputs<'a> {
    /// Builds a view over `arena` where input `i` reads `arena[bindings[i]]`.
    pub fn new(arena: &'a [PortBuffer], bindings: &'a [usize]) -> Self {
        Self { arena, bindings }
    }

    /// A view with no inputs.
    pub fn empty() -> Self {
        Self {
            arena: &[],
            bindings: &[],
        }
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if the node has no inputs.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Returns input `index`.
    pub fn get(&self, index: usize) -> Option<&'a PortBuffer> {
        self.bindings.get(index).and_then(|&id| self.arena.get(id))
    }

    /// Returns input `index` as samples.
    pub fn signal(&self, index: usize) -> Option<&'a SignalBuffer> {
        self.get(index).and_then(PortBuffer::signal)
    }

    /// Returns input `index` as events.
    pub fn events(&self, index: usize) -> Option<&'a EventBuffer> {
        self.get(index).and_then(PortBuffer::events)
    }
}

/// The node contract shared by built-in processors and plugin adapters.
///
/// # Thread Safety
///
/// `Processor` requires `Send + 'static` because instances are created and
/// prepared on the control thread and then handed to the audio thread.
///
/// # Lifecycle
///
/// `prepare` and `release` run on the control thread and may allocate.
/// `process` runs on the audio thread.
pub trait Processor: Send + 'static {
    /// Returns static information about this processor.
    fn info(&self) -> &ModuleInfo;

    /// Returns the port definitions.
    ///
    /// Inputs are numbered in the order they appear among input ports, and
    /// outputs likewise. The list must not change after construction.
    fn ports(&self) -> &[PortDefinition];

    /// Returns the parameter definitions, in the order of the `params` slice
    /// passed to `process`.
    fn parameters(&self) -> &[ParameterDefinition];

    /// Prepares the processor for a sample rate and maximum block size.
    ///
    /// Called off the audio thread, before first use and whenever the device
    /// geometry changes. Allocate delay lines and scratch buffers here.
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize);

    /// Processes one block.
    ///
    /// * `inputs` - Input buffers, indexed by input port order
    /// * `outputs` - Output buffers to fill, indexed by output port order
    /// * `params` - Current parameter values, indexed by parameter order
    /// * `context` - Sample rate, frames in this block, and position
    ///
    /// # Real-time Constraints
    ///
    /// This method runs on the audio thread and must not:
    /// - Allocate memory
    /// - Acquire locks
    /// - Perform I/O operations
    /// - Call any functions that might block
    fn process(
        &mut self,
        inputs: &Inputs<'_>,
        outputs: &mut [PortBuffer],
        params: &[f32],
        context: &ProcessContext,
    );

    /// Clears internal state (delay lines, phases) without freeing it.
    fn reset(&mut self) {}

    /// Frees resources acquired in `prepare`. Called off the audio thread.
    fn release(&mut self) {}

    /// Whether this node breaks feedback cycles.
    ///
    /// Edges leaving a feedback node are not scheduling dependencies; the
    /// consumer reads what the node produced in the previous block.
    fn is_feedback(&self) -> bool {
        false
    }

    /// How this node is tied to the audio device, if at all.
    fn io_role(&self) -> IoRole {
        IoRole::None
    }
}

/// Counts of a port list by direction.
pub fn port_counts(ports: &[PortDefinition]) -> (usize, usize) {
    let inputs = ports.iter().filter(|p| p.is_input()).count();
    (inputs, ports.len() - inputs)
}
