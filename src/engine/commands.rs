//! Runner Commands
//!
//! Defines the messages that flow between the control thread and the audio
//! runner. Everything that crosses to the audio thread travels by ownership
//! and comes back the same way, so the audio thread never frees memory.

use std::sync::Arc;

use crate::dsp::{ParameterBank, Processor};
use crate::graph::NodeId;

use super::plan::CompiledPlan;

/// A processor installed in a runner slot, with its parameter bank and a
/// scratch slice for the per-block parameter snapshot.
pub struct SlotEntry {
    pub node: NodeId,
    pub processor: Box<dyn Processor>,
    pub parameters: Arc<ParameterBank>,
    pub(crate) values: Vec<f32>,
}

impl SlotEntry {
    pub fn new(node: NodeId, processor: Box<dyn Processor>, parameters: Arc<ParameterBank>) -> Self {
        Self {
            node,
            processor,
            values: vec![0.0; parameters.len()],
            parameters,
        }
    }
}

impl std::fmt::Debug for SlotEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotEntry")
            .field("node", &self.node)
            .field("processor", &self.processor.info().id)
            .finish()
    }
}

/// Commands sent from the control thread to the runner.
/// These are applied in order at the start of a callback.
pub enum RunnerCommand {
    /// Put a prepared processor into a slot.
    Install {
        /// Slot index, below the runner's node capacity.
        slot: usize,
        /// The processor and its parameters.
        entry: SlotEntry,
    },

    /// Take a processor out of its slot and send it back.
    Remove {
        /// Slot index.
        slot: usize,
    },

    /// Replace the active plan.
    Publish(Box<CompiledPlan>),
}

impl std::fmt::Debug for RunnerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerCommand::Install { slot, entry } => f
                .debug_struct("Install")
                .field("slot", slot)
                .field("node", &entry.node)
                .finish(),
            RunnerCommand::Remove { slot } => f.debug_struct("Remove").field("slot", slot).finish(),
            RunnerCommand::Publish(plan) => f.debug_tuple("Publish").field(&plan.generation()).finish(),
        }
    }
}

/// Things the runner hands back for the control thread to drop.
#[derive(Debug)]
pub enum Retired {
    /// A plan superseded by a newer one.
    Plan(Box<CompiledPlan>),

    /// A processor taken out of a slot.
    Node {
        /// The slot it was in.
        slot: usize,
        /// The processor.
        entry: SlotEntry,
    },

    /// An install aimed at a slot that does not exist.
    Rejected(SlotEntry),
}
