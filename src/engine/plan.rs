//! Compiled execution plans.
//!
//! A [`CompiledPlan`] is the immutable schedule the audio thread runs: node
//! invocations in topological order, the buffer every port reads or writes,
//! and the buffer arena itself. Plans are built on the control thread and
//! handed to the audio thread by ownership, so the arena is never shared.

use std::collections::BTreeMap;

use crate::dsp::{IoRole, PortBuffer, SignalType};
use crate::graph::NodeId;

/// Index of a buffer in a plan's arena.
pub type BufferId = usize;

/// Sums (or merges) several sources into one dedicated buffer before the
/// consuming node runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MixStep {
    pub target: BufferId,
    pub sources: Vec<BufferId>,
}

/// One node invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanStep {
    pub node: NodeId,
    /// Runner slot holding the node's processor; bound by the engine.
    pub slot: Option<usize>,
    pub role: IoRole,
    /// Buffer read by each input port, in input order.
    pub inputs: Vec<BufferId>,
    /// Buffer written by each output port, in output order.
    pub outputs: Vec<BufferId>,
    /// Fan-in mixes to perform before the node runs.
    pub mixes: Vec<MixStep>,
}

/// Shape of one arena buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferSpec {
    pub kind: SignalType,
    pub channels: usize,
    /// Constant buffers hold a port default and are never written.
    pub constant: Option<f32>,
    /// Pinned buffers are never shared with another port.
    pub pinned: bool,
}

/// An ordered, fully bound schedule for one graph snapshot.
pub struct CompiledPlan {
    pub(crate) generation: u64,
    pub(crate) graph_generation: u64,
    pub(crate) steps: Vec<PlanStep>,
    pub(crate) specs: Vec<BufferSpec>,
    pub(crate) arena: Vec<PortBuffer>,
    /// Scratch the runner swaps a node's outputs into while it runs.
    pub(crate) stash: Vec<PortBuffer>,
    pub(crate) max_block_size: usize,
}

impl CompiledPlan {
    /// Publication sequence number; 0 until the engine publishes the plan.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Graph generation this plan was compiled from.
    pub fn graph_generation(&self) -> u64 {
        self.graph_generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Node ids in execution order.
    pub fn order(&self) -> Vec<NodeId> {
        self.steps.iter().map(|step| step.node).collect()
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// The step that runs `node`.
    pub fn step(&self, node: NodeId) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.node == node)
    }

    /// Returns true if the plan invokes `node`.
    pub fn contains(&self, node: NodeId) -> bool {
        self.step(node).is_some()
    }

    pub fn buffer_count(&self) -> usize {
        self.specs.len()
    }

    pub fn buffer_spec(&self, id: BufferId) -> Option<&BufferSpec> {
        self.specs.get(id)
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Binds each step to the runner slot holding its node.
    ///
    /// Steps whose node has no slot stay unbound; the runner skips them.
    pub fn bind_slots(&mut self, slots: &BTreeMap<NodeId, usize>) {
        for step in &mut self.steps {
            step.slot = slots.get(&step.node).copied();
        }
    }

    /// Buffer contents, for inspection after offline rendering.
    pub fn buffer(&self, id: BufferId) -> Option<&PortBuffer> {
        self.arena.get(id)
    }
}

impl std::fmt::Debug for CompiledPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPlan")
            .field("generation", &self.generation)
            .field("graph_generation", &self.graph_generation)
            .field("order", &self.order())
            .field("buffers", &self.specs.len())
            .finish()
    }
}
