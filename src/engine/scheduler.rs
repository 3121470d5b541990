//! Plan compilation.
//!
//! Turns a graph snapshot into a [`CompiledPlan`]: a deterministic execution
//! order from Kahn's algorithm over audio-rate dependency edges, then buffer
//! bindings for every port.
//!
//! # Ordering
//!
//! Audio and control edges leaving a non-feedback node are hard
//! dependencies. Event edges and edges leaving a feedback node only express
//! a preference: among ready nodes the scheduler picks one with no
//! unscheduled soft producers, falling back to the lowest id. A feedback
//! consumer therefore runs after its producer unless a loop closes through
//! it. Ties always break on node id, so identical graphs
//! compile to identical orders.
//!
//! # Buffers
//!
//! An input fed by exactly one source aliases that source's output buffer.
//! Fan-in gets a dedicated mix buffer filled right before the node runs, and
//! an unconnected input reads a shared constant holding the port default.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::dsp::{PortBuffer, SignalType};
use crate::graph::{channels_compatible, Edge, Graph, NodeId, PortRef};

use super::buffer_pool::BufferPool;
use super::error::CompileError;
use super::plan::{BufferId, CompiledPlan, MixStep, PlanStep};

/// Knobs for plan compilation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompileOptions {
    /// Frames per buffer.
    pub max_block_size: usize,
    /// Arena size limit; exceeding it fails with `OutOfBuffers`.
    pub max_buffers: usize,
    /// Share audio-rate buffers between ports with disjoint lifetimes.
    pub reuse_buffers: bool,
    /// Events each event buffer can hold per block.
    pub event_capacity: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_block_size: 256,
            max_buffers: 1024,
            reuse_buffers: true,
            event_capacity: 512,
        }
    }
}

/// Compiles graphs into plans.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    options: CompileOptions,
}

impl Scheduler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Builds a plan for the current graph.
    ///
    /// The returned plan has generation 0 and unbound slots; the engine sets
    /// both when it publishes.
    pub fn compile(&self, graph: &Graph) -> Result<CompiledPlan, CompileError> {
        check_arity(graph)?;
        let order = execution_order(graph)?;
        let position: BTreeMap<NodeId, usize> =
            order.iter().enumerate().map(|(step, &id)| (id, step)).collect();

        let mut pool = BufferPool::new(self.options.max_buffers, self.options.reuse_buffers);
        let mut outputs: BTreeMap<PortRef, BufferId> = BTreeMap::new();

        // First pass: every output gets a buffer, walking in execution order
        // so released slots can be picked up by later steps.
        for (step, &id) in order.iter().enumerate() {
            let Some(node) = graph.node(id) else { continue };
            for (index, port) in node.outputs().iter().enumerate() {
                let port_ref = PortRef::new(id, index);
                let readers: Vec<usize> = graph
                    .edges()
                    .filter(|edge| edge.source == port_ref)
                    .filter_map(|edge| position.get(&edge.dest.node).copied())
                    .collect();
                let read_early = readers.iter().any(|&reader| reader <= step);
                let buffer = if node.is_feedback() || read_early {
                    pool.pinned(port.signal_type, port.channels)?
                } else {
                    let last_read = readers.into_iter().max().unwrap_or(step);
                    let buffer = pool.acquire(port.signal_type, port.channels, step)?;
                    pool.release(buffer, last_read);
                    buffer
                };
                outputs.insert(port_ref, buffer);
            }
        }

        // Second pass: bind inputs.
        let mut steps = Vec::with_capacity(order.len());
        let mut max_outputs = 0;
        for (step, &id) in order.iter().enumerate() {
            let Some(node) = graph.node(id) else { continue };
            let mut inputs = Vec::with_capacity(node.inputs().len());
            let mut mixes = Vec::new();
            for (index, port) in node.inputs().iter().enumerate() {
                let sources: Vec<&Edge> = graph.edges_into(PortRef::new(id, index)).collect();
                let buffer = match sources.as_slice() {
                    [] => pool.constant(port.signal_type, port.channels, port.default_value)?,
                    [edge] if edge.source.node != id => outputs[&edge.source],
                    _ => {
                        let target = pool.acquire(port.signal_type, port.channels, step)?;
                        pool.release(target, step);
                        mixes.push(MixStep {
                            target,
                            sources: sources.iter().map(|edge| outputs[&edge.source]).collect(),
                        });
                        target
                    }
                };
                inputs.push(buffer);
            }
            let step_outputs: Vec<BufferId> = (0..node.outputs().len())
                .map(|index| outputs[&PortRef::new(id, index)])
                .collect();
            max_outputs = max_outputs.max(step_outputs.len());
            steps.push(PlanStep {
                node: id,
                slot: None,
                role: node.io_role(),
                inputs,
                outputs: step_outputs,
                mixes,
            });
        }

        let arena = pool.build_arena(self.options.max_block_size, self.options.event_capacity)?;
        let stash = std::iter::repeat_with(PortBuffer::default)
            .take(max_outputs)
            .collect();

        debug!(
            nodes = steps.len(),
            buffers = pool.len(),
            graph_generation = graph.generation(),
            "plan compiled"
        );

        Ok(CompiledPlan {
            generation: 0,
            graph_generation: graph.generation(),
            steps,
            specs: pool.specs().to_vec(),
            arena,
            stash,
            max_block_size: self.options.max_block_size,
        })
    }
}

/// Checks every audio-rate edge for compatible channel widths.
fn check_arity(graph: &Graph) -> Result<(), CompileError> {
    for edge in graph.edges() {
        let source = graph
            .node(edge.source.node)
            .and_then(|node| node.output(edge.source.index));
        let dest = graph
            .node(edge.dest.node)
            .and_then(|node| node.input(edge.dest.index));
        if let (Some(source), Some(dest)) = (source, dest) {
            if !channels_compatible(source, dest) {
                return Err(CompileError::PortArityMismatch {
                    edge: *edge,
                    source_channels: source.channels,
                    dest_channels: dest.channels,
                });
            }
        }
    }
    Ok(())
}

/// Edges that nudge ordering without constraining it: event edges and
/// edges leaving a feedback node.
fn is_soft(graph: &Graph, edge: &Edge) -> bool {
    if edge.source.node == edge.dest.node || graph.is_dependency(edge) {
        return false;
    }
    graph.node(edge.source.node).is_some_and(|node| {
        node.output(edge.source.index)
            .is_some_and(|port| node.is_feedback() || port.signal_type == SignalType::Event)
    })
}

/// Stable topological order of the graph's nodes.
///
/// Nodes left over because of an unbroken audio-rate cycle are reported
/// in ascending id order.
pub fn execution_order(graph: &Graph) -> Result<Vec<NodeId>, CompileError> {
    let mut hard: BTreeMap<NodeId, usize> = graph.node_ids().map(|id| (id, 0)).collect();
    let mut soft = hard.clone();

    for edge in graph.edges() {
        if graph.is_dependency(edge) {
            *hard.entry(edge.dest.node).or_default() += 1;
        } else if is_soft(graph, edge) {
            *soft.entry(edge.dest.node).or_default() += 1;
        }
    }

    let mut ready: BTreeSet<NodeId> = hard
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut order = Vec::with_capacity(graph.len());

    while let Some(next) = ready
        .iter()
        .copied()
        .find(|id| soft.get(id).copied().unwrap_or(0) == 0)
        .or_else(|| ready.first().copied())
    {
        ready.remove(&next);
        order.push(next);

        for edge in graph.edges().filter(|edge| edge.source.node == next) {
            let dest = edge.dest.node;
            if graph.is_dependency(edge) {
                if let Some(degree) = hard.get_mut(&dest) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dest);
                    }
                }
            } else if is_soft(graph, edge) {
                if let Some(degree) = soft.get_mut(&dest) {
                    *degree = degree.saturating_sub(1);
                }
            }
        }
    }

    if order.len() < graph.len() {
        let scheduled: BTreeSet<NodeId> = order.iter().copied().collect();
        let nodes = graph
            .node_ids()
            .filter(|id| !scheduled.contains(id))
            .collect();
        return Err(CompileError::CycleDetected { nodes });
    }
    Ok(order)
}
