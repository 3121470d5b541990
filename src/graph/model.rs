//! The mutable processing graph.
//!
//! [`Graph`] owns the node set and the edge set and keeps the audio-rate
//! part of the graph acyclic. It is only touched by the control thread;
//! the engine compiles it into immutable plans for the audio thread.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::dsp::PortDirection;

use super::edge::{Edge, EdgeHandle, PortRef};
use super::error::GraphError;
use super::node::{Node, NodeId};
use super::validation::validate_connection;

/// Nodes and the directed edges between their ports.
///
/// Every successful structural edit bumps [`generation`](Graph::generation),
/// which the engine compares against the last compiled plan. Parameter
/// writes are not structural and leave the generation alone.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeSet<Edge>,
    next_id: u64,
    generation: u64,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural generation counter.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn contains_edge(&self, source: PortRef, dest: PortRef) -> bool {
        self.edges.contains(&Edge::new(source, dest))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Edges in (source, dest) order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Edges feeding one input port.
    pub fn edges_into(&self, dest: PortRef) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.dest == dest)
    }

    /// Adds a node and returns its fresh id.
    pub fn add_node(&mut self, mut node: Node) -> Result<NodeId, GraphError> {
        if let Some(existing) = node.id() {
            return Err(GraphError::DuplicateNode(existing));
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        node.assign_id(id);
        debug!(node = %id, kind = node.kind().label(), "node added");
        self.nodes.insert(id, node);
        self.generation += 1;
        Ok(id)
    }

    /// Removes a node together with every edge touching it.
    ///
    /// The returned node keeps its id, so it cannot be added again.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        let node = self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))?;
        let before = self.edges.len();
        self.edges.retain(|edge| !edge.touches(id));
        debug!(
            node = %id,
            edges_removed = before - self.edges.len(),
            "node removed"
        );
        self.generation += 1;
        Ok(node)
    }

    /// Connects an output port to an input port.
    pub fn connect(&mut self, source: PortRef, dest: PortRef) -> Result<EdgeHandle, GraphError> {
        let edge = Edge::new(source, dest);
        let from = self
            .nodes
            .get(&source.node)
            .ok_or(GraphError::UnknownNode(source.node))?;
        let to = self
            .nodes
            .get(&dest.node)
            .ok_or(GraphError::UnknownNode(dest.node))?;
        let out_port = from.output(source.index).ok_or(GraphError::UnknownPort {
            node: source.node,
            direction: PortDirection::Output,
            index: source.index,
        })?;
        let in_port = to.input(dest.index).ok_or(GraphError::UnknownPort {
            node: dest.node,
            direction: PortDirection::Input,
            index: dest.index,
        })?;

        validate_connection(out_port.signal_type, in_port.signal_type)?;

        if self.edges.contains(&edge) {
            return Err(GraphError::DuplicateEdge(edge));
        }
        if !in_port.summing && self.edges_into(dest).next().is_some() {
            return Err(GraphError::InputAlreadyConnected {
                node: dest.node,
                index: dest.index,
            });
        }
        if self.is_dependency(&edge) && self.reaches(dest.node, source.node) {
            return Err(GraphError::WouldCreateCycle(edge));
        }

        self.edges.insert(edge);
        self.generation += 1;
        debug!(edge = %edge, "connected");
        Ok(edge)
    }

    /// Removes one edge.
    pub fn disconnect(&mut self, source: PortRef, dest: PortRef) -> Result<(), GraphError> {
        let edge = Edge::new(source, dest);
        if !self.edges.remove(&edge) {
            return Err(GraphError::UnknownEdge(edge));
        }
        self.generation += 1;
        debug!(edge = %edge, "disconnected");
        Ok(())
    }

    /// Writes a parameter by name. Returns the stored (clamped) value.
    pub fn set_parameter(&self, id: NodeId, name: &str, value: f32) -> Result<f32, GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
        node.parameters()
            .set_by_id(name, value)
            .ok_or_else(|| GraphError::UnknownParameter {
                node: id,
                name: name.to_string(),
            })
    }

    /// Reads a parameter by name.
    pub fn parameter(&self, id: NodeId, name: &str) -> Option<f32> {
        self.nodes.get(&id)?.parameters().get_by_id(name)
    }

    /// Whether an edge orders its endpoints: an audio-rate source on a node
    /// that is not a feedback node.
    pub fn is_dependency(&self, edge: &Edge) -> bool {
        self.nodes
            .get(&edge.source.node)
            .filter(|node| !node.is_feedback())
            .and_then(|node| node.output(edge.source.index))
            .is_some_and(|port| port.signal_type.is_audio_rate())
    }

    /// Inserts an edge without any checks, to build graphs `connect` refuses.
    #[cfg(test)]
    pub(crate) fn force_edge(&mut self, edge: Edge) {
        self.edges.insert(edge);
        self.generation += 1;
    }

    /// Returns true if `to` is reachable from `from` over dependency edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            stack.extend(
                self.edges
                    .iter()
                    .filter(|edge| edge.source.node == current && self.is_dependency(edge))
                    .map(|edge| edge.dest.node),
            );
        }
        false
    }
}
