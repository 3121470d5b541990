//! Graph edges.
//!
//! An [`Edge`] connects an output port to an input port. Ports are addressed
//! by node id plus the port's index among that node's inputs or outputs.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// One port on one node.
///
/// `index` counts within a direction: output 0 is the node's first output,
/// input 0 its first input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub index: usize,
}

impl PortRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.index)
    }
}

/// A directed connection from an output port to an input port.
///
/// Edges are keyed by the (source, dest) pair; ordering sorts by source
/// first, so iterating an edge set is deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: PortRef,
    pub dest: PortRef,
}

/// Handle returned by a successful connect.
pub type EdgeHandle = Edge;

impl Edge {
    pub fn new(source: PortRef, dest: PortRef) -> Self {
        Self { source, dest }
    }

    /// Returns true if either end is on `node`.
    pub fn touches(&self, node: NodeId) -> bool {
        self.source.node == node || self.dest.node == node
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.dest)
    }
}
