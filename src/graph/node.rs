//! Graph nodes.
//!
//! A [`Node`] wraps one processor (built-in or plugin instance) together with
//! the metadata the graph and scheduler need: its ports, its shared parameter
//! bank and its capabilities. The processor itself is lent to the real-time
//! runner while the engine is running and handed back when it stops.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dsp::{IoRole, ParameterBank, PortDefinition, Processor};

/// Stable identifier of a node, assigned by the graph.
///
/// Ids increase monotonically and are never reused within a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node's processor was created from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// A processor from the built-in module registry.
    Builtin { type_id: String },
    /// An instance produced by a plugin format.
    Plugin { format: String, uri: String },
}

impl NodeKind {
    /// Built-in kind for a registry type id.
    pub fn builtin(type_id: impl Into<String>) -> Self {
        NodeKind::Builtin {
            type_id: type_id.into(),
        }
    }

    /// Plugin kind for a format name and plugin URI.
    pub fn plugin(format: impl Into<String>, uri: impl Into<String>) -> Self {
        NodeKind::Plugin {
            format: format.into(),
            uri: uri.into(),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &str {
        match self {
            NodeKind::Builtin { type_id } => type_id,
            NodeKind::Plugin { uri, .. } => uri,
        }
    }
}

/// A processing unit in the graph.
pub struct Node {
    id: Option<NodeId>,
    kind: NodeKind,
    name: String,
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
    parameters: Arc<ParameterBank>,
    feedback: bool,
    io_role: IoRole,
    processor: Option<Box<dyn Processor>>,
}

impl Node {
    /// Wraps a processor. Ports, parameters and capabilities are read once
    /// here and never change afterwards.
    pub fn new(kind: NodeKind, processor: Box<dyn Processor>) -> Self {
        let (inputs, outputs): (Vec<_>, Vec<_>) = processor
            .ports()
            .iter()
            .cloned()
            .partition(PortDefinition::is_input);
        Self {
            id: None,
            name: processor.info().name.to_string(),
            parameters: Arc::new(ParameterBank::new(processor.parameters())),
            feedback: processor.is_feedback(),
            io_role: processor.io_role(),
            kind,
            inputs,
            outputs,
            processor: Some(processor),
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The graph-assigned id, once the node has been added to a graph.
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: NodeId) {
        self.id = Some(id);
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Input ports, in input index order.
    pub fn inputs(&self) -> &[PortDefinition] {
        &self.inputs
    }

    /// Output ports, in output index order.
    pub fn outputs(&self) -> &[PortDefinition] {
        &self.outputs
    }

    pub fn input(&self, index: usize) -> Option<&PortDefinition> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&PortDefinition> {
        self.outputs.get(index)
    }

    /// The parameter bank shared with the audio thread.
    pub fn parameters(&self) -> &Arc<ParameterBank> {
        &self.parameters
    }

    /// Whether edges leaving this node are exempt from ordering and cycle checks.
    pub fn is_feedback(&self) -> bool {
        self.feedback
    }

    pub fn io_role(&self) -> IoRole {
        self.io_role
    }

    /// Returns true while the processor is held by the node (not lent out).
    pub fn has_processor(&self) -> bool {
        self.processor.is_some()
    }

    pub fn processor_mut(&mut self) -> Option<&mut (dyn Processor + 'static)> {
        self.processor.as_deref_mut()
    }

    /// Lends the processor out, leaving the node without one.
    pub fn take_processor(&mut self) -> Option<Box<dyn Processor>> {
        self.processor.take()
    }

    /// Hands a lent processor back.
    pub fn restore_processor(&mut self, processor: Box<dyn Processor>) {
        self.processor = Some(processor);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("feedback", &self.feedback)
            .field("io_role", &self.io_role)
            .field("has_processor", &self.processor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_support::{Passthrough, PortsOnly};
    use crate::dsp::{ParameterDefinition, SignalType};

    #[test]
    fn test_node_splits_ports_by_direction() {
        let node = Node::new(
            NodeKind::builtin("test.node"),
            Box::new(PortsOnly::new(vec![
                PortDefinition::output("out", "Out", SignalType::Audio),
                PortDefinition::input("a", "A", SignalType::Audio),
                PortDefinition::input("b", "B", SignalType::Event),
            ])),
        );
        assert_eq!(node.inputs().len(), 2);
        assert_eq!(node.outputs().len(), 1);
        assert_eq!(node.input(1).unwrap().id, "b");
        assert!(node.input(2).is_none());
        assert_eq!(node.id(), None);
        assert_eq!(node.name(), "Test Node");
    }

    #[test]
    fn test_parameter_bank_built_from_definitions() {
        let node = Node::new(
            NodeKind::builtin("test.node"),
            Box::new(PortsOnly::new(vec![]).with_parameters(vec![
                ParameterDefinition::normalized("level", "Level", 0.25),
            ])),
        );
        assert_eq!(node.parameters().get_by_id("level"), Some(0.25));
    }

    #[test]
    fn test_lend_and_restore_processor() {
        let mut node = Node::new(NodeKind::builtin("test.node"), Box::new(Passthrough::feedback()));
        assert!(node.is_feedback());
        let processor = node.take_processor().unwrap();
        assert!(!node.has_processor());
        assert!(node.processor_mut().is_none());
        node.restore_processor(processor);
        assert!(node.has_processor());
    }

    #[test]
    fn test_node_kind_labels() {
        assert_eq!(NodeKind::builtin("osc.sine").label(), "osc.sine");
        assert_eq!(NodeKind::plugin("lv2", "urn:test").label(), "urn:test");
        assert_eq!(NodeId(7).to_string(), "#7");
    }
}
