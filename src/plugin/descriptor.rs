//! Plugin descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::NodeKind;

use super::format::BUILTIN_FORMAT;

/// Names a plugin by format and URI.
///
/// Descriptors are what settings and patches store; the plugin manager
/// turns one into a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Format that knows how to instantiate the plugin ("builtin", ...).
    pub format: String,
    /// Plugin identifier within the format.
    pub uri: String,
    /// Display name; defaults to the processor's own name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PluginDescriptor {
    pub fn new(format: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            uri: uri.into(),
            name: None,
        }
    }

    /// A built-in module by registry type id.
    pub fn builtin(type_id: impl Into<String>) -> Self {
        Self::new(BUILTIN_FORMAT, type_id)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The descriptor that recreates a node of `kind`.
    pub fn from_kind(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Builtin { type_id } => Self::builtin(type_id.clone()),
            NodeKind::Plugin { format, uri } => Self::new(format.clone(), uri.clone()),
        }
    }

    /// The node kind recorded for instances of this descriptor.
    pub fn node_kind(&self) -> NodeKind {
        if self.format == BUILTIN_FORMAT {
            NodeKind::builtin(self.uri.clone())
        } else {
            NodeKind::plugin(self.format.clone(), self.uri.clone())
        }
    }
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.format, self.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        let builtin = PluginDescriptor::builtin("osc.sine");
        assert_eq!(builtin.node_kind(), NodeKind::builtin("osc.sine"));
        assert_eq!(PluginDescriptor::from_kind(&builtin.node_kind()), builtin);

        let plugin = PluginDescriptor::new("lv2", "urn:example:reverb");
        assert_eq!(plugin.node_kind(), NodeKind::plugin("lv2", "urn:example:reverb"));
        assert_eq!(PluginDescriptor::from_kind(&plugin.node_kind()), plugin);
    }

    #[test]
    fn test_display() {
        assert_eq!(PluginDescriptor::builtin("util.gain").to_string(), "builtin:util.gain");
    }

    #[test]
    fn test_name_is_optional_in_json() {
        let parsed: PluginDescriptor =
            serde_json::from_str(r#"{"format":"builtin","uri":"osc.sine"}"#).unwrap();
        assert_eq!(parsed.name, None);
        let json = serde_json::to_string(&parsed).unwrap();
        assert!(!json.contains("name"));
    }
}
