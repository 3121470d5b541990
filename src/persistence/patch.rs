//! Patch documents.
//!
//! A patch captures a graph as JSON: every node with its kind, display name
//! and parameter values, plus every connection. Ports and parameters are
//! stored by id rather than index so a patch survives a module gaining
//! ports or parameters.
//!
//! ```json
//! {
//!   "name": "Demo",
//!   "version": 1,
//!   "nodes": [
//!     { "id": 1, "kind": "builtin", "type_id": "osc.sine", "name": "Sine Oscillator",
//!       "parameters": { "frequency": 220.0, "fm_depth": 0.0 } }
//!   ],
//!   "connections": [
//!     { "from_node": 1, "from_port": "out", "to_node": 2, "to_port": "in" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError};
use crate::graph::{Graph, Node, NodeId, NodeKind, PortRef};
use crate::plugin::{InstantiationError, PluginDescriptor, PluginManager};
use crate::world::SymbolMap;

/// Current patch format version.
/// Increment this when making breaking changes to the format.
pub const PATCH_VERSION: u32 = 1;

/// Errors from saving, loading or restoring a patch.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("patch is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("incompatible patch version: found {found}, expected <= {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    #[error("patch lists node {0} twice")]
    DuplicateNode(u64),

    #[error("connection refers to unknown node {0}")]
    UnknownNode(u64),

    #[error("node {node} has no port '{port}'")]
    UnknownPort { node: u64, port: String },

    #[error("cannot create node {node}: {source}")]
    Instantiation {
        node: u64,
        #[source]
        source: InstantiationError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A complete patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Human-readable name for the patch.
    pub name: String,
    /// Patch format version for future compatibility.
    pub version: u32,
    pub nodes: Vec<NodeData>,
    pub connections: Vec<ConnectionData>,
}

/// One node in a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Identifier within the patch, referenced by connections. Not the
    /// graph id the node gets on restore.
    pub id: u64,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Parameter values by parameter id, in the parameter's own units.
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
}

impl NodeData {
    pub fn new(id: u64, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            name: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, id: impl Into<String>, value: f32) -> Self {
        self.parameters.insert(id.into(), value);
        self
    }

    fn descriptor(&self) -> PluginDescriptor {
        let descriptor = PluginDescriptor::from_kind(&self.kind);
        match &self.name {
            Some(name) => descriptor.with_name(name.clone()),
            None => descriptor,
        }
    }
}

/// A connection between two nodes in a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionData {
    pub from_node: u64,
    /// Output port id on the source node.
    pub from_port: String,
    pub to_node: u64,
    /// Input port id on the destination node.
    pub to_port: String,
}

impl ConnectionData {
    pub fn new(
        from_node: u64,
        from_port: impl Into<String>,
        to_node: u64,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            from_node,
            from_port: from_port.into(),
            to_node,
            to_port: to_port.into(),
        }
    }
}

impl Patch {
    /// Create a new empty patch with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: PATCH_VERSION,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Check if this patch version is compatible with the current format.
    pub fn is_compatible(&self) -> bool {
        self.version <= PATCH_VERSION
    }

    /// Captures `graph`. Patch node ids are the graph's node ids.
    pub fn from_graph(graph: &Graph, name: impl Into<String>) -> Self {
        let mut patch = Self::new(name);

        for node in graph.nodes() {
            let Some(id) = node.id() else { continue };
            let bank = node.parameters();
            let parameters = bank
                .definitions()
                .iter()
                .enumerate()
                .filter_map(|(index, def)| bank.get(index).map(|v| (def.id.to_string(), v)))
                .collect();
            patch.nodes.push(NodeData {
                id: id.index(),
                kind: node.kind().clone(),
                name: Some(node.name().to_string()),
                parameters,
            });
        }

        for edge in graph.edges() {
            let port_id = |port: PortRef, output: bool| {
                graph.node(port.node).and_then(|node| {
                    let ports = if output { node.outputs() } else { node.inputs() };
                    ports.get(port.index).map(|def| def.id)
                })
            };
            if let (Some(from), Some(to)) = (port_id(edge.source, true), port_id(edge.dest, false)) {
                patch.connections.push(ConnectionData::new(
                    edge.source.node.index(),
                    from,
                    edge.dest.node.index(),
                    to,
                ));
            }
        }

        patch
    }

    /// Recreates the patch in `engine`, creating nodes through `plugins`.
    ///
    /// Every node is instantiated and every connection resolved before the
    /// engine is touched. If adding or connecting fails part way, the nodes
    /// added so far are removed again. Returns the graph id of each patch
    /// node id.
    pub fn restore_into(
        &self,
        engine: &mut Engine,
        plugins: &PluginManager,
        symbols: &mut SymbolMap,
    ) -> Result<BTreeMap<u64, NodeId>, PatchError> {
        self.check_version()?;

        let mut nodes: BTreeMap<u64, Node> = BTreeMap::new();
        for data in &self.nodes {
            if nodes.contains_key(&data.id) {
                return Err(PatchError::DuplicateNode(data.id));
            }
            let node = plugins
                .instantiate(&data.descriptor(), symbols)
                .map_err(|source| PatchError::Instantiation {
                    node: data.id,
                    source,
                })?;
            for (param, &value) in &data.parameters {
                if node.parameters().set_by_id(param, value).is_none() {
                    warn!(node = data.id, parameter = %param, "patch parameter not found, skipping");
                }
            }
            nodes.insert(data.id, node);
        }

        let mut links = Vec::with_capacity(self.connections.len());
        for connection in &self.connections {
            let source = resolve_port(&nodes, connection.from_node, &connection.from_port, true)?;
            let dest = resolve_port(&nodes, connection.to_node, &connection.to_port, false)?;
            links.push((connection.from_node, source, connection.to_node, dest));
        }

        let mut ids = BTreeMap::new();
        for (patch_id, node) in nodes {
            match engine.add_node(node) {
                Ok(id) => {
                    ids.insert(patch_id, id);
                }
                Err(e) => {
                    rollback(engine, &ids);
                    return Err(e.into());
                }
            }
        }

        for (from_node, from_index, to_node, to_index) in links {
            let (Some(&from), Some(&to)) = (ids.get(&from_node), ids.get(&to_node)) else {
                continue;
            };
            if let Err(e) = engine.connect(PortRef::new(from, from_index), PortRef::new(to, to_index)) {
                rollback(engine, &ids);
                return Err(e.into());
            }
        }

        info!(
            patch = %self.name,
            nodes = ids.len(),
            connections = self.connections.len(),
            "patch restored"
        );
        Ok(ids)
    }

    fn check_version(&self) -> Result<(), PatchError> {
        if self.is_compatible() {
            Ok(())
        } else {
            Err(PatchError::IncompatibleVersion {
                found: self.version,
                expected: PATCH_VERSION,
            })
        }
    }

    /// Save the patch to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PatchError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "patch saved");
        Ok(())
    }

    /// Load a patch from a JSON file, rejecting newer format versions.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PatchError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let patch: Patch = serde_json::from_str(&json)?;
        patch.check_version()?;
        debug!(path = %path.as_ref().display(), patch = %patch.name, "patch loaded");
        Ok(patch)
    }
}

impl Default for Patch {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

fn resolve_port(
    nodes: &BTreeMap<u64, Node>,
    node: u64,
    port: &str,
    output: bool,
) -> Result<usize, PatchError> {
    let target = nodes.get(&node).ok_or(PatchError::UnknownNode(node))?;
    let ports = if output { target.outputs() } else { target.inputs() };
    ports
        .iter()
        .position(|def| def.id == port)
        .ok_or_else(|| PatchError::UnknownPort {
            node,
            port: port.to_string(),
        })
}

fn rollback(engine: &mut Engine, ids: &BTreeMap<u64, NodeId>) {
    for &id in ids.values() {
        if let Err(e) = engine.remove_node(id) {
            warn!(node = %id, error = %e, "failed to remove node while undoing patch restore");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSettings, OfflineDriver};
    use crate::plugin::StaticFeatureGate;

    fn engine() -> Engine {
        Engine::new(Box::new(OfflineDriver::new()), EngineSettings::default())
    }

    fn demo_patch() -> Patch {
        let mut patch = Patch::new("Demo");
        patch.nodes.push(
            NodeData::new(1, NodeKind::builtin("osc.sine")).with_parameter("frequency", 220.0),
        );
        patch
            .nodes
            .push(NodeData::new(2, NodeKind::builtin("util.gain")).with_parameter("level", 0.5));
        patch.nodes.push(NodeData::new(3, NodeKind::builtin("io.audio_out")));
        patch.connections.push(ConnectionData::new(1, "out", 2, "in"));
        patch.connections.push(ConnectionData::new(2, "out", 3, "in"));
        patch
    }

    #[test]
    fn test_patch_creation() {
        let patch = Patch::new("Test Patch");
        assert_eq!(patch.name, "Test Patch");
        assert_eq!(patch.version, PATCH_VERSION);
        assert!(patch.nodes.is_empty());
        assert!(patch.connections.is_empty());
    }

    #[test]
    fn test_node_json_layout() {
        let node = NodeData::new(4, NodeKind::builtin("osc.sine")).with_parameter("frequency", 110.0);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "builtin");
        assert_eq!(json["type_id"], "osc.sine");
        assert_eq!(json["parameters"]["frequency"], 110.0);

        let parsed: NodeData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn test_restore_builds_graph() {
        let mut engine = engine();
        let plugins = PluginManager::default();
        let mut symbols = SymbolMap::new();

        let ids = demo_patch()
            .restore_into(&mut engine, &plugins, &mut symbols)
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(engine.graph().len(), 3);
        assert_eq!(engine.graph().edge_count(), 2);
        assert_eq!(engine.parameter(ids[&1], "frequency"), Some(220.0));
        assert_eq!(engine.parameter(ids[&2], "level"), Some(0.5));
        assert!(engine
            .graph()
            .contains_edge(PortRef::new(ids[&1], 0), PortRef::new(ids[&2], 0)));
    }

    #[test]
    fn test_from_graph_captures_restored_patch() {
        let mut engine = engine();
        let plugins = PluginManager::default();
        demo_patch()
            .restore_into(&mut engine, &plugins, &mut SymbolMap::new())
            .unwrap();

        let saved = Patch::from_graph(engine.graph(), "Again");
        assert_eq!(saved.nodes.len(), 3);
        assert_eq!(saved.connections.len(), 2);
        let osc = saved
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::builtin("osc.sine"))
            .unwrap();
        assert_eq!(osc.parameters["frequency"], 220.0);
        assert_eq!(osc.name.as_deref(), Some("Sine Oscillator"));
        assert!(saved
            .connections
            .iter()
            .all(|c| c.from_port == "out" && c.to_port == "in"));

        // Restoring the captured patch into a fresh engine gives the same shape.
        let mut copy = Engine::new(Box::new(OfflineDriver::new()), EngineSettings::default());
        saved
            .restore_into(&mut copy, &plugins, &mut SymbolMap::new())
            .unwrap();
        assert_eq!(copy.graph().len(), 3);
        assert_eq!(copy.graph().edge_count(), 2);
    }

    #[test]
    fn test_unknown_port_leaves_engine_untouched() {
        let mut engine = engine();
        let mut patch = demo_patch();
        patch.connections.push(ConnectionData::new(1, "sync", 2, "in"));

        let err = patch
            .restore_into(&mut engine, &PluginManager::default(), &mut SymbolMap::new())
            .unwrap_err();
        assert!(matches!(err, PatchError::UnknownPort { node: 1, ref port } if port == "sync"));
        assert!(engine.graph().is_empty());
    }

    #[test]
    fn test_rejected_connection_rolls_back() {
        let mut engine = engine();
        let mut patch = demo_patch();
        // A second source into the non-summing gain input.
        patch.nodes.push(NodeData::new(4, NodeKind::builtin("osc.sine")));
        patch.connections.push(ConnectionData::new(4, "out", 2, "in"));

        let err = patch
            .restore_into(&mut engine, &PluginManager::default(), &mut SymbolMap::new())
            .unwrap_err();
        assert!(matches!(err, PatchError::Engine(_)), "got: {err}");
        assert!(engine.graph().is_empty());
    }

    #[test]
    fn test_locked_node_fails_restore() {
        let mut patch = Patch::new("Locked");
        patch.nodes.push(NodeData::new(1, NodeKind::builtin("fx.delay")));

        let locked = PluginManager::with_builtins(Box::new(StaticFeatureGate::default()));
        let err = patch
            .restore_into(&mut engine(), &locked, &mut SymbolMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PatchError::Instantiation {
                node: 1,
                source: InstantiationError::FeatureLocked { .. }
            }
        ));
    }

    #[test]
    fn test_duplicate_node_id() {
        let mut patch = Patch::new("Twice");
        patch.nodes.push(NodeData::new(1, NodeKind::builtin("osc.sine")));
        patch.nodes.push(NodeData::new(1, NodeKind::builtin("util.gain")));

        let err = patch
            .restore_into(&mut engine(), &PluginManager::default(), &mut SymbolMap::new())
            .unwrap_err();
        assert!(matches!(err, PatchError::DuplicateNode(1)));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");

        let patch = demo_patch();
        patch.save(&path).unwrap();
        assert_eq!(Patch::load(&path).unwrap(), patch);
    }

    #[test]
    fn test_load_rejects_newer_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        let mut patch = Patch::new("Future");
        patch.version = PATCH_VERSION + 1;
        patch.save(&path).unwrap();

        let err = Patch::load(&path).unwrap_err();
        assert!(matches!(
            err,
            PatchError::IncompatibleVersion { found, expected } if found == PATCH_VERSION + 1 && expected == PATCH_VERSION
        ));
    }
}
