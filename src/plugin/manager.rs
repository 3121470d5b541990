//! Plugin manager.
//!
//! Owns the registered plugin formats and the feature gate, and turns
//! descriptors into graph nodes. All of it runs on the control thread.

use tracing::{debug, info, warn};

use crate::graph::Node;
use crate::modules::create_module_registry;
use crate::world::SymbolMap;

use super::descriptor::PluginDescriptor;
use super::error::InstantiationError;
use super::feature::{FeatureGate, StaticFeatureGate};
use super::format::{BuiltinFormat, PluginFormat};

pub struct PluginManager {
    formats: Vec<Box<dyn PluginFormat>>,
    gate: Box<dyn FeatureGate>,
    user_plugins: Vec<PluginDescriptor>,
}

impl PluginManager {
    /// A manager with no formats.
    pub fn new(gate: Box<dyn FeatureGate>) -> Self {
        Self {
            formats: Vec::new(),
            gate,
            user_plugins: Vec::new(),
        }
    }

    /// A manager serving the built-in modules.
    pub fn with_builtins(gate: Box<dyn FeatureGate>) -> Self {
        let mut manager = Self::new(gate);
        manager.add_format(Box::new(BuiltinFormat::new(create_module_registry())));
        manager
    }

    /// Registers a format. Returns false if one with the same name exists.
    pub fn add_format(&mut self, format: Box<dyn PluginFormat>) -> bool {
        if self.format(format.name()).is_some() {
            warn!(format = format.name(), "plugin format registered twice, ignoring");
            return false;
        }
        info!(format = format.name(), "plugin format registered");
        self.formats.push(format);
        true
    }

    pub fn format(&self, name: &str) -> Option<&dyn PluginFormat> {
        self.formats
            .iter()
            .find(|format| format.name() == name)
            .map(|format| format.as_ref())
    }

    pub fn format_names(&self) -> impl Iterator<Item = &str> {
        self.formats.iter().map(|format| format.name())
    }

    pub fn set_feature_gate(&mut self, gate: Box<dyn FeatureGate>) {
        self.gate = gate;
    }

    pub fn is_feature_unlocked(&self, feature: &str) -> bool {
        self.gate.is_feature_unlocked(feature)
    }

    /// Every plugin that can be instantiated right now, locked ones left out.
    pub fn available(&self) -> Vec<PluginDescriptor> {
        self.formats
            .iter()
            .flat_map(|format| {
                format
                    .available()
                    .into_iter()
                    .filter(|descriptor| self.unlocked(format.as_ref(), &descriptor.uri))
            })
            .collect()
    }

    fn unlocked(&self, format: &dyn PluginFormat, uri: &str) -> bool {
        format
            .required_feature(uri)
            .map_or(true, |feature| self.gate.is_feature_unlocked(feature))
    }

    /// Creates a node for `descriptor`.
    pub fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        symbols: &mut SymbolMap,
    ) -> Result<Node, InstantiationError> {
        let format = self
            .format(&descriptor.format)
            .ok_or_else(|| InstantiationError::UnknownFormat(descriptor.format.clone()))?;

        if let Some(feature) = format.required_feature(&descriptor.uri) {
            if !self.gate.is_feature_unlocked(feature) {
                return Err(InstantiationError::FeatureLocked {
                    uri: descriptor.uri.clone(),
                    feature: feature.to_string(),
                });
            }
        }

        symbols.map(&descriptor.uri);
        let processor = format.instantiate(descriptor, symbols)?;
        debug!(plugin = %descriptor, "plugin instantiated");

        let node = Node::new(descriptor.node_kind(), processor);
        Ok(match &descriptor.name {
            Some(name) => node.with_name(name.clone()),
            None => node,
        })
    }

    /// Loads the user's saved plugin list, keeping the entries whose format
    /// is registered. Returns how many were kept.
    pub fn restore_user_plugins(&mut self, saved: &[PluginDescriptor]) -> usize {
        self.user_plugins.clear();
        for descriptor in saved {
            if self.format(&descriptor.format).is_none() {
                warn!(plugin = %descriptor, "saved plugin has no registered format, skipping");
                continue;
            }
            if !self.user_plugins.contains(descriptor) {
                self.user_plugins.push(descriptor.clone());
            }
        }
        info!(count = self.user_plugins.len(), "user plugins restored");
        self.user_plugins.len()
    }

    /// Adds a plugin to the user's list. Returns false if already listed.
    pub fn add_user_plugin(&mut self, descriptor: PluginDescriptor) -> bool {
        if self.user_plugins.contains(&descriptor) {
            return false;
        }
        self.user_plugins.push(descriptor);
        true
    }

    pub fn user_plugins(&self) -> &[PluginDescriptor] {
        &self.user_plugins
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::with_builtins(Box::new(StaticFeatureGate::default()))
    }
}
