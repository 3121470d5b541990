//! Catalog of built-in processor types.
//!
//! The registry maps a type id such as `"osc.sine"` to a factory, so the
//! plugin manager and patch loader can create processors by name.

use std::collections::HashMap;

use tracing::warn;

use super::processor::{ModuleInfo, Processor};

/// Factory function type for creating processor instances.
pub type ModuleFactory = fn() -> Box<dyn Processor>;

struct Entry {
    factory: ModuleFactory,
    feature: Option<&'static str>,
}

/// Central registry of built-in processor types.
pub struct ModuleRegistry {
    entries: HashMap<&'static str, Entry>,
    /// Registration order, for stable listings.
    infos: Vec<ModuleInfo>,
}

impl ModuleRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            infos: Vec::new(),
        }
    }

    /// Registers a processor type that is always available.
    ///
    /// A temporary instance is created to read the type's info. Returns
    /// false and leaves the registry unchanged if the id is already taken.
    pub fn register<M: Processor + Default>(&mut self) -> bool {
        self.insert::<M>(None)
    }

    /// Registers a processor type that is only available once `feature`
    /// is unlocked.
    pub fn register_gated<M: Processor + Default>(&mut self, feature: &'static str) -> bool {
        self.insert::<M>(Some(feature))
    }

    fn insert<M: Processor + Default>(&mut self, feature: Option<&'static str>) -> bool {
        let info = M::default().info().clone();
        if self.entries.contains_key(info.id) {
            warn!(module = info.id, "module type registered twice, ignoring");
            return false;
        }
        self.entries.insert(
            info.id,
            Entry {
                factory: create_module::<M>,
                feature,
            },
        );
        self.infos.push(info);
        true
    }

    /// Creates a new instance by type id.
    pub fn create(&self, id: &str) -> Option<Box<dyn Processor>> {
        self.entries.get(id).map(|entry| (entry.factory)())
    }

    /// The feature an id is gated behind, if any.
    pub fn required_feature(&self, id: &str) -> Option<&'static str> {
        self.entries.get(id).and_then(|entry| entry.feature)
    }

    /// Lists registered types in registration order.
    pub fn list_modules(&self) -> &[ModuleInfo] {
        &self.infos
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks if a type id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn create_module<M: Processor + Default>() -> Box<dyn Processor> {
    Box::new(M::default())
}
