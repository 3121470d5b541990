//! World module
//!
//! [`World`] is the host's process-wide context: settings, the symbol map,
//! the plugin manager, the engine and the table of loaded extension
//! modules. It is built once at startup and passed to whatever needs it.
//! Dropping it unloads every extension before the engine shuts down.

pub mod extension;
pub mod symbols;

use std::collections::BTreeMap;

use libloading::Library;
use tracing::{info, warn};

use crate::config::Settings;
use crate::engine::{AudioDriver, Engine, EngineError};
use crate::graph::{Node, NodeId};
use crate::persistence::{Patch, PatchError};
use crate::plugin::{InstantiationError, PluginDescriptor, PluginManager, StaticFeatureGate};

pub use extension::{find_module, library_file_name, Extension, ExtensionError, ENTRY_SYMBOL};
pub use symbols::{Symbol, SymbolMap, MIDI_EVENT_URI};

use extension::{open_library, LoadedExtension};

pub struct World {
    extensions: BTreeMap<String, LoadedExtension>,
    engine: Engine,
    plugins: PluginManager,
    symbols: SymbolMap,
    settings: Settings,
    // Libraries of unloaded extensions. Declared last: formats and
    // processors created by an extension may live in its library.
    libraries: Vec<Library>,
}

impl World {
    /// Builds the world from `settings`, running the engine on `driver`.
    ///
    /// Restores the user's plugin list and loads the autoload modules;
    /// modules that fail to load are logged and skipped.
    pub fn new(settings: Settings, driver: Box<dyn AudioDriver>) -> Self {
        let mut symbols = SymbolMap::new();
        symbols.map(MIDI_EVENT_URI);

        let gate = StaticFeatureGate::new(settings.features.unlocked.iter().cloned());
        let mut plugins = PluginManager::with_builtins(Box::new(gate));
        plugins.restore_user_plugins(&settings.plugins.user_plugins);

        let engine = Engine::new(driver, settings.engine_settings());

        let mut world = Self {
            extensions: BTreeMap::new(),
            engine,
            plugins,
            symbols,
            settings,
            libraries: Vec::new(),
        };

        let autoload = world.settings.modules.autoload.clone();
        for name in autoload {
            if let Err(e) = world.load_module(&name) {
                warn!(module = %name, error = %e, "autoload module failed");
            }
        }
        world
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginManager {
        &mut self.plugins
    }

    pub fn symbols(&self) -> &SymbolMap {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolMap {
        &mut self.symbols
    }

    /// Creates a node without adding it to the graph.
    pub fn instantiate(&mut self, descriptor: &PluginDescriptor) -> Result<Node, InstantiationError> {
        self.plugins.instantiate(descriptor, &mut self.symbols)
    }

    /// Creates a node and adds it to the engine's graph.
    pub fn add_plugin(&mut self, descriptor: &PluginDescriptor) -> Result<NodeId, EngineError> {
        let node = self.instantiate(descriptor)?;
        self.engine.add_node(node)
    }

    /// Restores `patch` into the engine. Returns the graph id of each patch
    /// node id.
    pub fn load_patch(&mut self, patch: &Patch) -> Result<BTreeMap<u64, NodeId>, PatchError> {
        patch.restore_into(&mut self.engine, &self.plugins, &mut self.symbols)
    }

    /// Captures the current graph.
    pub fn save_patch(&self, name: impl Into<String>) -> Patch {
        Patch::from_graph(self.engine.graph(), name)
    }
}

impl World {
    /// Adds an extension that lives in the host binary and calls its `load`.
    ///
    /// Returns `Ok(false)` if an extension with that name is already loaded.
    pub fn register_extension(&mut self, extension: Box<dyn Extension>) -> Result<bool, ExtensionError> {
        self.install(LoadedExtension::in_process(extension))
    }

    /// Loads the extension module `name` from the module search path.
    ///
    /// Returns `Ok(false)` without reloading if it is already loaded.
    pub fn load_module(&mut self, name: &str) -> Result<bool, ExtensionError> {
        if self.extensions.contains_key(name) {
            return Ok(false);
        }
        let path = find_module(name, &self.settings.module_search_path())?;
        let loaded = open_library(&path)?;
        if loaded.extension.name() != name {
            warn!(
                module = name,
                declared = loaded.extension.name(),
                "extension library declares a different name"
            );
        }
        info!(module = name, path = %path.display(), "extension library opened");
        self.install(loaded)
    }

    fn install(&mut self, mut loaded: LoadedExtension) -> Result<bool, ExtensionError> {
        let name = loaded.extension.name().to_string();
        if self.extensions.contains_key(&name) {
            return Ok(false);
        }
        if let Err(e) = loaded.extension.load(self) {
            self.retire(loaded);
            return Err(e);
        }
        info!(module = %name, source = loaded.source(), "extension loaded");
        self.extensions.insert(name, loaded);
        Ok(true)
    }

    /// Runs a loaded extension.
    pub fn execute(&mut self, name: &str) -> Result<(), ExtensionError> {
        let mut loaded = self
            .extensions
            .remove(name)
            .ok_or_else(|| ExtensionError::NotLoaded(name.to_string()))?;
        let result = loaded.extension.run(self);
        self.extensions.insert(name.to_string(), loaded);
        if let Err(e) = &result {
            warn!(module = name, error = %e, "extension run failed");
        }
        result
    }

    /// Unloads an extension.
    ///
    /// Its library stays mapped until the world is dropped, since plugin
    /// formats and processors it created may still be in use.
    pub fn unload_module(&mut self, name: &str) -> Result<(), ExtensionError> {
        let loaded = self
            .extensions
            .remove(name)
            .ok_or_else(|| ExtensionError::NotLoaded(name.to_string()))?;
        self.retire(loaded);
        info!(module = name, "extension unloaded");
        Ok(())
    }

    fn retire(&mut self, loaded: LoadedExtension) {
        if let Some(library) = loaded.unload() {
            self.libraries.push(library);
        }
    }

    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    /// Names of the loaded extensions, sorted.
    pub fn loaded_modules(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }
}

impl Drop for World {
    fn drop(&mut self) {
        for (name, loaded) in std::mem::take(&mut self.extensions) {
            self.retire(loaded);
            info!(module = %name, "extension unloaded");
        }
        if let Err(e) = self.engine.shutdown() {
            warn!(error = %e, "engine shutdown failed");
        }
        // The engine, its nodes and the plugin formats drop with their
        // fields; `libraries` is dropped after them.
    }
}
