//! Plugin formats.
//!
//! A format is a factory for one family of plugins (the built-in module
//! registry, a native plugin standard, a set of processors registered by an
//! extension module). The graph only ever sees the [`Processor`] a format
//! returns.

use crate::dsp::{ModuleRegistry, Processor};
use crate::world::SymbolMap;

use super::descriptor::PluginDescriptor;
use super::error::InstantiationError;

/// Format name of the built-in module registry.
pub const BUILTIN_FORMAT: &str = "builtin";

/// A factory for one family of plugins.
pub trait PluginFormat: Send {
    /// Format name, as used in [`PluginDescriptor::format`].
    fn name(&self) -> &str;

    /// Every plugin this format can instantiate.
    fn available(&self) -> Vec<PluginDescriptor>;

    /// The feature a plugin is gated behind, if any.
    fn required_feature(&self, _uri: &str) -> Option<&str> {
        None
    }

    /// Creates a fresh processor. Runs on the control thread.
    ///
    /// `symbols` lets formats intern the URIs their plugins exchange.
    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        symbols: &mut SymbolMap,
    ) -> Result<Box<dyn Processor>, InstantiationError>;
}

/// The built-in modules, served from a [`ModuleRegistry`].
pub struct BuiltinFormat {
    registry: ModuleRegistry,
}

impl BuiltinFormat {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }
}

impl PluginFormat for BuiltinFormat {
    fn name(&self) -> &str {
        BUILTIN_FORMAT
    }

    fn available(&self) -> Vec<PluginDescriptor> {
        self.registry
            .list_modules()
            .iter()
            .map(|info| PluginDescriptor::builtin(info.id).with_name(info.name))
            .collect()
    }

    fn required_feature(&self, uri: &str) -> Option<&str> {
        self.registry.required_feature(uri)
    }

    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        _symbols: &mut SymbolMap,
    ) -> Result<Box<dyn Processor>, InstantiationError> {
        self.registry
            .create(&descriptor.uri)
            .ok_or_else(|| InstantiationError::UnknownPlugin {
                format: BUILTIN_FORMAT.to_string(),
                uri: descriptor.uri.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::create_module_registry;

    #[test]
    fn test_builtin_lists_registry() {
        let format = BuiltinFormat::new(create_module_registry());
        let available = format.available();
        assert_eq!(available.len(), format.registry().len());
        assert!(available
            .iter()
            .any(|d| d.uri == "osc.sine" && d.name.as_deref() == Some("Sine Oscillator")));
    }

    #[test]
    fn test_builtin_instantiates_by_uri() {
        let format = BuiltinFormat::new(create_module_registry());
        let mut symbols = SymbolMap::new();
        let processor = format
            .instantiate(&PluginDescriptor::builtin("util.gain"), &mut symbols)
            .unwrap();
        assert_eq!(processor.info().id, "util.gain");
    }

    #[test]
    fn test_builtin_unknown_uri() {
        let format = BuiltinFormat::new(create_module_registry());
        let err = format
            .instantiate(&PluginDescriptor::builtin("osc.saw"), &mut SymbolMap::new())
            .err()
            .unwrap();
        assert_eq!(
            err,
            InstantiationError::UnknownPlugin {
                format: "builtin".to_string(),
                uri: "osc.saw".to_string()
            }
        );
    }

    #[test]
    fn test_builtin_reports_gated_modules() {
        let format = BuiltinFormat::new(create_module_registry());
        assert_eq!(format.required_feature("fx.delay"), Some("effects"));
        assert_eq!(format.required_feature("osc.sine"), None);
    }
}
