//! Plugin instantiation errors.

use thiserror::Error;

/// Errors returned when turning a [`PluginDescriptor`](super::PluginDescriptor)
/// into a processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantiationError {
    #[error("no plugin format named '{0}'")]
    UnknownFormat(String),

    #[error("format '{format}' has no plugin '{uri}'")]
    UnknownPlugin { format: String, uri: String },

    #[error("plugin '{uri}' needs feature '{feature}', which is locked")]
    FeatureLocked { uri: String, feature: String },

    #[error("plugin '{uri}' failed to instantiate: {reason}")]
    Failed { uri: String, reason: String },
}
