//! Plugin module
//!
//! Turns plugin descriptors into graph nodes: the format factories behind a
//! uniform [`Processor`](crate::dsp::Processor) interface, the feature gate
//! that decides which node types are available, and the manager that ties
//! them together.

pub mod descriptor;
pub mod error;
pub mod feature;
pub mod format;
pub mod manager;

pub use descriptor::PluginDescriptor;
pub use error::InstantiationError;
pub use feature::{FeatureGate, StaticFeatureGate};
pub use format::{BuiltinFormat, PluginFormat, BUILTIN_FORMAT};
pub use manager::PluginManager;
