//! Persistence module
//!
//! Patch save/load using serde and JSON.

pub mod patch;

pub use patch::{ConnectionData, NodeData, Patch, PatchError, PATCH_VERSION};
