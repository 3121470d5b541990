//! Graph module
//!
//! The control-side processing graph: nodes wrapping processors, edges
//! between their ports, connection validation and the structural error
//! taxonomy.

pub mod edge;
pub mod error;
pub mod model;
pub mod node;
pub mod validation;

pub use edge::{Edge, EdgeHandle, PortRef};
pub use error::GraphError;
pub use model::Graph;
pub use node::{Node, NodeId, NodeKind};
pub use validation::{channels_compatible, validate_connection};
