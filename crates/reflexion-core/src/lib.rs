//! Incremental reflexion analysis.
//!
//! A [`ReflexionGraph`] holds an implementation hierarchy, an architecture
//! hierarchy, and an explicit mapping between them. Implementation
//! dependencies are lifted onto the architecture and each resulting
//! dependency is classified against the specified architecture edges.
//! Every mutation updates the result incrementally and reports what changed
//! as [`ChangeEvent`]s.

pub mod analysis;
pub mod attributes;
pub mod bus;
pub mod config;
pub mod edge;
pub mod error;
pub mod event;
pub mod graph;
pub mod id;
pub mod node;
pub mod state;

mod classify;
mod hierarchy;
mod mapping;
mod propagation;

// Re-export commonly used types
pub use analysis::{Classification, Summary};
pub use attributes::Attributes;
pub use bus::{EventBus, EventRecorder, Observer};
pub use config::ReflexionConfig;
pub use edge::{Edge, EdgeInfo, EdgeKind, MAPS_TO};
pub use error::{ErrorCategory, ReflexionError};
pub use event::{ChangeEvent, ChangeType};
pub use graph::{OrphanPolicy, ReflexionGraph};
pub use id::{EdgeId, NodeId, SubscriberId};
pub use node::{Node, Subgraph};
pub use state::State;
