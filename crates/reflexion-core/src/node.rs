//! Nodes of the reflexion graph and the subgraph tag.
//!
//! Implementation and architecture nodes share one arena. Each node records
//! its own parent and children by ID, so the hierarchy is a forest of IDs
//! rather than a web of owning references.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::attributes::Attributes;
use crate::id::NodeId;

/// Which of the three combined graphs an element belongs to.
///
/// Nodes are only ever `Implementation` or `Architecture`; `Mapping` tags
/// mapping edges and the events they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subgraph {
    Implementation,
    Architecture,
    Mapping,
}

impl fmt::Display for Subgraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subgraph::Implementation => "implementation",
            Subgraph::Architecture => "architecture",
            Subgraph::Mapping => "mapping",
        };
        f.write_str(name)
    }
}

/// A node in either the implementation or the architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique key across the whole graph (e.g. a fully qualified name).
    pub key: String,
    /// Free-form type tag, e.g. "Class" or "Component".
    pub node_type: String,
    /// Subgraph membership. Fixed for the node's lifetime.
    pub subgraph: Subgraph,
    /// Collaborator attributes.
    pub attributes: Attributes,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 4]>,
}

impl Node {
    pub(crate) fn new(key: String, node_type: String, subgraph: Subgraph) -> Self {
        Node {
            key,
            node_type,
            subgraph,
            attributes: Attributes::default(),
            parent: None,
            children: SmallVec::new(),
        }
    }

    /// The node's parent in its own subgraph, if any.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Direct children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn in_implementation(&self) -> bool {
        self.subgraph == Subgraph::Implementation
    }

    pub fn in_architecture(&self) -> bool {
        self.subgraph == Subgraph::Architecture
    }
}
