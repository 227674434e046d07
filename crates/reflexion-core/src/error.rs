//! Error types for reflexion-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Every public
//! mutation validates its preconditions before touching the graph, so an
//! `Err` always means the graph is unchanged.

use thiserror::Error;

use crate::id::{EdgeId, NodeId};
use crate::node::Subgraph;

/// Errors produced by the reflexion engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReflexionError {
    /// A node ID does not refer to a live node.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// An edge ID does not refer to a live edge.
    #[error("edge not found: EdgeId({id})", id = id.0)]
    EdgeNotFound { id: EdgeId },

    /// Another node already uses this key.
    #[error("duplicate node key: '{key}'")]
    DuplicateNodeKey { key: String },

    /// Nodes can only be created in the implementation or the architecture.
    #[error("nodes cannot be placed in the {subgraph} subgraph")]
    InvalidSubgraph { subgraph: Subgraph },

    /// The node belongs to a different subgraph than the operation requires.
    #[error("node {node} is not part of the {expected} subgraph")]
    NotInSubgraph { node: NodeId, expected: Subgraph },

    /// Edge endpoints lie in different subgraphs.
    #[error("edge from {from} to {to} crosses subgraphs; use add_to_mapping for mapping edges")]
    CrossSubgraphEdge { from: NodeId, to: NodeId },

    /// The requested parent is the child itself or one of its descendants.
    #[error("making {parent} the parent of {child} would create a cycle")]
    CyclicHierarchy { child: NodeId, parent: NodeId },

    /// The child already has a parent.
    #[error("node {child} already has parent {parent}")]
    NotAnOrphan { child: NodeId, parent: NodeId },

    /// The node is a root and cannot be unparented.
    #[error("node {node} has no parent")]
    NoParent { node: NodeId },

    /// The node has children and no orphan policy was given.
    #[error("node {node} still has {children} children")]
    NodeHasChildren { node: NodeId, children: usize },

    /// Propagated edges are derived and cannot be edited directly.
    #[error("edge {edge} is a propagated edge and is maintained by the analysis")]
    DerivedEdge { edge: EdgeId },

    /// The operation only applies to specified architecture edges.
    #[error("edge {edge} is not a specified architecture edge")]
    NotASpecifiedEdge { edge: EdgeId },

    /// A specified edge would be implied by (or imply) another one.
    #[error(
        "specified edge {from} -> {to} ('{edge_type}') is redundant with specified edge {existing}"
    )]
    RedundantSpecifiedEdge {
        from: NodeId,
        to: NodeId,
        edge_type: String,
        existing: EdgeId,
    },

    /// The implementation node already has an explicit mapping.
    #[error("node {node} is already explicitly mapped onto {target}")]
    AlreadyExplicitlyMapped { node: NodeId, target: NodeId },

    /// The implementation node has no explicit mapping to remove.
    #[error("node {node} is not explicitly mapped")]
    NotExplicitlyMapped { node: NodeId },

    /// No specified or propagated edge exists for the triple.
    #[error("no dependency {from} -> {to} of type '{edge_type}'")]
    NoSuchDependency {
        from: NodeId,
        to: NodeId,
        edge_type: String,
    },

    /// An internal invariant was violated.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

/// Coarse classification of [`ReflexionError`]s for callers that only need
/// to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The mutation would break a structural invariant.
    Structural,
    /// The mutation would duplicate information already in the architecture.
    Redundancy,
    /// A lookup found nothing.
    NotFound,
    /// Internal failure or bad configuration.
    Internal,
}

impl ReflexionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReflexionError::RedundantSpecifiedEdge { .. } => ErrorCategory::Redundancy,
            ReflexionError::NodeNotFound { .. }
            | ReflexionError::EdgeNotFound { .. }
            | ReflexionError::NoSuchDependency { .. }
            | ReflexionError::NotExplicitlyMapped { .. }
            | ReflexionError::NoParent { .. } => ErrorCategory::NotFound,
            ReflexionError::GraphInconsistency { .. } | ReflexionError::Config { .. } => {
                ErrorCategory::Internal
            }
            _ => ErrorCategory::Structural,
        }
    }
}
