//! Change events raised by the reflexion graph.
//!
//! Every structural mutation and every consequence the analysis derives
//! from it is reported as one [`ChangeEvent`]. The set of variants is
//! closed; observers match on it.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::edge::EdgeInfo;
use crate::id::NodeId;
use crate::node::Subgraph;
use crate::state::State;

/// Whether an element was added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Addition,
    Removal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// A node was added to or removed from the graph.
    Node {
        node: NodeId,
        key: String,
        change: ChangeType,
        subgraph: Subgraph,
    },
    /// An implementation, specified, or mapping edge was added or removed.
    Edge {
        edge: EdgeInfo,
        change: ChangeType,
        subgraph: Subgraph,
    },
    /// `child` was attached to or detached from `parent`.
    Hierarchy {
        parent: NodeId,
        child: NodeId,
        change: ChangeType,
        subgraph: Subgraph,
    },
    /// A propagated edge was created (counter 1) or deleted (counter 0).
    PropagatedEdge { edge: EdgeInfo, change: ChangeType },
    /// The counter of a surviving propagated edge changed.
    PropagatedCounter { edge: EdgeInfo, old: u32, new: u32 },
    /// The classification of a specified or propagated edge changed.
    EdgeState {
        edge: EdgeInfo,
        old: State,
        new: State,
    },
}

impl ChangeEvent {
    /// The subgraph this event affects.
    pub fn subgraph(&self) -> Subgraph {
        match self {
            ChangeEvent::Node { subgraph, .. }
            | ChangeEvent::Edge { subgraph, .. }
            | ChangeEvent::Hierarchy { subgraph, .. } => *subgraph,
            ChangeEvent::PropagatedEdge { .. }
            | ChangeEvent::PropagatedCounter { .. }
            | ChangeEvent::EdgeState { .. } => Subgraph::Architecture,
        }
    }

    /// The edge this event is about, if any.
    pub fn edge(&self) -> Option<&EdgeInfo> {
        match self {
            ChangeEvent::Edge { edge, .. }
            | ChangeEvent::PropagatedEdge { edge, .. }
            | ChangeEvent::PropagatedCounter { edge, .. }
            | ChangeEvent::EdgeState { edge, .. } => Some(edge),
            ChangeEvent::Node { .. } | ChangeEvent::Hierarchy { .. } => None,
        }
    }

    pub fn is_state_change(&self) -> bool {
        matches!(self, ChangeEvent::EdgeState { .. })
    }

    pub fn is_propagated_addition(&self) -> bool {
        matches!(
            self,
            ChangeEvent::PropagatedEdge {
                change: ChangeType::Addition,
                ..
            }
        )
    }

    pub fn is_propagated_removal(&self) -> bool {
        matches!(
            self,
            ChangeEvent::PropagatedEdge {
                change: ChangeType::Removal,
                ..
            }
        )
    }
}

impl Display for ChangeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Addition => f.write_str("+"),
            ChangeType::Removal => f.write_str("-"),
        }
    }
}

impl Display for ChangeEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::Node {
                key,
                change,
                subgraph,
                ..
            } => write!(f, "{change}node {key} ({subgraph})"),
            ChangeEvent::Edge {
                edge,
                change,
                subgraph,
            } => write!(
                f,
                "{change}edge {} -> {} '{}' ({subgraph})",
                edge.source, edge.target, edge.edge_type
            ),
            ChangeEvent::Hierarchy {
                parent,
                child,
                change,
                subgraph,
            } => write!(f, "{change}child {child} of {parent} ({subgraph})"),
            ChangeEvent::PropagatedEdge { edge, change } => write!(
                f,
                "{change}propagated {} -> {} '{}'",
                edge.source, edge.target, edge.edge_type
            ),
            ChangeEvent::PropagatedCounter { edge, old, new } => write!(
                f,
                "counter {} -> {} '{}': {old} => {new}",
                edge.source, edge.target, edge.edge_type
            ),
            ChangeEvent::EdgeState { edge, old, new } => write!(
                f,
                "state {} -> {} '{}': {old} => {new}",
                edge.source, edge.target, edge.edge_type
            ),
        }
    }
}
