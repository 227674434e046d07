//! Edges of the reflexion graph.
//!
//! One edge struct serves all four kinds of edges. Implementation and
//! mapping edges only use the type tag and attributes; specified and
//! propagated edges additionally carry a classification [`State`] and a
//! counter.

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::id::{EdgeId, NodeId};
use crate::node::Subgraph;
use crate::state::State;

/// Type tag of every mapping edge.
pub const MAPS_TO: &str = "Maps_To";

// ---------------------------------------------------------------------------
// Edge kinds
// ---------------------------------------------------------------------------

/// What an edge means in the combined graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// A dependency between two implementation nodes.
    Implementation,
    /// An intended dependency between two architecture nodes.
    Specified,
    /// A dependency lifted from the implementation onto the architecture.
    Propagated,
    /// Assignment of an implementation node to an architecture node.
    Mapping,
}

impl EdgeKind {
    /// The subgraph an edge of this kind is tagged with.
    pub fn subgraph(self) -> Subgraph {
        match self {
            EdgeKind::Implementation => Subgraph::Implementation,
            EdgeKind::Specified | EdgeKind::Propagated => Subgraph::Architecture,
            EdgeKind::Mapping => Subgraph::Mapping,
        }
    }

    /// Returns `true` for edges that carry a classification state.
    pub fn is_classified(self) -> bool {
        matches!(self, EdgeKind::Specified | EdgeKind::Propagated)
    }
}

// ---------------------------------------------------------------------------
// Edge weight
// ---------------------------------------------------------------------------

/// Edge weight stored in the graph arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Free-form dependency type, e.g. "call".
    pub edge_type: String,
    pub kind: EdgeKind,
    pub attributes: Attributes,
    pub(crate) state: State,
    /// Propagated: number of implementation edges lifted onto this edge.
    /// Specified: sum of the counters of the propagated edges it allows.
    pub(crate) counter: u32,
    /// Propagated only: the specified edge this edge is lifted onto.
    pub(crate) allowed_by: Option<EdgeId>,
    /// Specified only: permitted but not required. Changed through
    /// `ReflexionGraph::set_optional` so the edge is reclassified.
    pub(crate) optional: bool,
}

impl Edge {
    pub(crate) fn new(edge_type: String, kind: EdgeKind) -> Self {
        let state = if kind == EdgeKind::Specified {
            State::Specified
        } else {
            State::Undefined
        };
        Edge {
            edge_type,
            kind,
            attributes: Attributes::default(),
            state,
            counter: 0,
            allowed_by: None,
            optional: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// For an allowed propagated edge, the specified edge that allows it.
    pub fn allowed_by(&self) -> Option<EdgeId> {
        self.allowed_by
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn subgraph(&self) -> Subgraph {
        self.kind.subgraph()
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Identity of an edge at the time an event was raised.
///
/// Events outlive the edges they describe, so they carry the endpoints and
/// type by value instead of a reference into the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeInfo {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: String,
}
