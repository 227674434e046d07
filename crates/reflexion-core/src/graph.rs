//! ReflexionGraph: implementation, architecture, and mapping in one arena.
//!
//! [`ReflexionGraph`] is the single entry point for building and analysing a
//! reflexion model. All three subgraphs share one petgraph `StableGraph`;
//! every node and edge is tagged with the subgraph it belongs to, and the
//! graph rejects edges whose endpoints do not fit their kind.
//!
//! # Lifecycle
//!
//! A freshly created graph is a plain store: nodes, edges, hierarchy, and
//! mappings can be added in any order and no propagated edges exist.
//! [`run_analysis`](ReflexionGraph::run_analysis) computes the full
//! classification once and switches the graph to incremental mode, in
//! which every later mutation updates propagation and classification
//! before it returns.
//!
//! # Events
//!
//! Every mutation publishes [`ChangeEvent`]s on the graph's [`EventBus`]
//! in the order the underlying changes happen.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::bus::{EventBus, Observer};
use crate::config::ReflexionConfig;
use crate::edge::{Edge, EdgeInfo, EdgeKind};
use crate::error::ReflexionError;
use crate::event::{ChangeEvent, ChangeType};
use crate::id::{EdgeId, NodeId, SubscriberId};
use crate::node::{Node, Subgraph};
use crate::state::State;

/// Source, target, and type of an architecture dependency.
pub(crate) type Triple = (NodeId, NodeId, String);

/// What happens to the children of a removed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrphanPolicy {
    /// Refuse to remove a node that has children.
    #[default]
    Reject,
    /// Children become roots.
    BecomeRoots,
    /// Children are attached to the removed node's parent.
    MoveToParent,
    /// The whole subtree is removed.
    RemoveSubtree,
}

/// The combined reflexion graph.
#[derive(Debug)]
pub struct ReflexionGraph {
    graph: StableGraph<Node, Edge, Directed, u32>,
    /// Node key -> node.
    keys: HashMap<String, NodeId>,
    pub(crate) config: ReflexionConfig,
    /// Explicit mappings: implementation node -> (architecture node, mapping edge).
    pub(crate) explicit: IndexMap<NodeId, (NodeId, EdgeId)>,
    /// Every implementation node with a mapped ancestor-or-self -> its target.
    pub(crate) implicit: HashMap<NodeId, NodeId>,
    pub(crate) specified: IndexMap<Triple, EdgeId>,
    pub(crate) propagated: IndexMap<Triple, EdgeId>,
    /// Set by the first `run_analysis`; propagation is inert before that.
    pub(crate) running: bool,
    pub(crate) bus: EventBus,
}

impl Default for ReflexionGraph {
    fn default() -> Self {
        Self::new(ReflexionConfig::default())
    }
}

impl ReflexionGraph {
    pub fn new(config: ReflexionConfig) -> Self {
        ReflexionGraph {
            graph: StableGraph::new(),
            keys: HashMap::new(),
            config,
            explicit: IndexMap::new(),
            implicit: HashMap::new(),
            specified: IndexMap::new(),
            propagated: IndexMap::new(),
            running: false,
            bus: EventBus::new(),
        }
    }

    pub fn config(&self) -> &ReflexionConfig {
        &self.config
    }

    /// Returns `true` once [`run_analysis`](Self::run_analysis) has been
    /// called and mutations are analysed incrementally.
    pub fn is_analysis_running(&self) -> bool {
        self.running
    }

    // -----------------------------------------------------------------------
    // Subscriptions and batching
    // -----------------------------------------------------------------------

    pub fn subscribe(&mut self, observer: impl Observer + 'static) -> SubscriberId {
        self.bus.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Defers event delivery until the matching [`end_batch`](Self::end_batch).
    pub fn begin_batch(&mut self) {
        self.bus.begin_batch();
    }

    pub fn end_batch(&mut self) {
        self.bus.end_batch();
    }

    /// Runs `f` inside a batch.
    pub fn batched<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.begin_batch();
        let result = f(self);
        self.end_batch();
        result
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.into())
    }

    pub fn node_by_key(&self, key: &str) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    /// Mutable access to a node's attributes. Attributes never affect the
    /// analysis.
    pub fn node_attributes_mut(&mut self, id: NodeId) -> Option<&mut Attributes> {
        self.graph
            .node_weight_mut(id.into())
            .map(|node| &mut node.attributes)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.graph.edge_weight(id.into())
    }

    /// Mutable access to an edge's attributes. Attributes never affect the
    /// analysis; the optional flag of a specified edge is changed through
    /// [`set_optional`](Self::set_optional).
    pub fn edge_attributes_mut(&mut self, id: EdgeId) -> Option<&mut Attributes> {
        self.graph
            .edge_weight_mut(id.into())
            .map(|edge| &mut edge.attributes)
    }

    /// Source and target of an edge.
    pub fn endpoints(&self, id: EdgeId) -> Option<(NodeId, NodeId)> {
        self.graph
            .edge_endpoints(id.into())
            .map(|(s, t)| (NodeId::from(s), NodeId::from(t)))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All nodes of a subgraph in index order.
    pub fn nodes(&self, subgraph: Subgraph) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .node_indices()
            .filter(move |idx| self.graph[*idx].subgraph == subgraph)
            .map(NodeId::from)
    }

    /// All edges of a kind in index order.
    pub fn edges(&self, kind: EdgeKind) -> impl Iterator<Item = EdgeId> + '_ {
        self.graph
            .edge_indices()
            .filter(move |idx| self.graph[*idx].kind == kind)
            .map(EdgeId::from)
    }

    /// All edges from `source` to `target`, of any kind.
    pub fn edges_between(&self, source: NodeId, target: NodeId) -> Vec<EdgeId> {
        self.graph
            .edges_directed(source.into(), Direction::Outgoing)
            .filter(|e| NodeId::from(e.target()) == target)
            .map(|e| EdgeId::from(e.id()))
            .collect()
    }

    /// Edges of `kind` with `node` as source or target, without duplicates.
    pub fn incident_edges(&self, node: NodeId, kind: EdgeKind) -> IndexSet<EdgeId> {
        let mut edges = IndexSet::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for e in self.graph.edges_directed(node.into(), direction) {
                if e.weight().kind == kind {
                    edges.insert(EdgeId::from(e.id()));
                }
            }
        }
        edges
    }

    // -----------------------------------------------------------------------
    // Node methods
    // -----------------------------------------------------------------------

    /// Adds a root node to the implementation or the architecture.
    pub fn add_node(
        &mut self,
        key: impl Into<String>,
        node_type: impl Into<String>,
        subgraph: Subgraph,
    ) -> Result<NodeId, ReflexionError> {
        let key = key.into();
        if subgraph == Subgraph::Mapping {
            return Err(ReflexionError::InvalidSubgraph { subgraph });
        }
        if self.keys.contains_key(&key) {
            return Err(ReflexionError::DuplicateNodeKey { key });
        }

        let id = NodeId::from(
            self.graph
                .add_node(Node::new(key.clone(), node_type.into(), subgraph)),
        );
        self.keys.insert(key.clone(), id);
        tracing::debug!(node = %id, %key, %subgraph, "add_node");

        self.bus.publish(ChangeEvent::Node {
            node: id,
            key,
            change: ChangeType::Addition,
            subgraph,
        });
        Ok(id)
    }

    /// Removes a node together with its edges and mappings.
    ///
    /// Incident edges and mappings onto or from the node are removed first,
    /// each with its own events; `policy` decides what becomes of the
    /// children.
    pub fn remove_node(&mut self, node: NodeId, policy: OrphanPolicy) -> Result<(), ReflexionError> {
        let weight = self.node_ref(node)?;
        if !weight.children.is_empty() && policy == OrphanPolicy::Reject {
            return Err(ReflexionError::NodeHasChildren {
                node,
                children: weight.children.len(),
            });
        }
        let subgraph = weight.subgraph;
        let parent = weight.parent;
        let children = weight.children.to_vec();
        tracing::debug!(%node, ?policy, "remove_node");

        if policy == OrphanPolicy::RemoveSubtree {
            for &child in &children {
                self.remove_node(child, OrphanPolicy::RemoveSubtree)?;
            }
        }

        match subgraph {
            Subgraph::Implementation => {
                if self.is_explicitly_mapped(node) {
                    self.remove_from_mapping(node)?;
                }
            }
            Subgraph::Architecture => {
                let mapped_onto: Vec<NodeId> = self
                    .explicit
                    .iter()
                    .filter(|(_, (target, _))| *target == node)
                    .map(|(source, _)| *source)
                    .collect();
                for source in mapped_onto {
                    self.remove_from_mapping(source)?;
                }
            }
            Subgraph::Mapping => {}
        }

        let own_kind = match subgraph {
            Subgraph::Architecture => EdgeKind::Specified,
            _ => EdgeKind::Implementation,
        };
        for edge in self.incident_edges(node, own_kind) {
            self.remove_edge(edge)?;
        }

        match policy {
            OrphanPolicy::BecomeRoots => {
                for child in children {
                    self.move_subtree(child, None);
                }
            }
            OrphanPolicy::MoveToParent => {
                for child in children {
                    self.move_subtree(child, parent);
                }
            }
            OrphanPolicy::Reject | OrphanPolicy::RemoveSubtree => {}
        }
        if parent.is_some() {
            self.move_subtree(node, None);
        }

        if let Some(removed) = self.graph.remove_node(node.into()) {
            self.keys.remove(&removed.key);
            self.bus.publish(ChangeEvent::Node {
                node,
                key: removed.key,
                change: ChangeType::Removal,
                subgraph,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Edge methods
    // -----------------------------------------------------------------------

    /// Adds an implementation edge (both endpoints in the implementation) or
    /// a required specified edge (both endpoints in the architecture).
    ///
    /// Mapping edges are added with
    /// [`add_to_mapping`](Self::add_to_mapping).
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        edge_type: impl Into<String>,
    ) -> Result<EdgeId, ReflexionError> {
        let from_subgraph = self.node_ref(from)?.subgraph;
        let to_subgraph = self.node_ref(to)?.subgraph;
        match (from_subgraph, to_subgraph) {
            (Subgraph::Implementation, Subgraph::Implementation) => {
                Ok(self.add_implementation_edge(from, to, edge_type.into()))
            }
            (Subgraph::Architecture, Subgraph::Architecture) => {
                self.add_specified_edge(from, to, edge_type, false)
            }
            _ => Err(ReflexionError::CrossSubgraphEdge { from, to }),
        }
    }

    /// Adds a specified architecture edge, optionally marked as optional.
    ///
    /// Fails with [`ReflexionError::RedundantSpecifiedEdge`] if an existing
    /// specified edge of the same type already lifts `from -> to` through
    /// the hierarchy, or would be lifted by the new one.
    pub fn add_specified_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        edge_type: impl Into<String>,
        optional: bool,
    ) -> Result<EdgeId, ReflexionError> {
        self.node_in(from, Subgraph::Architecture)?;
        self.node_in(to, Subgraph::Architecture)?;
        let edge_type = edge_type.into();
        if let Some(existing) = self.redundant_with(from, to, &edge_type) {
            return Err(ReflexionError::RedundantSpecifiedEdge {
                from,
                to,
                edge_type,
                existing,
            });
        }

        let mut weight = Edge::new(edge_type.clone(), EdgeKind::Specified);
        weight.optional = optional;
        let id = EdgeId::from(self.graph.add_edge(from.into(), to.into(), weight));
        self.specified.insert((from, to, edge_type), id);
        tracing::debug!(edge = %id, %from, %to, optional, "add_specified_edge");

        self.publish_edge(id, ChangeType::Addition);
        self.classify_new_specified(id);
        Ok(id)
    }

    /// Removes an implementation, specified, or mapping edge.
    pub fn remove_edge(&mut self, edge: EdgeId) -> Result<(), ReflexionError> {
        let weight = self.edge_ref(edge)?;
        let kind = weight.kind;
        let edge_type = weight.edge_type.clone();
        let (from, to) = self
            .endpoints(edge)
            .ok_or(ReflexionError::EdgeNotFound { id: edge })?;
        tracing::debug!(%edge, ?kind, "remove_edge");

        match kind {
            EdgeKind::Implementation => {
                self.unpropagate(edge);
                self.publish_edge(edge, ChangeType::Removal);
                self.graph.remove_edge(edge.into());
            }
            EdgeKind::Specified => {
                self.specified.shift_remove(&(from, to, edge_type));
                let dependents: Vec<EdgeId> = self
                    .propagated
                    .values()
                    .copied()
                    .filter(|pe| self.edge(*pe).and_then(Edge::allowed_by) == Some(edge))
                    .collect();
                self.publish_edge(edge, ChangeType::Removal);
                self.graph.remove_edge(edge.into());
                for pe in dependents {
                    if let Some(w) = self.graph.edge_weight_mut(pe.into()) {
                        w.allowed_by = None;
                    }
                    self.reclassify_propagated(pe);
                }
            }
            EdgeKind::Mapping => self.remove_from_mapping(from)?,
            EdgeKind::Propagated => return Err(ReflexionError::DerivedEdge { edge }),
        }
        Ok(())
    }

    /// Marks a specified edge as optional (or required again).
    pub fn set_optional(&mut self, edge: EdgeId, optional: bool) -> Result<(), ReflexionError> {
        if self.edge_ref(edge)?.kind != EdgeKind::Specified {
            return Err(ReflexionError::NotASpecifiedEdge { edge });
        }
        let Some(weight) = self.graph.edge_weight_mut(edge.into()) else {
            return Err(ReflexionError::EdgeNotFound { id: edge });
        };
        weight.optional = optional;
        let counter = weight.counter;
        tracing::debug!(%edge, optional, "set_optional");

        if self.running && counter == 0 {
            self.transition(edge, State::for_specified(0, optional));
        }
        Ok(())
    }

    fn add_implementation_edge(&mut self, from: NodeId, to: NodeId, edge_type: String) -> EdgeId {
        let id = EdgeId::from(self.graph.add_edge(
            from.into(),
            to.into(),
            Edge::new(edge_type, EdgeKind::Implementation),
        ));
        tracing::debug!(edge = %id, %from, %to, "add_implementation_edge");
        self.publish_edge(id, ChangeType::Addition);
        self.propagate(id);
        id
    }

    // -----------------------------------------------------------------------
    // Crate-internal helpers
    // -----------------------------------------------------------------------

    pub(crate) fn node_ref(&self, id: NodeId) -> Result<&Node, ReflexionError> {
        self.node(id).ok_or(ReflexionError::NodeNotFound { id })
    }

    pub(crate) fn edge_ref(&self, id: EdgeId) -> Result<&Edge, ReflexionError> {
        self.edge(id).ok_or(ReflexionError::EdgeNotFound { id })
    }

    /// Looks up a node and checks that it lives in `expected`.
    pub(crate) fn node_in(&self, id: NodeId, expected: Subgraph) -> Result<&Node, ReflexionError> {
        let node = self.node_ref(id)?;
        if node.subgraph != expected {
            return Err(ReflexionError::NotInSubgraph { node: id, expected });
        }
        Ok(node)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.graph.node_weight_mut(id.into())
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.graph.edge_weight_mut(id.into())
    }

    pub(crate) fn insert_edge(&mut self, from: NodeId, to: NodeId, weight: Edge) -> EdgeId {
        EdgeId::from(self.graph.add_edge(from.into(), to.into(), weight))
    }

    pub(crate) fn delete_edge(&mut self, id: EdgeId) -> Option<Edge> {
        self.graph.remove_edge(id.into())
    }

    pub(crate) fn edge_info(&self, id: EdgeId) -> Option<EdgeInfo> {
        let (source, target) = self.endpoints(id)?;
        let weight = self.edge(id)?;
        Some(EdgeInfo {
            id,
            source,
            target,
            edge_type: weight.edge_type.clone(),
        })
    }

    /// Publishes an addition or removal of a non-derived edge. Must be
    /// called while the edge is still in the graph.
    pub(crate) fn publish_edge(&mut self, id: EdgeId, change: ChangeType) {
        let Some(info) = self.edge_info(id) else {
            return;
        };
        let subgraph = self.edge(id).map_or(Subgraph::Architecture, Edge::subgraph);
        self.bus.publish(ChangeEvent::Edge {
            edge: info,
            change,
            subgraph,
        });
    }
}
