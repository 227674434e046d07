//! Mapping from implementation nodes onto architecture nodes.
//!
//! An implementation node is either explicitly mapped (it has a `Maps_To`
//! edge) or inherits the target of its nearest explicitly mapped ancestor.
//! The inherited targets are kept in the implicit table, which always
//! covers the whole implementation forest, even before the analysis runs.
//!
//! A mapping change only affects the *mapped subtree* of the node: the node
//! itself plus every descendant reached without passing through another
//! explicitly mapped node. All implementation edges incident to that
//! subtree are retracted under the old targets and propagated again under
//! the new one.

use indexmap::IndexSet;

use crate::edge::{Edge, EdgeKind, MAPS_TO};
use crate::error::ReflexionError;
use crate::event::ChangeType;
use crate::graph::ReflexionGraph;
use crate::id::{EdgeId, NodeId};
use crate::node::Subgraph;

impl ReflexionGraph {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The architecture node `node` is mapped onto, explicitly or through
    /// an ancestor.
    pub fn maps_to(&self, node: NodeId) -> Option<NodeId> {
        self.implicit.get(&node).copied()
    }

    /// The target of `node`'s own mapping edge.
    pub fn explicit_target(&self, node: NodeId) -> Option<NodeId> {
        self.explicit.get(&node).map(|(target, _)| *target)
    }

    pub fn is_explicitly_mapped(&self, node: NodeId) -> bool {
        self.explicit.contains_key(&node)
    }

    /// The nearest ancestor-or-self of `node` that is explicitly mapped.
    pub fn mapped_ancestor(&self, node: NodeId) -> Option<NodeId> {
        self.ancestors(node)
            .into_iter()
            .find(|n| self.is_explicitly_mapped(*n))
    }

    /// `node` plus all descendants that inherit their mapping through it.
    pub fn mapped_subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = vec![node];
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            if self.is_explicitly_mapped(n) {
                continue;
            }
            result.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        result
    }

    /// Explicit mappings as `(implementation, architecture)` pairs, in the
    /// order they were added.
    pub fn mappings(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.explicit
            .iter()
            .map(|(source, (target, _))| (*source, *target))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Maps `from` (implementation) onto `to` (architecture).
    ///
    /// A node can carry only one explicit mapping; remapping requires
    /// [`remove_from_mapping`](Self::remove_from_mapping) first.
    pub fn add_to_mapping(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId, ReflexionError> {
        self.node_in(from, Subgraph::Implementation)?;
        self.node_in(to, Subgraph::Architecture)?;
        if let Some(target) = self.explicit_target(from) {
            return Err(ReflexionError::AlreadyExplicitlyMapped { node: from, target });
        }
        tracing::debug!(%from, %to, "add_to_mapping");

        let edge = self.insert_edge(from, to, Edge::new(MAPS_TO.to_string(), EdgeKind::Mapping));
        self.explicit.insert(from, (to, edge));
        self.publish_edge(edge, ChangeType::Addition);

        if self.maps_to(from) != Some(to) {
            let subtree = self.mapped_subtree(from);
            self.remap(&subtree, Some(to));
        }
        Ok(edge)
    }

    /// Removes the explicit mapping of `from`. Its mapped subtree falls back
    /// to the mapping of `from`'s parent, if any.
    pub fn remove_from_mapping(&mut self, from: NodeId) -> Result<(), ReflexionError> {
        self.node_in(from, Subgraph::Implementation)?;
        let Some(&(_, edge)) = self.explicit.get(&from) else {
            return Err(ReflexionError::NotExplicitlyMapped { node: from });
        };
        tracing::debug!(%from, "remove_from_mapping");
        self.unmap(from, edge);
        Ok(())
    }

    /// Removes every explicit mapping in one batch.
    pub fn reset_mapping(&mut self) {
        tracing::debug!(mappings = self.explicit.len(), "reset_mapping");
        self.batched(|graph| {
            let mapped: Vec<(NodeId, EdgeId)> = graph
                .explicit
                .iter()
                .map(|(source, (_, edge))| (*source, *edge))
                .collect();
            for (source, edge) in mapped {
                graph.unmap(source, edge);
            }
        });
    }

    fn unmap(&mut self, from: NodeId, edge: EdgeId) {
        self.explicit.shift_remove(&from);
        self.publish_edge(edge, ChangeType::Removal);
        self.delete_edge(edge);

        let fallback = self.parent(from).and_then(|p| self.maps_to(p));
        if self.maps_to(from) != fallback {
            let subtree = self.mapped_subtree(from);
            self.remap(&subtree, fallback);
        }
    }

    /// Points every node of `subtree` at `target` and moves the
    /// contributions of all incident implementation edges accordingly.
    pub(crate) fn remap(&mut self, subtree: &[NodeId], target: Option<NodeId>) {
        let edges = if self.running {
            self.incident_implementation_edges(subtree)
        } else {
            IndexSet::new()
        };

        for &edge in &edges {
            self.unpropagate(edge);
        }
        for &node in subtree {
            match target {
                Some(t) => self.implicit.insert(node, t),
                None => self.implicit.remove(&node),
            };
        }
        for &edge in &edges {
            self.propagate(edge);
        }
    }

    /// Recomputes the implicit table from the explicit mappings.
    pub(crate) fn rebuild_implicit_mapping(&mut self) {
        self.implicit.clear();
        let mapped: Vec<(NodeId, NodeId)> = self.mappings().collect();
        for (source, target) in mapped {
            for node in self.mapped_subtree(source) {
                self.implicit.insert(node, target);
            }
        }
    }

    fn incident_implementation_edges(&self, nodes: &[NodeId]) -> IndexSet<EdgeId> {
        let mut edges = IndexSet::new();
        for &node in nodes {
            edges.extend(self.incident_edges(node, EdgeKind::Implementation));
        }
        edges
    }
}
