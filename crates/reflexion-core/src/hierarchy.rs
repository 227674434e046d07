//! Node hierarchy: queries and the incremental reparenting operations.
//!
//! Both subgraphs form forests. Parent and children are stored on the node
//! weights by ID, so every hierarchy query is an ID walk over the arena.
//!
//! Reparenting an implementation node changes which mapping its subtree
//! inherits, so the affected implementation edges are re-propagated.
//! Reparenting an architecture node changes which specified edges lift the
//! propagated edges touching its subtree, so those are reclassified.

use std::collections::HashSet;

use crate::error::ReflexionError;
use crate::event::{ChangeEvent, ChangeType};
use crate::graph::ReflexionGraph;
use crate::id::NodeId;
use crate::node::Subgraph;

impl ReflexionGraph {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    /// Direct children; empty for unknown nodes.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        match self.node(node) {
            Some(n) => n.children(),
            None => &[],
        }
    }

    /// The node followed by its ancestors, nearest first.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        self.ancestors_with(node, None)
    }

    /// Returns `true` if `node` is a proper descendant of `ancestor`.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// The node and all its descendants, in pre-order.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            result.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        result
    }

    /// Keys from the root down to `node`.
    pub fn path(&self, node: NodeId) -> Vec<&str> {
        let mut path: Vec<&str> = self
            .ancestors(node)
            .into_iter()
            .filter_map(|n| self.node(n).map(|w| w.key.as_str()))
            .collect();
        path.reverse();
        path
    }

    /// Number of ancestors above `node`.
    pub fn depth(&self, node: NodeId) -> usize {
        self.ancestors(node).len().saturating_sub(1)
    }

    pub fn roots(&self, subgraph: Subgraph) -> Vec<NodeId> {
        self.nodes(subgraph)
            .filter(|n| self.parent(*n).is_none())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Incremental hierarchy changes
    // -----------------------------------------------------------------------

    /// Attaches the implementation root `child` below `parent`.
    ///
    /// Unless `child` is explicitly mapped, its mapped subtree now inherits
    /// the mapping of `parent`.
    pub fn add_child_in_implementation(
        &mut self,
        child: NodeId,
        parent: NodeId,
    ) -> Result<(), ReflexionError> {
        self.attach(child, parent, Subgraph::Implementation)
    }

    /// Attaches the architecture root `child` below `parent`.
    ///
    /// Fails with [`ReflexionError::RedundantSpecifiedEdge`] if the new
    /// ancestry would let one specified edge lift another.
    pub fn add_child_in_architecture(
        &mut self,
        child: NodeId,
        parent: NodeId,
    ) -> Result<(), ReflexionError> {
        self.attach(child, parent, Subgraph::Architecture)
    }

    /// Attaches `child` below `parent` in whichever subgraph `child` lives.
    pub fn add_child(&mut self, child: NodeId, parent: NodeId) -> Result<(), ReflexionError> {
        let subgraph = self.node_ref(child)?.subgraph;
        self.attach(child, parent, subgraph)
    }

    /// Detaches an implementation node from its parent, making it a root.
    pub fn unparent_in_implementation(&mut self, child: NodeId) -> Result<(), ReflexionError> {
        self.detach(child, Subgraph::Implementation)
    }

    /// Detaches an architecture node from its parent, making it a root.
    pub fn unparent_in_architecture(&mut self, child: NodeId) -> Result<(), ReflexionError> {
        self.detach(child, Subgraph::Architecture)
    }

    pub fn unparent(&mut self, child: NodeId) -> Result<(), ReflexionError> {
        let subgraph = self.node_ref(child)?.subgraph;
        self.detach(child, subgraph)
    }

    /// Moves `node` below `new_parent`, or makes it a root.
    ///
    /// Unlike [`add_child`](Self::add_child) this accepts nodes that already
    /// have a parent. A no-op if the parent does not change.
    pub fn reparent(
        &mut self,
        node: NodeId,
        new_parent: Option<NodeId>,
    ) -> Result<(), ReflexionError> {
        let weight = self.node_ref(node)?;
        let subgraph = weight.subgraph;
        let current = weight.parent;
        if let Some(parent) = new_parent {
            self.node_in(parent, subgraph)?;
        }
        if current == new_parent {
            return Ok(());
        }
        self.check_relink(node, new_parent, subgraph)?;
        tracing::debug!(%node, ?new_parent, "reparent");
        self.move_subtree(node, new_parent);
        Ok(())
    }

    fn attach(
        &mut self,
        child: NodeId,
        parent: NodeId,
        subgraph: Subgraph,
    ) -> Result<(), ReflexionError> {
        let current = self.node_in(child, subgraph)?.parent;
        self.node_in(parent, subgraph)?;
        if let Some(existing) = current {
            return Err(ReflexionError::NotAnOrphan {
                child,
                parent: existing,
            });
        }
        self.check_relink(child, Some(parent), subgraph)?;
        tracing::debug!(%child, %parent, %subgraph, "add_child");
        self.move_subtree(child, Some(parent));
        Ok(())
    }

    fn detach(&mut self, child: NodeId, subgraph: Subgraph) -> Result<(), ReflexionError> {
        if self.node_in(child, subgraph)?.parent.is_none() {
            return Err(ReflexionError::NoParent { node: child });
        }
        tracing::debug!(%child, %subgraph, "unparent");
        self.move_subtree(child, None);
        Ok(())
    }

    /// Validates giving `node` the parent `new_parent`.
    fn check_relink(
        &self,
        node: NodeId,
        new_parent: Option<NodeId>,
        subgraph: Subgraph,
    ) -> Result<(), ReflexionError> {
        if let Some(parent) = new_parent {
            if parent == node || self.is_descendant_of(parent, node) {
                return Err(ReflexionError::CyclicHierarchy {
                    child: node,
                    parent,
                });
            }
        }
        if subgraph == Subgraph::Architecture {
            if let Some((edge, existing)) = self.redundancy_after_relink(node, new_parent) {
                let (from, to, edge_type) = edge;
                return Err(ReflexionError::RedundantSpecifiedEdge {
                    from,
                    to,
                    edge_type,
                    existing,
                });
            }
        }
        Ok(())
    }

    /// Moves `child` (with its subtree) under `new_parent` and brings
    /// propagation and classification up to date. Callers validate first.
    pub(crate) fn move_subtree(&mut self, child: NodeId, new_parent: Option<NodeId>) {
        let Some(weight) = self.node(child) else {
            return;
        };
        let subgraph = weight.subgraph;
        let old_parent = weight.parent;
        if old_parent == new_parent {
            return;
        }
        let old_target = self.maps_to(child);

        if let Some(parent) = old_parent {
            self.unlink(child, parent);
            self.bus.publish(ChangeEvent::Hierarchy {
                parent,
                child,
                change: ChangeType::Removal,
                subgraph,
            });
        }
        if let Some(parent) = new_parent {
            self.link(child, parent);
            self.bus.publish(ChangeEvent::Hierarchy {
                parent,
                child,
                change: ChangeType::Addition,
                subgraph,
            });
        }

        match subgraph {
            Subgraph::Implementation => {
                let new_target = self
                    .explicit_target(child)
                    .or_else(|| new_parent.and_then(|p| self.maps_to(p)));
                if new_target != old_target {
                    let subtree = self.mapped_subtree(child);
                    self.remap(&subtree, new_target);
                }
            }
            Subgraph::Architecture => self.reclassify_subtree(child),
            Subgraph::Mapping => {}
        }
    }

    /// Ancestors of `node` (itself first) as they would be if `relink`'s
    /// node had the given parent.
    pub(crate) fn ancestors_with(
        &self,
        node: NodeId,
        relink: Option<(NodeId, Option<NodeId>)>,
    ) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            result.push(n);
            current = match relink {
                Some((moved, parent)) if moved == n => parent,
                _ => self.parent(n),
            };
        }
        result
    }

    /// Returns `true` if `ancestor` is `node` or one of its ancestors.
    pub(crate) fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.is_descendant_of(node, ancestor)
    }

    pub(crate) fn subtree_set(&self, node: NodeId) -> HashSet<NodeId> {
        self.subtree(node).into_iter().collect()
    }

    fn link(&mut self, child: NodeId, parent: NodeId) {
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.node_mut(parent) {
            p.children.push(child);
        }
    }

    fn unlink(&mut self, child: NodeId, parent: NodeId) {
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != child);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ReflexionError;
    use crate::graph::ReflexionGraph;
    use crate::node::Subgraph;
    use crate::state::State;

    fn chain() -> (ReflexionGraph, [crate::id::NodeId; 3]) {
        let mut g = ReflexionGraph::default();
        let a = g.add_node("a", "Package", Subgraph::Implementation).unwrap();
        let b = g.add_node("b", "Package", Subgraph::Implementation).unwrap();
        let c = g.add_node("c", "Class", Subgraph::Implementation).unwrap();
        g.add_child_in_implementation(b, a).unwrap();
        g.add_child_in_implementation(c, b).unwrap();
        (g, [a, b, c])
    }

    #[test]
    fn ancestry_queries() {
        let (g, [a, b, c]) = chain();
        assert_eq!(g.ancestors(c), vec![c, b, a]);
        assert!(g.is_descendant_of(c, a));
        assert!(!g.is_descendant_of(a, c));
        assert!(!g.is_descendant_of(a, a));
        assert_eq!(g.subtree(a), vec![a, b, c]);
        assert_eq!(g.path(c), vec!["a", "b", "c"]);
        assert_eq!(g.depth(c), 2);
        assert_eq!(g.roots(Subgraph::Implementation), vec![a]);
    }

    #[test]
    fn cycles_are_rejected() {
        let (mut g, [a, _, c]) = chain();
        assert_eq!(
            g.reparent(a, Some(c)),
            Err(ReflexionError::CyclicHierarchy {
                child: a,
                parent: c
            })
        );
        assert_eq!(
            g.reparent(a, Some(a)),
            Err(ReflexionError::CyclicHierarchy {
                child: a,
                parent: a
            })
        );
        assert_eq!(g.parent(a), None);
    }

    #[test]
    fn add_child_requires_orphan() {
        let (mut g, [a, b, c]) = chain();
        assert_eq!(
            g.add_child_in_implementation(c, a),
            Err(ReflexionError::NotAnOrphan {
                child: c,
                parent: b
            })
        );
        // reparent accepts nodes that already have a parent
        g.reparent(c, Some(a)).unwrap();
        assert_eq!(g.parent(c), Some(a));
        assert!(g.children(b).is_empty());
        assert_eq!(g.children(a), &[b, c]);
    }

    #[test]
    fn add_child_checks_subgraph() {
        let (mut g, [a, ..]) = chain();
        let arch = g.add_node("A", "Component", Subgraph::Architecture).unwrap();
        assert_eq!(
            g.add_child_in_implementation(arch, a),
            Err(ReflexionError::NotInSubgraph {
                node: arch,
                expected: Subgraph::Implementation
            })
        );
        assert_eq!(
            g.add_child_in_architecture(arch, a),
            Err(ReflexionError::NotInSubgraph {
                node: a,
                expected: Subgraph::Architecture
            })
        );
    }

    #[test]
    fn unparent_root_fails() {
        let (mut g, [a, b, _]) = chain();
        assert_eq!(
            g.unparent_in_implementation(a),
            Err(ReflexionError::NoParent { node: a })
        );
        g.unparent(b).unwrap();
        assert_eq!(g.parent(b), None);
        assert_eq!(g.roots(Subgraph::Implementation).len(), 2);
    }

    #[test]
    fn reparent_to_same_parent_is_noop() {
        let (mut g, [a, b, _]) = chain();
        g.reparent(b, Some(a)).unwrap();
        assert_eq!(g.children(a), &[b]);
    }

    #[test]
    fn implementation_child_inherits_parent_mapping() {
        let mut g = ReflexionGraph::default();
        g.run_analysis();
        let p = g.add_node("p", "Package", Subgraph::Implementation).unwrap();
        let c = g.add_node("c", "Class", Subgraph::Implementation).unwrap();
        let d = g.add_node("d", "Class", Subgraph::Implementation).unwrap();
        let a = g.add_node("A", "Component", Subgraph::Architecture).unwrap();
        let b = g.add_node("B", "Component", Subgraph::Architecture).unwrap();
        g.add_to_mapping(p, a).unwrap();
        g.add_to_mapping(d, b).unwrap();
        g.add_edge(c, d, "call").unwrap();
        assert_eq!(g.propagated_edges().count(), 0);

        g.add_child_in_implementation(c, p).unwrap();
        assert_eq!(g.maps_to(c), Some(a));
        assert_eq!(g.state(a, b, "call"), Ok(State::Divergent));

        g.unparent_in_implementation(c).unwrap();
        assert_eq!(g.maps_to(c), None);
        assert_eq!(g.propagated_edges().count(), 0);
    }

    #[test]
    fn architecture_reparenting_reclassifies() {
        let mut g = ReflexionGraph::default();
        g.run_analysis();
        let top = g.add_node("Top", "Layer", Subgraph::Architecture).unwrap();
        let b = g.add_node("B", "Component", Subgraph::Architecture).unwrap();
        let c = g.add_node("C", "Component", Subgraph::Architecture).unwrap();
        let i1 = g.add_node("i1", "Class", Subgraph::Implementation).unwrap();
        let i2 = g.add_node("i2", "Class", Subgraph::Implementation).unwrap();
        let specified = g.add_edge(top, c, "call").unwrap();
        g.add_edge(i1, i2, "call").unwrap();
        g.add_to_mapping(i1, b).unwrap();
        g.add_to_mapping(i2, c).unwrap();
        assert_eq!(g.state(b, c, "call"), Ok(State::Divergent));
        assert_eq!(g.edge_state(specified), Some(State::Absent));

        g.add_child_in_architecture(b, top).unwrap();
        assert_eq!(g.state(b, c, "call"), Ok(State::Allowed));
        assert_eq!(g.edge_state(specified), Some(State::Convergent));
        assert_eq!(g.counter(specified), Some(1));

        g.unparent_in_architecture(b).unwrap();
        assert_eq!(g.state(b, c, "call"), Ok(State::Divergent));
        assert_eq!(g.edge_state(specified), Some(State::Absent));
        g.check_consistency().unwrap();
    }

    #[test]
    fn architecture_child_may_depend_on_parent() {
        let mut g = ReflexionGraph::default();
        g.run_analysis();
        let parent = g.add_node("P", "Layer", Subgraph::Architecture).unwrap();
        let child = g.add_node("C", "Component", Subgraph::Architecture).unwrap();
        let i1 = g.add_node("i1", "Class", Subgraph::Implementation).unwrap();
        let i2 = g.add_node("i2", "Class", Subgraph::Implementation).unwrap();
        g.add_edge(i1, i2, "call").unwrap();
        g.add_edge(i2, i1, "call").unwrap();
        g.add_to_mapping(i1, child).unwrap();
        g.add_to_mapping(i2, parent).unwrap();
        assert_eq!(g.state(child, parent, "call"), Ok(State::Divergent));

        g.add_child_in_architecture(child, parent).unwrap();
        assert_eq!(g.state(child, parent, "call"), Ok(State::ImplicitlyAllowed));
        // access from a parent into its child is not implied
        assert_eq!(g.state(parent, child, "call"), Ok(State::Divergent));
    }

    #[test]
    fn architecture_child_that_would_make_edge_redundant_is_rejected() {
        let mut g = ReflexionGraph::default();
        let top = g.add_node("Top", "Layer", Subgraph::Architecture).unwrap();
        let b = g.add_node("B", "Component", Subgraph::Architecture).unwrap();
        let c = g.add_node("C", "Component", Subgraph::Architecture).unwrap();
        let general = g.add_edge(top, c, "call").unwrap();
        g.add_edge(b, c, "call").unwrap();

        let result = g.add_child_in_architecture(b, top);
        assert_eq!(
            result,
            Err(ReflexionError::RedundantSpecifiedEdge {
                from: b,
                to: c,
                edge_type: "call".into(),
                existing: general,
            })
        );
        assert_eq!(g.parent(b), None);
    }
}
