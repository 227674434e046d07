//! Classification of specified and propagated architecture edges.
//!
//! A propagated edge `s -> t` is
//! - `Allowed` if a specified edge of the same type runs from an
//!   ancestor-or-self of `s` to an ancestor-or-self of `t` (the nearest
//!   source ancestor wins, then the nearest target ancestor);
//! - otherwise `ImplicitlyAllowed` if it is a self-loop, or if `s` is a
//!   descendant of `t` and dependencies to parents are allowed;
//! - otherwise `Divergent`.
//!
//! A specified edge is `Convergent` while it allows at least one
//! propagated edge and `Absent` (or `AllowedAbsent` when optional)
//! otherwise. Its counter is the sum of the counters of the propagated
//! edges it allows.

use crate::event::ChangeEvent;
use crate::graph::{ReflexionGraph, Triple};
use crate::id::{EdgeId, NodeId};
use crate::state::State;

impl ReflexionGraph {
    /// The specified edge lifting `from -> to`, looked up with `relink`
    /// applied to the hierarchy and `exclude` ignored.
    pub(crate) fn covering_edge(
        &self,
        from: NodeId,
        to: NodeId,
        edge_type: &str,
        relink: Option<(NodeId, Option<NodeId>)>,
        exclude: Option<EdgeId>,
    ) -> Option<EdgeId> {
        let targets = self.ancestors_with(to, relink);
        for source in self.ancestors_with(from, relink) {
            for &target in &targets {
                let key = (source, target, edge_type.to_string());
                match self.specified.get(&key) {
                    Some(&edge) if Some(edge) != exclude => return Some(edge),
                    _ => {}
                }
            }
        }
        None
    }

    /// State and allowing specified edge for a propagated edge.
    pub(crate) fn classify_propagated(
        &self,
        from: NodeId,
        to: NodeId,
        edge_type: &str,
    ) -> (State, Option<EdgeId>) {
        if let Some(specified) = self.covering_edge(from, to, edge_type, None, None) {
            return (State::Allowed, Some(specified));
        }
        let implicit = from == to
            || (self.config.allow_dependencies_to_parents && self.is_descendant_of(from, to));
        if implicit {
            (State::ImplicitlyAllowed, None)
        } else {
            (State::Divergent, None)
        }
    }

    /// Recomputes the state of a propagated edge and moves its counter to
    /// the specified edge that now allows it.
    pub(crate) fn reclassify_propagated(&mut self, id: EdgeId) {
        let Some((from, to)) = self.endpoints(id) else {
            return;
        };
        let Some(weight) = self.edge(id) else {
            return;
        };
        let edge_type = weight.edge_type.clone();
        let counter = i64::from(weight.counter);
        let old_allowed_by = weight.allowed_by;

        let (state, allowed_by) = self.classify_propagated(from, to, &edge_type);
        let moved = allowed_by != old_allowed_by;
        if moved {
            if let Some(weight) = self.edge_mut(id) {
                weight.allowed_by = allowed_by;
            }
            if let Some(old) = old_allowed_by {
                self.change_specified_counter(old, -counter);
            }
        }
        self.transition(id, state);
        if moved {
            if let Some(new) = allowed_by {
                self.change_specified_counter(new, counter);
            }
        }
    }

    /// Reclassifies every propagated edge with an endpoint in the subtree
    /// of the architecture node `node`.
    pub(crate) fn reclassify_subtree(&mut self, node: NodeId) {
        if !self.running {
            return;
        }
        let subtree = self.subtree_set(node);
        let affected: Vec<EdgeId> = self
            .propagated
            .iter()
            .filter(|((from, to, _), _)| subtree.contains(from) || subtree.contains(to))
            .map(|(_, id)| *id)
            .collect();
        for id in affected {
            self.reclassify_propagated(id);
        }
    }

    /// Classifies a freshly added specified edge and takes over the
    /// propagated edges it lifts.
    pub(crate) fn classify_new_specified(&mut self, id: EdgeId) {
        if !self.running {
            return;
        }
        let Some((from, to)) = self.endpoints(id) else {
            return;
        };
        let Some(edge_type) = self.edge(id).map(|w| w.edge_type.clone()) else {
            return;
        };
        let covered: Vec<EdgeId> = self
            .propagated
            .iter()
            .filter(|((pf, pt, pty), _)| {
                *pty == edge_type
                    && self.is_ancestor_or_self(from, *pf)
                    && self.is_ancestor_or_self(to, *pt)
            })
            .map(|(_, pe)| *pe)
            .collect();
        for pe in covered {
            self.reclassify_propagated(pe);
        }
        self.refresh_specified(id);
    }

    /// Adds `delta` to a specified edge's counter and updates its state.
    pub(crate) fn change_specified_counter(&mut self, id: EdgeId, delta: i64) {
        let Some(weight) = self.edge_mut(id) else {
            return;
        };
        let updated = i64::from(weight.counter) + delta;
        if updated < 0 {
            tracing::warn!(edge = %id, updated, "specified edge counter dropped below zero");
        }
        weight.counter = u32::try_from(updated.max(0)).unwrap_or(u32::MAX);
        self.refresh_specified(id);
    }

    /// Brings a specified edge's state in line with its counter.
    pub(crate) fn refresh_specified(&mut self, id: EdgeId) {
        let Some(weight) = self.edge(id) else {
            return;
        };
        let state = State::for_specified(weight.counter, weight.is_optional());
        self.transition(id, state);
    }

    /// Sets an edge's state, publishing the transition if it changes.
    pub(crate) fn transition(&mut self, id: EdgeId, new: State) {
        let Some(weight) = self.edge_mut(id) else {
            return;
        };
        let old = weight.state;
        if old == new {
            return;
        }
        weight.state = new;
        if let Some(info) = self.edge_info(id) {
            self.bus.publish(ChangeEvent::EdgeState {
                edge: info,
                old,
                new,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Redundancy of specified edges
    // -----------------------------------------------------------------------

    /// A specified edge that lifts `from -> to`, or that `from -> to` would
    /// lift.
    pub(crate) fn redundant_with(&self, from: NodeId, to: NodeId, edge_type: &str) -> Option<EdgeId> {
        if let Some(existing) = self.covering_edge(from, to, edge_type, None, None) {
            return Some(existing);
        }
        self.specified
            .iter()
            .find(|((sf, st, sty), _)| {
                sty == edge_type
                    && self.is_ancestor_or_self(from, *sf)
                    && self.is_ancestor_or_self(to, *st)
            })
            .map(|(_, id)| *id)
    }

    /// First specified edge that another specified edge would lift once
    /// `node` is moved under `new_parent`. Only nodes of the moved subtree
    /// gain ancestors, so only edges touching it are checked.
    pub(crate) fn redundancy_after_relink(
        &self,
        node: NodeId,
        new_parent: Option<NodeId>,
    ) -> Option<(Triple, EdgeId)> {
        let subtree = self.subtree_set(node);
        let relink = Some((node, new_parent));
        self.specified.iter().find_map(|(key, &id)| {
            let (from, to, edge_type) = key;
            if !subtree.contains(from) && !subtree.contains(to) {
                return None;
            }
            self.covering_edge(*from, *to, edge_type, relink, Some(id))
                .map(|existing| (key.clone(), existing))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ReflexionConfig;
    use crate::error::ReflexionError;
    use crate::graph::ReflexionGraph;
    use crate::id::NodeId;
    use crate::node::Subgraph;
    use crate::state::State;

    /// Architecture `top` contains `left` and `right`; one implementation
    /// node per architecture node, mapped one to one.
    fn layered(config: ReflexionConfig) -> (ReflexionGraph, [NodeId; 3], [NodeId; 3]) {
        let mut g = ReflexionGraph::new(config);
        let top = g.add_node("top", "Layer", Subgraph::Architecture).unwrap();
        let left = g.add_node("left", "Component", Subgraph::Architecture).unwrap();
        let right = g.add_node("right", "Component", Subgraph::Architecture).unwrap();
        g.add_child_in_architecture(left, top).unwrap();
        g.add_child_in_architecture(right, top).unwrap();

        let mut impls = [NodeId(0); 3];
        for (slot, (key, arch)) in impls
            .iter_mut()
            .zip([("t", top), ("l", left), ("r", right)])
        {
            *slot = g.add_node(key, "Class", Subgraph::Implementation).unwrap();
            g.add_to_mapping(*slot, arch).unwrap();
        }
        g.run_analysis();
        (g, [top, left, right], impls)
    }

    #[test]
    fn specified_edge_on_ancestor_allows_child_dependency() {
        let (mut g, [top, left, right], [_, l, r]) = layered(ReflexionConfig::default());
        let specified = g.add_edge(left, top, "call").unwrap();
        g.add_edge(l, r, "call").unwrap();

        assert_eq!(g.state(left, right, "call"), Ok(State::Allowed));
        assert_eq!(g.edge_state(specified), Some(State::Convergent));
        let pe = g.propagated_edge(left, right, "call").unwrap();
        assert_eq!(g.edge(pe).unwrap().allowed_by(), Some(specified));
    }

    #[test]
    fn specified_edge_takes_precedence_over_implicit_access() {
        let (mut g, [top, left, _], [t, l, _]) = layered(ReflexionConfig::default());
        g.add_edge(l, t, "call").unwrap();
        assert_eq!(g.state(left, top, "call"), Ok(State::ImplicitlyAllowed));

        let specified = g.add_edge(left, top, "call").unwrap();
        assert_eq!(g.edge_state(specified), Some(State::Convergent));
        let pe = g.propagated_edge(left, top, "call").unwrap();
        assert_eq!(g.edge_state(pe), Some(State::Allowed));

        g.remove_edge(specified).unwrap();
        assert_eq!(g.edge_state(pe), Some(State::ImplicitlyAllowed));
        g.check_consistency().unwrap();
    }

    #[test]
    fn dependencies_to_parents_can_be_disallowed() {
        let config = ReflexionConfig::default().with_dependencies_to_parents(false);
        let (mut g, [top, left, _], [t, l, _]) = layered(config);
        g.add_edge(l, t, "call").unwrap();
        assert_eq!(g.state(left, top, "call"), Ok(State::Divergent));
    }

    #[test]
    fn parent_to_child_dependency_is_divergent() {
        let (mut g, [top, left, _], [t, l, _]) = layered(ReflexionConfig::default());
        g.add_edge(t, l, "call").unwrap();
        assert_eq!(g.state(top, left, "call"), Ok(State::Divergent));
    }

    #[test]
    fn sibling_dependency_is_divergent_until_specified() {
        let (mut g, [_, left, right], [_, l, r]) = layered(ReflexionConfig::default());
        g.add_edge(l, r, "call").unwrap();
        let pe = g.propagated_edge(left, right, "call").unwrap();
        assert_eq!(g.edge_state(pe), Some(State::Divergent));

        let specified = g.add_edge(left, right, "call").unwrap();
        assert_eq!(g.edge_state(pe), Some(State::Allowed));
        assert_eq!(g.state(left, right, "call"), Ok(State::Convergent));
        assert_eq!(g.counter(specified), Some(1));
    }

    #[test]
    fn specified_edge_without_dependency_is_absent() {
        let (mut g, [_, left, right], _) = layered(ReflexionConfig::default());
        let required = g.add_edge(left, right, "call").unwrap();
        let optional = g.add_specified_edge(right, left, "call", true).unwrap();
        assert_eq!(g.edge_state(required), Some(State::Absent));
        assert_eq!(g.edge_state(optional), Some(State::AllowedAbsent));
    }

    #[test]
    fn more_general_specified_edge_is_redundant() {
        let (mut g, [top, left, right], _) = layered(ReflexionConfig::default());
        let specific = g.add_edge(left, right, "call").unwrap();
        assert_eq!(
            g.add_edge(top, right, "call"),
            Err(ReflexionError::RedundantSpecifiedEdge {
                from: top,
                to: right,
                edge_type: "call".into(),
                existing: specific,
            })
        );
        assert_eq!(
            g.add_edge(left, right, "call"),
            Err(ReflexionError::RedundantSpecifiedEdge {
                from: left,
                to: right,
                edge_type: "call".into(),
                existing: specific,
            })
        );
        // crossing edges do not lift each other
        assert!(g.add_edge(right, left, "call").is_ok());
    }

    #[test]
    fn covering_edge_prefers_nearest_source() {
        let (mut g, [top, left, right], [_, l, r]) = layered(ReflexionConfig::default());
        // left -> top and top -> right do not lift each other
        let near = g.add_edge(left, top, "call").unwrap();
        let far = g.add_edge(top, right, "call").unwrap();
        g.add_edge(l, r, "call").unwrap();

        let pe = g.propagated_edge(left, right, "call").unwrap();
        assert_eq!(g.edge(pe).unwrap().allowed_by(), Some(near));
        assert_eq!(g.edge_state(far), Some(State::Absent));
        g.check_consistency().unwrap();
    }
}
