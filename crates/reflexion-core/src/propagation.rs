//! Lifting implementation edges onto the architecture.
//!
//! An implementation edge `s -> t` contributes to the propagated edge
//! `maps_to(s) -> maps_to(t)` of the same type. Propagated edges are shared:
//! their counter is the number of implementation edges currently lifted
//! onto them, and they are deleted as soon as it drops to zero.
//!
//! The counter of an allowed propagated edge is mirrored into the counter
//! of the specified edge that allows it, so every increment or decrement is
//! forwarded there as well.

use crate::edge::{Edge, EdgeKind};
use crate::event::{ChangeEvent, ChangeType};
use crate::graph::{ReflexionGraph, Triple};
use crate::id::EdgeId;

impl ReflexionGraph {
    /// Adds the contribution of an implementation edge.
    pub(crate) fn propagate(&mut self, edge: EdgeId) {
        if !self.running {
            return;
        }
        let Some(key) = self.propagation_key(edge) else {
            return;
        };
        match self.propagated.get(&key).copied() {
            Some(existing) => self.increment_propagated(existing),
            None => self.create_propagated(key),
        }
    }

    /// Retracts the contribution of an implementation edge. Must run before
    /// the mapping or the edge itself changes.
    pub(crate) fn unpropagate(&mut self, edge: EdgeId) {
        if !self.running {
            return;
        }
        let Some(key) = self.propagation_key(edge) else {
            return;
        };
        let Some(propagated) = self.propagated.get(&key).copied() else {
            tracing::warn!(%edge, "implementation edge has no propagated edge to retract");
            return;
        };
        let Some(weight) = self.edge(propagated) else {
            return;
        };
        let counter = weight.counter;
        let allowed_by = weight.allowed_by;

        if counter <= 1 {
            if let Some(info) = self.edge_info(propagated) {
                self.bus.publish(ChangeEvent::PropagatedEdge {
                    edge: info,
                    change: ChangeType::Removal,
                });
            }
            self.delete_edge(propagated);
            self.propagated.shift_remove(&key);
        } else {
            if let Some(weight) = self.edge_mut(propagated) {
                weight.counter = counter - 1;
            }
            self.publish_counter(propagated, counter, counter - 1);
        }

        if let Some(specified) = allowed_by {
            self.change_specified_counter(specified, -1);
        }
    }

    /// The propagated triple an implementation edge lifts to, if both of
    /// its endpoints are mapped.
    pub(crate) fn propagation_key(&self, edge: EdgeId) -> Option<Triple> {
        let weight = self.edge(edge)?;
        if weight.kind != EdgeKind::Implementation {
            return None;
        }
        let (source, target) = self.endpoints(edge)?;
        let from = self.maps_to(source)?;
        let to = self.maps_to(target)?;
        Some((from, to, weight.edge_type.clone()))
    }

    fn create_propagated(&mut self, key: Triple) {
        let (from, to, edge_type) = key.clone();
        let mut weight = Edge::new(edge_type, EdgeKind::Propagated);
        weight.counter = 1;
        let id = self.insert_edge(from, to, weight);
        self.propagated.insert(key, id);

        if let Some(info) = self.edge_info(id) {
            self.bus.publish(ChangeEvent::PropagatedEdge {
                edge: info,
                change: ChangeType::Addition,
            });
        }
        self.reclassify_propagated(id);
    }

    fn increment_propagated(&mut self, id: EdgeId) {
        let Some(weight) = self.edge_mut(id) else {
            return;
        };
        let old = weight.counter;
        weight.counter = old + 1;
        let allowed_by = weight.allowed_by;
        self.publish_counter(id, old, old + 1);

        if let Some(specified) = allowed_by {
            self.change_specified_counter(specified, 1);
        }
    }

    fn publish_counter(&mut self, id: EdgeId, old: u32, new: u32) {
        if let Some(info) = self.edge_info(id) {
            self.bus
                .publish(ChangeEvent::PropagatedCounter { edge: info, old, new });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::EventRecorder;
    use crate::edge::EdgeKind;
    use crate::event::ChangeEvent;
    use crate::graph::ReflexionGraph;
    use crate::node::Subgraph;
    use crate::state::State;

    #[test]
    fn parallel_edges_share_one_propagated_edge() {
        let mut g = ReflexionGraph::default();
        g.run_analysis();
        let i1 = g.add_node("i1", "Class", Subgraph::Implementation).unwrap();
        let i2 = g.add_node("i2", "Class", Subgraph::Implementation).unwrap();
        let i3 = g.add_node("i3", "Class", Subgraph::Implementation).unwrap();
        let a1 = g.add_node("a1", "Component", Subgraph::Architecture).unwrap();
        let a2 = g.add_node("a2", "Component", Subgraph::Architecture).unwrap();
        g.add_to_mapping(i1, a1).unwrap();
        g.add_to_mapping(i2, a2).unwrap();
        g.add_to_mapping(i3, a2).unwrap();

        let e1 = g.add_edge(i1, i2, "call").unwrap();
        let e2 = g.add_edge(i1, i3, "call").unwrap();
        let pe = g.propagated_edge(a1, a2, "call").unwrap();
        assert_eq!(g.counter(pe), Some(2));
        assert_eq!(g.propagated_edges().count(), 1);

        g.remove_edge(e1).unwrap();
        assert_eq!(g.counter(pe), Some(1));
        g.remove_edge(e2).unwrap();
        assert_eq!(g.propagated_edge(a1, a2, "call"), None);
        assert_eq!(g.edges(EdgeKind::Propagated).count(), 0);
    }

    #[test]
    fn types_are_propagated_separately() {
        let mut g = ReflexionGraph::default();
        g.run_analysis();
        let i1 = g.add_node("i1", "Class", Subgraph::Implementation).unwrap();
        let i2 = g.add_node("i2", "Class", Subgraph::Implementation).unwrap();
        let a1 = g.add_node("a1", "Component", Subgraph::Architecture).unwrap();
        let a2 = g.add_node("a2", "Component", Subgraph::Architecture).unwrap();
        g.add_to_mapping(i1, a1).unwrap();
        g.add_to_mapping(i2, a2).unwrap();
        g.add_edge(i1, i2, "call").unwrap();
        g.add_edge(i1, i2, "access").unwrap();

        assert_eq!(g.propagated_edges().count(), 2);
        assert_eq!(g.state(a1, a2, "call"), Ok(State::Divergent));
        assert_eq!(g.state(a1, a2, "access"), Ok(State::Divergent));
    }

    #[test]
    fn unmapped_endpoint_propagates_nothing() {
        let mut g = ReflexionGraph::default();
        g.run_analysis();
        let i1 = g.add_node("i1", "Class", Subgraph::Implementation).unwrap();
        let i2 = g.add_node("i2", "Class", Subgraph::Implementation).unwrap();
        let a1 = g.add_node("a1", "Component", Subgraph::Architecture).unwrap();
        g.add_to_mapping(i1, a1).unwrap();
        let recorder = EventRecorder::new();
        g.subscribe(recorder.clone());

        g.add_edge(i1, i2, "call").unwrap();
        assert_eq!(g.propagated_edges().count(), 0);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn counter_changes_are_published() {
        let mut g = ReflexionGraph::default();
        g.run_analysis();
        let i1 = g.add_node("i1", "Class", Subgraph::Implementation).unwrap();
        let a1 = g.add_node("a1", "Component", Subgraph::Architecture).unwrap();
        g.add_to_mapping(i1, a1).unwrap();
        g.add_edge(i1, i1, "call").unwrap();
        let recorder = EventRecorder::new();
        g.subscribe(recorder.clone());

        g.add_edge(i1, i1, "call").unwrap();
        let counters: Vec<(u32, u32)> = recorder
            .events()
            .iter()
            .filter_map(|e| match e {
                ChangeEvent::PropagatedCounter { old, new, .. } => Some((*old, *new)),
                _ => None,
            })
            .collect();
        assert_eq!(counters, vec![(1, 2)]);
    }
}
