//! Full (non-incremental) analysis, result queries, and self-checks.
//!
//! [`ReflexionGraph::run_analysis`] discards all derived state and
//! recomputes it from the implementation, the architecture, and the
//! explicit mappings. The incremental operations must always end in the
//! same state; [`ReflexionGraph::check_consistency`] verifies this for the
//! current graph and [`ReflexionGraph::classification`] gives an
//! ID-independent snapshot for comparing two graphs.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::edge::{Edge, EdgeKind};
use crate::error::ReflexionError;
use crate::event::{ChangeEvent, ChangeType};
use crate::graph::{ReflexionGraph, Triple};
use crate::id::{EdgeId, NodeId};
use crate::node::Subgraph;
use crate::state::State;

/// Number of architecture edges and sum of their counters per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    edges: BTreeMap<State, usize>,
    weights: BTreeMap<State, u64>,
}

impl Summary {
    /// Number of edges in `state`.
    pub fn edges(&self, state: State) -> usize {
        self.edges.get(&state).copied().unwrap_or(0)
    }

    /// Sum of the counters of all edges in `state`.
    pub fn weight(&self, state: State) -> u64 {
        self.weights.get(&state).copied().unwrap_or(0)
    }

    pub fn total_edges(&self) -> usize {
        self.edges.values().sum()
    }

    fn record(&mut self, edge: &Edge) {
        *self.edges.entry(edge.state).or_default() += 1;
        *self.weights.entry(edge.state).or_default() += u64::from(edge.counter);
    }
}

/// One classified architecture edge, identified by node keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub source: String,
    pub target: String,
    pub edge_type: String,
    pub kind: EdgeKind,
    pub state: State,
    pub counter: u32,
}

impl ReflexionGraph {
    // -----------------------------------------------------------------------
    // Full analysis
    // -----------------------------------------------------------------------

    /// Recomputes propagation and classification from scratch and switches
    /// the graph to incremental mode.
    pub fn run_analysis(&mut self) {
        tracing::debug!(
            implementation_edges = self.edges(EdgeKind::Implementation).count(),
            specified_edges = self.specified.len(),
            mappings = self.explicit.len(),
            "running full reflexion analysis"
        );

        let stale: Vec<EdgeId> = self.propagated.drain(..).map(|(_, id)| id).collect();
        for id in stale {
            if let Some(info) = self.edge_info(id) {
                self.bus.publish(ChangeEvent::PropagatedEdge {
                    edge: info,
                    change: ChangeType::Removal,
                });
            }
            self.delete_edge(id);
        }

        let specified: Vec<EdgeId> = self.specified.values().copied().collect();
        for &id in &specified {
            if let Some(weight) = self.edge_mut(id) {
                weight.counter = 0;
            }
            self.transition(id, State::Specified);
        }

        self.rebuild_implicit_mapping();
        self.running = true;

        let implementation: Vec<EdgeId> = self.edges(EdgeKind::Implementation).collect();
        for edge in implementation {
            self.propagate(edge);
        }
        for id in specified {
            self.refresh_specified(id);
        }

        let summary = self.summary();
        tracing::info!(
            propagated = self.propagated.len(),
            convergent = summary.edges(State::Convergent),
            divergent = summary.edges(State::Divergent),
            absent = summary.edges(State::Absent),
            "reflexion analysis complete"
        );
    }

    // -----------------------------------------------------------------------
    // Query methods
    // -----------------------------------------------------------------------

    /// State of the dependency `from -> to` of `edge_type`.
    ///
    /// A specified edge determines the state of its triple; otherwise the
    /// propagated edge does.
    pub fn state(&self, from: NodeId, to: NodeId, edge_type: &str) -> Result<State, ReflexionError> {
        self.specified_edge(from, to, edge_type)
            .or_else(|| self.propagated_edge(from, to, edge_type))
            .and_then(|id| self.edge_state(id))
            .ok_or_else(|| ReflexionError::NoSuchDependency {
                from,
                to,
                edge_type: edge_type.to_string(),
            })
    }

    pub fn edge_state(&self, edge: EdgeId) -> Option<State> {
        self.edge(edge).map(Edge::state)
    }

    pub fn counter(&self, edge: EdgeId) -> Option<u32> {
        self.edge(edge).map(Edge::counter)
    }

    pub fn specified_edge(&self, from: NodeId, to: NodeId, edge_type: &str) -> Option<EdgeId> {
        self.specified
            .get(&(from, to, edge_type.to_string()))
            .copied()
    }

    pub fn propagated_edge(&self, from: NodeId, to: NodeId, edge_type: &str) -> Option<EdgeId> {
        self.propagated
            .get(&(from, to, edge_type.to_string()))
            .copied()
    }

    /// Current propagated edges, oldest first.
    pub fn propagated_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.propagated.values().copied()
    }

    pub fn specified_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.specified.values().copied()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for id in self.specified_edges().chain(self.propagated_edges()) {
            if let Some(edge) = self.edge(id) {
                summary.record(edge);
            }
        }
        summary
    }

    /// All specified and propagated edges with their states, sorted.
    pub fn classification(&self) -> Vec<Classification> {
        let mut result: Vec<Classification> = self
            .specified_edges()
            .chain(self.propagated_edges())
            .filter_map(|id| {
                let (from, to) = self.endpoints(id)?;
                let edge = self.edge(id)?;
                Some(Classification {
                    source: self.node(from)?.key.clone(),
                    target: self.node(to)?.key.clone(),
                    edge_type: edge.edge_type.clone(),
                    kind: edge.kind,
                    state: edge.state,
                    counter: edge.counter,
                })
            })
            .collect();
        result.sort();
        result
    }

    // -----------------------------------------------------------------------
    // Consistency check
    // -----------------------------------------------------------------------

    /// Recomputes all derived state and compares it with what the graph
    /// holds.
    pub fn check_consistency(&self) -> Result<(), ReflexionError> {
        self.check_hierarchy()?;
        self.check_mapping()?;
        if self.running {
            self.check_propagation()?;
            self.check_classification()?;
        } else if !self.propagated.is_empty() {
            return inconsistent("propagated edges exist before the analysis ran".into());
        }
        Ok(())
    }

    fn check_hierarchy(&self) -> Result<(), ReflexionError> {
        for subgraph in [Subgraph::Implementation, Subgraph::Architecture] {
            for node in self.nodes(subgraph) {
                if let Some(parent) = self.parent(node) {
                    let Some(p) = self.node(parent) else {
                        return inconsistent(format!("node {node} has dangling parent {parent}"));
                    };
                    if p.subgraph != subgraph || !p.children().contains(&node) {
                        return inconsistent(format!("parent {parent} does not list child {node}"));
                    }
                    if self.ancestors(parent).contains(&node) {
                        return inconsistent(format!("node {node} is its own ancestor"));
                    }
                }
                for &child in self.children(node) {
                    if self.parent(child) != Some(node) {
                        return inconsistent(format!("child {child} does not point back to {node}"));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_mapping(&self) -> Result<(), ReflexionError> {
        for node in self.nodes(Subgraph::Implementation) {
            let expected = self
                .mapped_ancestor(node)
                .and_then(|ancestor| self.explicit_target(ancestor));
            if self.maps_to(node) != expected {
                return inconsistent(format!(
                    "node {node} maps to {:?}, expected {expected:?}",
                    self.maps_to(node)
                ));
            }
        }
        Ok(())
    }

    fn check_propagation(&self) -> Result<(), ReflexionError> {
        let mut expected: HashMap<Triple, u32> = HashMap::new();
        for edge in self.edges(EdgeKind::Implementation) {
            if let Some(key) = self.propagation_key(edge) {
                *expected.entry(key).or_default() += 1;
            }
        }
        if expected.len() != self.propagated.len() {
            return inconsistent(format!(
                "{} propagated edges, expected {}",
                self.propagated.len(),
                expected.len()
            ));
        }
        for (key, &id) in &self.propagated {
            let counter = self.counter(id).unwrap_or(0);
            if expected.get(key) != Some(&counter) {
                return inconsistent(format!(
                    "propagated edge {id} has counter {counter}, expected {:?}",
                    expected.get(key)
                ));
            }
        }
        Ok(())
    }

    fn check_classification(&self) -> Result<(), ReflexionError> {
        let mut allowed: HashMap<EdgeId, u32> = HashMap::new();
        for ((from, to, edge_type), &id) in &self.propagated {
            let Some(edge) = self.edge(id) else {
                return inconsistent(format!("propagated edge {id} is missing"));
            };
            let (state, allowed_by) = self.classify_propagated(*from, *to, edge_type);
            if edge.state != state || edge.allowed_by != allowed_by {
                return inconsistent(format!(
                    "propagated edge {id} is {} (allowed by {:?}), expected {state} (allowed by {allowed_by:?})",
                    edge.state, edge.allowed_by
                ));
            }
            if let Some(specified) = allowed_by {
                *allowed.entry(specified).or_default() += edge.counter;
            }
        }
        for &id in self.specified.values() {
            let Some(edge) = self.edge(id) else {
                return inconsistent(format!("specified edge {id} is missing"));
            };
            let counter = allowed.get(&id).copied().unwrap_or(0);
            let state = State::for_specified(counter, edge.is_optional());
            if edge.counter != counter || edge.state != state {
                return inconsistent(format!(
                    "specified edge {id} is {} with counter {}, expected {state} with counter {counter}",
                    edge.state, edge.counter
                ));
            }
        }
        Ok(())
    }
}

fn inconsistent(reason: String) -> Result<(), ReflexionError> {
    Err(ReflexionError::GraphInconsistency { reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventRecorder;

    /// Two-component architecture with a specified a1 -> a2 call and an
    /// implementation call i1 -> i2.
    fn two_components() -> (ReflexionGraph, [NodeId; 2], [NodeId; 2]) {
        let mut g = ReflexionGraph::default();
        let i1 = g.add_node("i1", "Class", Subgraph::Implementation).unwrap();
        let i2 = g.add_node("i2", "Class", Subgraph::Implementation).unwrap();
        let a1 = g.add_node("a1", "Component", Subgraph::Architecture).unwrap();
        let a2 = g.add_node("a2", "Component", Subgraph::Architecture).unwrap();
        g.add_edge(i1, i2, "call").unwrap();
        (g, [i1, i2], [a1, a2])
    }

    #[test]
    fn full_analysis_classifies_convergence() {
        let (mut g, [i1, i2], [a1, a2]) = two_components();
        let specified = g.add_edge(a1, a2, "call").unwrap();
        g.add_to_mapping(i1, a1).unwrap();
        g.add_to_mapping(i2, a2).unwrap();
        assert_eq!(g.edge_state(specified), Some(State::Specified));

        g.run_analysis();
        assert!(g.is_analysis_running());
        assert_eq!(g.state(a1, a2, "call"), Ok(State::Convergent));
        let pe = g.propagated_edge(a1, a2, "call").unwrap();
        assert_eq!(g.edge_state(pe), Some(State::Allowed));
        assert_eq!(g.counter(specified), Some(1));
        g.check_consistency().unwrap();
    }

    #[test]
    fn full_analysis_classifies_absence() {
        let (mut g, _, [a1, a2]) = two_components();
        let required = g.add_edge(a1, a2, "call").unwrap();
        let optional = g.add_specified_edge(a2, a1, "call", true).unwrap();
        g.run_analysis();
        assert_eq!(g.edge_state(required), Some(State::Absent));
        assert_eq!(g.edge_state(optional), Some(State::AllowedAbsent));
    }

    #[test]
    fn rerunning_analysis_is_stable() {
        let (mut g, [i1, i2], [a1, a2]) = two_components();
        g.add_to_mapping(i1, a1).unwrap();
        g.add_to_mapping(i2, a2).unwrap();
        g.run_analysis();
        let before = g.classification();

        let recorder = EventRecorder::new();
        g.subscribe(recorder.clone());
        g.run_analysis();
        assert_eq!(g.classification(), before);
        // the old propagated edge is dropped and rebuilt
        assert!(recorder.events().iter().any(|e| e.is_propagated_removal()));
        assert!(recorder.events().iter().any(|e| e.is_propagated_addition()));
    }

    #[test]
    fn unknown_triple_is_not_found() {
        let (mut g, _, [a1, a2]) = two_components();
        g.run_analysis();
        assert_eq!(
            g.state(a1, a2, "call"),
            Err(ReflexionError::NoSuchDependency {
                from: a1,
                to: a2,
                edge_type: "call".into()
            })
        );
    }

    #[test]
    fn summary_counts_edges_and_weights() {
        let (mut g, [i1, i2], [a1, a2]) = two_components();
        g.add_edge(i1, i2, "call").unwrap();
        g.add_edge(a2, a1, "call").unwrap();
        g.add_to_mapping(i1, a1).unwrap();
        g.add_to_mapping(i2, a2).unwrap();
        g.run_analysis();

        let summary = g.summary();
        assert_eq!(summary.edges(State::Divergent), 1);
        assert_eq!(summary.weight(State::Divergent), 2);
        assert_eq!(summary.edges(State::Absent), 1);
        assert_eq!(summary.weight(State::Absent), 0);
        assert_eq!(summary.edges(State::Convergent), 0);
        assert_eq!(summary.total_edges(), 2);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["edges"]["Divergent"], 1);
    }

    #[test]
    fn classification_uses_node_keys() {
        let (mut g, [i1, i2], [a1, a2]) = two_components();
        g.add_to_mapping(i1, a1).unwrap();
        g.add_to_mapping(i2, a2).unwrap();
        g.run_analysis();

        assert_eq!(
            g.classification(),
            vec![Classification {
                source: "a1".into(),
                target: "a2".into(),
                edge_type: "call".into(),
                kind: EdgeKind::Propagated,
                state: State::Divergent,
                counter: 1,
            }]
        );
    }

    #[test]
    fn consistency_check_catches_tampering() {
        let (mut g, [i1, i2], [a1, a2]) = two_components();
        g.add_to_mapping(i1, a1).unwrap();
        g.add_to_mapping(i2, a2).unwrap();
        g.run_analysis();
        let pe = g.propagated_edge(a1, a2, "call").unwrap();
        g.edge_mut(pe).unwrap().counter = 5;

        let err = g.check_consistency().unwrap_err();
        assert!(matches!(err, ReflexionError::GraphInconsistency { .. }));
    }
}
