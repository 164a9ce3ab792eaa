//! Cross-host graph accreted from per-frame deltas.
//!
//! Strictly additive for the lifetime of a run view: nodes are never removed
//! and edge counts only grow. Edges are directed and keyed by the
//! `(source, destination)` pair itself, so host names never need escaping.

use std::collections::{BTreeMap, BTreeSet};

use shared_types::GraphDelta;

/// Directed edge identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub src: String,
    pub dst: String,
}

impl EdgeKey {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Accumulated edge, as handed to renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub src: String,
    pub dst: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphState {
    nodes: BTreeSet<String>,
    edges: BTreeMap<EdgeKey, u64>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, delta: &GraphDelta) {
        for node in &delta.nodes {
            if !self.nodes.contains(node) {
                self.nodes.insert(node.clone());
            }
        }

        for edge in &delta.edges {
            let total = self
                .edges
                .entry(EdgeKey::new(edge.src.as_str(), edge.dst.as_str()))
                .or_insert(0);
            *total = total.saturating_add(edge.count);
        }
    }

    /// Non-mutating form of [`apply`](Self::apply).
    pub fn applied(&self, delta: &GraphDelta) -> Self {
        let mut next = self.clone();
        next.apply(delta);
        next
    }

    pub fn contains_node(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    pub fn nodes(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.nodes.iter().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, src: &str, dst: &str) -> Option<u64> {
        self.edges.get(&EdgeKey::new(src, dst)).copied()
    }

    /// Edges ordered by `(src, dst)`.
    pub fn edges(&self) -> Vec<GraphEdge> {
        self.edges
            .iter()
            .map(|(key, count)| GraphEdge {
                src: key.src.clone(),
                dst: key.dst.clone(),
                count: *count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::EdgeObservation;

    fn delta(nodes: &[&str], edges: &[(&str, &str, u64)]) -> GraphDelta {
        GraphDelta {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            edges: edges
                .iter()
                .map(|(src, dst, count)| EdgeObservation::new(*src, *dst, *count))
                .collect(),
        }
    }

    #[test]
    fn test_repeated_edge_accumulates() {
        let mut graph = GraphState::new();
        graph.apply(&delta(&[], &[("A", "B", 3)]));
        graph.apply(&delta(&[], &[("A", "B", 2)]));
        assert_eq!(graph.edge("A", "B"), Some(5));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_edge_direction_is_preserved() {
        let mut graph = GraphState::new();
        graph.apply(&delta(&[], &[("A", "B", 1), ("B", "A", 1)]));
        assert_eq!(graph.edge("A", "B"), Some(1));
        assert_eq!(graph.edge("B", "A"), Some(1));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_same_edge_twice_in_one_delta_accumulates() {
        let mut graph = GraphState::new();
        graph.apply(&delta(&[], &[("A", "B", 1), ("A", "B", 4)]));
        assert_eq!(graph.edge("A", "B"), Some(5));
    }

    #[test]
    fn test_separator_lookalikes_stay_distinct() {
        let mut graph = GraphState::new();
        graph.apply(&delta(&[], &[("a->b", "c", 1), ("a", "b->c", 1)]));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edge("a->b", "c"), Some(1));
        assert_eq!(graph.edge("a", "b->c"), Some(1));
    }

    #[test]
    fn test_nodes_are_idempotent_and_monotonic() {
        let mut graph = GraphState::new();
        let deltas = [
            delta(&["a.com", "b.com"], &[]),
            delta(&["b.com"], &[]),
            delta(&[], &[]),
            delta(&["c.com", "a.com"], &[]),
        ];

        let mut previous: Vec<String> = Vec::new();
        for d in &deltas {
            graph.apply(d);
            for node in &previous {
                assert!(graph.contains_node(node));
            }
            previous = graph.nodes().map(ToString::to_string).collect();
        }
        assert_eq!(graph.nodes().collect::<Vec<_>>(), vec!["a.com", "b.com", "c.com"]);
    }

    #[test]
    fn test_two_frame_scenario() {
        let mut graph = GraphState::new();
        graph.apply(&delta(&["a.com", "b.com"], &[("a.com", "b.com", 4)]));
        graph.apply(&delta(
            &["b.com", "c.com"],
            &[("a.com", "b.com", 1), ("b.com", "c.com", 2)],
        ));

        assert_eq!(graph.nodes().collect::<Vec<_>>(), vec!["a.com", "b.com", "c.com"]);
        assert_eq!(
            graph.edges(),
            vec![
                GraphEdge {
                    src: "a.com".to_string(),
                    dst: "b.com".to_string(),
                    count: 5
                },
                GraphEdge {
                    src: "b.com".to_string(),
                    dst: "c.com".to_string(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_applied_is_pure() {
        let base = GraphState::new().applied(&delta(&["a"], &[("a", "b", 1)]));
        let next = base.applied(&delta(&["b"], &[("a", "b", 1)]));
        assert_eq!(base.edge("a", "b"), Some(1));
        assert_eq!(next.edge("a", "b"), Some(2));
        assert!(!base.contains_node("b"));
    }
}
