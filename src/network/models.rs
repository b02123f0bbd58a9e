//! Routing data models.
//!
//! - [`StopGraph`]: petgraph wrapper with stop id ↔ NodeIndex mapping
//! - [`NextHop`]: edge weight carried over from the NEXT relationship
//! - [`PathResult`]: output of a shortest-path query

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attributes of one NEXT edge, kept on the petgraph edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NextHop {
    pub travel_time: Option<i32>,
    pub distance: Option<i32>,
}

/// Directed stop graph: nodes are stop ids, edges are NEXT relationships.
#[derive(Debug, Default)]
pub struct StopGraph {
    /// The underlying directed graph
    pub graph: DiGraph<String, NextHop>,
    /// Mapping from stop id to petgraph NodeIndex
    pub id_to_index: HashMap<String, NodeIndex>,
}

impl StopGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a StopGraph with pre-allocated capacity.
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            graph: DiGraph::with_capacity(nodes, edges),
            id_to_index: HashMap::with_capacity(nodes),
        }
    }

    /// Add a stop. Returns the existing index if the id is already present.
    pub fn add_stop(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.id_to_index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.id_to_index.insert(id.to_string(), idx);
        idx
    }

    /// Add a NEXT edge. Returns `None` if either stop is unknown.
    pub fn add_next(&mut self, from_id: &str, to_id: &str, hop: NextHop) -> Option<EdgeIndex> {
        let from_idx = self.id_to_index.get(from_id)?;
        let to_idx = self.id_to_index.get(to_id)?;
        Some(self.graph.add_edge(*from_idx, *to_idx, hop))
    }

    pub fn get_index(&self, id: &str) -> Option<NodeIndex> {
        self.id_to_index.get(id).copied()
    }

    /// Stop id of a node index
    pub fn stop_id(&self, idx: NodeIndex) -> &str {
        self.graph
            .node_weight(idx)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Successors of a stop in ascending stop id order, deduplicated.
    pub fn sorted_successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        next.sort_by(|a, b| self.stop_id(*a).cmp(self.stop_id(*b)));
        next.dedup();
        next
    }

    /// In-degree + out-degree over NEXT edges (self-loops count twice).
    pub fn degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Outgoing).count()
            + self.graph.edges_directed(idx, Direction::Incoming).count()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Fewest-hop path between two stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    /// Stop ids from start to end, both inclusive
    pub stop_ids: Vec<String>,
    /// Number of NEXT edges traversed (`stop_ids.len() - 1`)
    pub hops: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_stop_is_idempotent() {
        let mut g = StopGraph::new();
        let a = g.add_stop("A");
        assert_eq!(g.add_stop("A"), a);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn test_add_next_requires_known_stops() {
        let mut g = StopGraph::new();
        g.add_stop("A");
        assert!(g.add_next("A", "B", NextHop::default()).is_none());
        g.add_stop("B");
        assert!(g.add_next("A", "B", NextHop::default()).is_some());
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_sorted_successors_orders_by_stop_id() {
        let mut g = StopGraph::new();
        for id in ["A", "C", "B", "D"] {
            g.add_stop(id);
        }
        g.add_next("A", "D", NextHop::default());
        g.add_next("A", "B", NextHop::default());
        g.add_next("A", "C", NextHop::default());

        let a = g.get_index("A").unwrap();
        let ids: Vec<&str> = g
            .sorted_successors(a)
            .into_iter()
            .map(|idx| g.stop_id(idx))
            .collect();
        assert_eq!(ids, vec!["B", "C", "D"]);
        assert_eq!(g.degree(a), 3);
    }
}
