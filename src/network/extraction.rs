//! Snapshot → petgraph extraction.
//!
//! Every stop becomes a node (isolated stops included, so a path query can
//! tell "unknown stop" apart from "unreachable stop"); every NEXT edge whose
//! endpoints are both present becomes a directed edge.

use crate::store::NetworkSnapshot;

use super::models::{NextHop, StopGraph};

/// Build the stop graph from one consistent snapshot.
pub fn extract_stop_graph(snapshot: &NetworkSnapshot) -> StopGraph {
    let mut graph = StopGraph::with_capacity(snapshot.stops.len(), snapshot.next_edges.len());

    for stop in &snapshot.stops {
        graph.add_stop(&stop.id);
    }

    for edge in &snapshot.next_edges {
        // Dangling edges cannot exist in a consistent snapshot; skip them anyway
        graph.add_next(
            &edge.from_id,
            &edge.to_id,
            NextHop {
                travel_time: edge.travel_time,
                distance: edge.distance,
            },
        );
    }

    tracing::debug!(
        stops = graph.node_count(),
        next_edges = graph.edge_count(),
        "Extracted stop graph"
    );

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_next, test_stop};

    #[test]
    fn test_extract_keeps_isolated_stops_and_drops_dangling_edges() {
        let snapshot = NetworkSnapshot {
            stops: vec![test_stop("A", "Z1"), test_stop("B", "Z1"), test_stop("C", "Z2")],
            next_edges: vec![test_next("A", "B", 5), test_next("B", "GHOST", 5)],
            ..Default::default()
        };

        let graph = extract_stop_graph(&snapshot);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.get_index("C").is_some());

        let a = graph.get_index("A").unwrap();
        let b = graph.get_index("B").unwrap();
        let edge = graph.graph.find_edge(a, b).unwrap();
        assert_eq!(graph.graph[edge].travel_time, Some(5));
    }
}
