//! Bounded-hop shortest path over NEXT edges.
//!
//! NEXT is treated as directed and unweighted: the path with the fewest hops
//! wins, travel times are ignored. Successors are expanded in ascending stop
//! id order and a stop's parent is whichever stop discovered it first, so
//! among equal-length paths the result is always the same one.

use crate::error::{require_id, GraphError, Result};
use crate::store::GraphStore;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::extraction::extract_stop_graph;
use super::models::{PathResult, StopGraph};

/// Shortest-path queries over the stop network.
pub struct PathFinder {
    store: Arc<dyn GraphStore>,
}

impl PathFinder {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Fewest-hop path from `start_id` to `end_id` using at most `max_hops` NEXT edges.
    ///
    /// Unknown stops fail with `NotFound`; no path within the budget fails
    /// with `NoPathFound`.
    pub async fn shortest_path(
        &self,
        start_id: &str,
        end_id: &str,
        max_hops: u32,
    ) -> Result<PathResult> {
        require_id("Stop", start_id)?;
        require_id("Stop", end_id)?;

        let snapshot = self.store.snapshot().await?;
        let graph = extract_stop_graph(&snapshot);

        let start = graph
            .get_index(start_id)
            .ok_or_else(|| GraphError::not_found("Stop", start_id))?;
        let end = graph
            .get_index(end_id)
            .ok_or_else(|| GraphError::not_found("Stop", end_id))?;

        let path = bounded_bfs(&graph, start, end, max_hops).ok_or_else(|| {
            GraphError::NoPathFound {
                from: start_id.to_string(),
                to: end_id.to_string(),
                max_hops,
            }
        })?;

        let hops = (path.len() - 1) as u32;
        tracing::debug!(start = start_id, end = end_id, hops, "Shortest path found");

        Ok(PathResult {
            stop_ids: path
                .into_iter()
                .map(|idx| graph.stop_id(idx).to_string())
                .collect(),
            hops,
        })
    }
}

/// Breadth-first search that never expands past `max_hops`.
///
/// Returns the node sequence from `start` to `end` inclusive.
pub(crate) fn bounded_bfs(
    graph: &StopGraph,
    start: NodeIndex,
    end: NodeIndex,
    max_hops: u32,
) -> Option<Vec<NodeIndex>> {
    if start == end {
        return Some(vec![start]);
    }

    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue: VecDeque<(NodeIndex, u32)> = VecDeque::new();
    parent.insert(start, start);
    queue.push_back((start, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if depth == max_hops {
            continue;
        }
        for next in graph.sorted_successors(current) {
            if parent.contains_key(&next) {
                continue;
            }
            parent.insert(next, current);
            if next == end {
                return Some(walk_back(&parent, start, end));
            }
            queue.push_back((next, depth + 1));
        }
    }

    None
}

fn walk_back(parent: &HashMap<NodeIndex, NodeIndex>, start: NodeIndex, end: NodeIndex) -> Vec<NodeIndex> {
    let mut path = vec![end];
    let mut cursor = end;
    while cursor != start {
        match parent.get(&cursor) {
            Some(&prev) => {
                path.push(prev);
                cursor = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}
