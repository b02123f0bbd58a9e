//! Network aggregation algorithms.
//!
//! Implements the read-only analytics over a `NetworkSnapshot`:
//! - **Top pairs**: NEXT pairs ranked by the number of lines serving both ends
//! - **Depot idle stats**: idle parked vehicles and their mean time since last seen
//! - **Average occupancy**: capacity in active service per depot
//! - **Groupings**: vehicles by depot name, stops by zone
//! - **Top connected stops**: stops ranked by NEXT degree
//!
//! All functions are pure; empty inputs yield empty outputs.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::models::{ConnectedStop, DepotIdleStat, DepotOccupancy, TopPair, VehicleSummary};
use crate::network::StopGraph;
use crate::store::{NetworkSnapshot, StopNode, VehicleNode, VehicleStatus};

/// Distinct vehicles parked at each depot (by depot id), in uuid order.
fn parked_by_depot(snapshot: &NetworkSnapshot) -> BTreeMap<&str, Vec<&VehicleNode>> {
    let vehicles: HashMap<&str, &VehicleNode> = snapshot
        .vehicles
        .iter()
        .map(|v| (v.vehicle_uuid.as_str(), v))
        .collect();

    let mut uuids: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for p in &snapshot.parkings {
        uuids
            .entry(p.depot_id.as_str())
            .or_default()
            .insert(p.vehicle_uuid.as_str());
    }

    uuids
        .into_iter()
        .map(|(depot, set)| {
            let parked = set
                .into_iter()
                .filter_map(|uuid| vehicles.get(uuid).copied())
                .collect();
            (depot, parked)
        })
        .collect()
}

// ============================================================================
// Top pairs
// ============================================================================

/// Rank NEXT(s1 → s2), s1 ≠ s2, by the number of distinct lines serving both stops.
///
/// Pairs no line covers are left out. Sorted by count descending, then
/// `(from, to)` ascending, truncated to `limit`.
pub fn top_pairs(snapshot: &NetworkSnapshot, limit: usize) -> Vec<TopPair> {
    let mut lines_at: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for s in &snapshot.serves {
        lines_at
            .entry(s.stop_id.as_str())
            .or_default()
            .insert(s.line_id.as_str());
    }

    let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
    let mut pairs: Vec<TopPair> = Vec::new();
    for edge in &snapshot.next_edges {
        let (from, to) = (edge.from_id.as_str(), edge.to_id.as_str());
        if from == to || !seen.insert((from, to)) {
            continue;
        }
        let (Some(a), Some(b)) = (lines_at.get(from), lines_at.get(to)) else {
            continue;
        };
        let lines = a.intersection(b).count();
        if lines > 0 {
            pairs.push(TopPair {
                from: from.to_string(),
                to: to.to_string(),
                lines,
            });
        }
    }

    pairs.sort_by(|x, y| {
        y.lines
            .cmp(&x.lines)
            .then_with(|| x.from.cmp(&y.from))
            .then_with(|| x.to.cmp(&y.to))
    });
    pairs.truncate(limit);
    pairs
}

// ============================================================================
// Depot statistics
// ============================================================================

/// Per depot: IDLE parked vehicles with a known `last_seen_ts`, and the mean
/// milliseconds elapsed since then as of `now`.
///
/// Depots without a qualifying vehicle are omitted. Sorted by count
/// descending, then depot id, truncated to `limit`.
pub fn depots_idle_stats(
    snapshot: &NetworkSnapshot,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<DepotIdleStat> {
    let names: HashMap<&str, &str> = snapshot
        .depots
        .iter()
        .map(|d| (d.id.as_str(), d.name.as_str()))
        .collect();

    let mut stats: Vec<DepotIdleStat> = parked_by_depot(snapshot)
        .into_iter()
        .filter_map(|(depot_id, vehicles)| {
            let name = names.get(depot_id)?;
            let idle_ms: Vec<i64> = vehicles
                .iter()
                .filter(|v| v.status == VehicleStatus::Idle)
                .filter_map(|v| v.last_seen_ts)
                .map(|ts| (now - ts).num_milliseconds())
                .collect();
            if idle_ms.is_empty() {
                return None;
            }
            let total: f64 = idle_ms.iter().map(|ms| *ms as f64).sum();
            Some(DepotIdleStat {
                depot_id: depot_id.to_string(),
                depot_name: name.to_string(),
                parked_count: idle_ms.len(),
                avg_idle_ms: total / idle_ms.len() as f64,
            })
        })
        .collect();

    stats.sort_by(|a, b| {
        b.parked_count
            .cmp(&a.parked_count)
            .then_with(|| a.depot_id.cmp(&b.depot_id))
    });
    stats.truncate(limit);
    stats
}

/// Average of `capacity` (ACTIVE) or 0 (otherwise) over each depot's parked vehicles.
///
/// Depots with nothing parked are omitted. Sorted by depot id.
pub fn average_occupancy_by_depot(snapshot: &NetworkSnapshot) -> Vec<DepotOccupancy> {
    let names: HashMap<&str, &str> = snapshot
        .depots
        .iter()
        .map(|d| (d.id.as_str(), d.name.as_str()))
        .collect();

    parked_by_depot(snapshot)
        .into_iter()
        .filter(|(_, vehicles)| !vehicles.is_empty())
        .filter_map(|(depot_id, vehicles)| {
            let name = names.get(depot_id)?;
            let in_service: f64 = vehicles
                .iter()
                .map(|v| match v.status {
                    VehicleStatus::Active => f64::from(v.capacity),
                    VehicleStatus::Idle => 0.0,
                })
                .sum();
            Some(DepotOccupancy {
                depot_id: depot_id.to_string(),
                depot_name: name.to_string(),
                parked_count: vehicles.len(),
                avg_occupancy: in_service / vehicles.len() as f64,
            })
        })
        .collect()
}

// ============================================================================
// Groupings
// ============================================================================

/// Parked vehicles keyed by depot name.
///
/// Depots sharing a name are merged under it.
pub fn vehicles_by_depot(snapshot: &NetworkSnapshot) -> BTreeMap<String, Vec<VehicleSummary>> {
    let names: HashMap<&str, &str> = snapshot
        .depots
        .iter()
        .map(|d| (d.id.as_str(), d.name.as_str()))
        .collect();

    let mut grouped: BTreeMap<String, Vec<VehicleSummary>> = BTreeMap::new();
    for (depot_id, vehicles) in parked_by_depot(snapshot) {
        let Some(name) = names.get(depot_id) else {
            continue;
        };
        grouped
            .entry(name.to_string())
            .or_default()
            .extend(vehicles.into_iter().map(VehicleSummary::from));
    }
    grouped
}

/// Stops keyed by zone, each list in stop id order.
pub fn stops_by_zone(snapshot: &NetworkSnapshot) -> BTreeMap<String, Vec<StopNode>> {
    let mut grouped: BTreeMap<String, Vec<StopNode>> = BTreeMap::new();
    for stop in &snapshot.stops {
        grouped.entry(stop.zone.clone()).or_default().push(stop.clone());
    }
    for stops in grouped.values_mut() {
        stops.sort_by(|a, b| a.id.cmp(&b.id));
    }
    grouped
}

// ============================================================================
// Connectivity
// ============================================================================

/// Stops ranked by NEXT degree (in + out), isolated stops excluded.
///
/// Sorted by degree descending, then stop id, truncated to `limit`.
pub fn top_connected_stops(
    graph: &StopGraph,
    snapshot: &NetworkSnapshot,
    limit: usize,
) -> Vec<ConnectedStop> {
    let mut ranked: Vec<ConnectedStop> = snapshot
        .stops
        .iter()
        .filter_map(|stop| {
            let degree = graph.degree(graph.get_index(&stop.id)?);
            (degree > 0).then(|| ConnectedStop {
                stop_id: stop.id.clone(),
                stop_name: stop.name.clone(),
                degree,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.degree
            .cmp(&a.degree)
            .then_with(|| a.stop_id.cmp(&b.stop_id))
    });
    ranked.truncate(limit);
    ranked
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::extract_stop_graph;
    use crate::store::{ParkedAtEdge, ServesEdge};
    use crate::test_helpers::*;
    use chrono::Duration;

    fn parked(vehicle_uuid: &str, depot_id: &str) -> ParkedAtEdge {
        ParkedAtEdge {
            vehicle_uuid: vehicle_uuid.to_string(),
            depot_id: depot_id.to_string(),
            since: Utc::now(),
        }
    }

    #[test]
    fn test_top_pairs_counts_lines_serving_both_ends() {
        let snapshot = NetworkSnapshot {
            stops: vec![test_stop("A", "Z1"), test_stop("B", "Z1"), test_stop("C", "Z1")],
            lines: vec![test_line("L1"), test_line("L2"), test_line("L3")],
            next_edges: vec![test_next("A", "B", 5), test_next("B", "C", 5), test_next("A", "A", 1)],
            serves: vec![
                ServesEdge::new("L1", "A", 1),
                ServesEdge::new("L1", "B", 2),
                ServesEdge::new("L2", "A", 1),
                ServesEdge::new("L2", "B", 2),
                ServesEdge::new("L3", "B", 1),
                ServesEdge::new("L3", "C", 2),
            ],
            ..Default::default()
        };

        let pairs = top_pairs(&snapshot, 1);
        assert_eq!(
            pairs,
            vec![TopPair {
                from: "A".into(),
                to: "B".into(),
                lines: 2
            }]
        );

        let all = top_pairs(&snapshot, 10);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].from, "B");
        assert_eq!(all[1].lines, 1);
        assert!(top_pairs(&NetworkSnapshot::default(), 5).is_empty());
    }

    #[test]
    fn test_top_pairs_ties_sorted_by_pair() {
        let snapshot = NetworkSnapshot {
            next_edges: vec![test_next("C", "D", 1), test_next("A", "B", 1)],
            serves: ["A", "B", "C", "D"]
                .iter()
                .map(|s| ServesEdge::new("L1", *s, 1))
                .collect(),
            ..Default::default()
        };
        let pairs = top_pairs(&snapshot, 10);
        assert_eq!(pairs[0].from, "A");
        assert_eq!(pairs[1].from, "C");
    }

    #[test]
    fn test_depots_idle_stats_only_counts_idle_with_last_seen() {
        let now = Utc::now();
        let mut idle_a = test_vehicle("v1", Some((0.0, 0.0)));
        idle_a.last_seen_ts = Some(now - Duration::milliseconds(1_000));
        let mut idle_b = test_vehicle("v2", Some((0.0, 0.0)));
        idle_b.last_seen_ts = Some(now - Duration::milliseconds(3_000));
        let mut active = test_vehicle("v3", Some((0.0, 0.0)));
        active.status = VehicleStatus::Active;
        active.last_seen_ts = Some(now);
        let unseen = test_vehicle("v4", None);
        let mut lone = test_vehicle("v5", None);
        lone.last_seen_ts = Some(now - Duration::milliseconds(500));

        let snapshot = NetworkSnapshot {
            depots: vec![test_depot("D1"), test_depot("D2"), test_depot("D3")],
            vehicles: vec![idle_a, idle_b, active, unseen, lone],
            parkings: vec![
                parked("v1", "D1"),
                parked("v1", "D1"),
                parked("v2", "D1"),
                parked("v3", "D1"),
                parked("v4", "D1"),
                parked("v3", "D2"),
                parked("v5", "D3"),
            ],
            ..Default::default()
        };

        let stats = depots_idle_stats(&snapshot, 10, now);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].depot_id, "D1");
        assert_eq!(stats[0].parked_count, 2);
        assert_eq!(stats[0].avg_idle_ms, 2_000.0);
        assert_eq!(stats[1].depot_id, "D3");
        assert_eq!(stats[1].avg_idle_ms, 500.0);

        assert_eq!(depots_idle_stats(&snapshot, 1, now).len(), 1);
    }

    #[test]
    fn test_average_occupancy_weights_active_capacity() {
        let mut active = test_vehicle("v1", None);
        active.status = VehicleStatus::Active;
        active.capacity = 90;
        let mut idle = test_vehicle("v2", None);
        idle.capacity = 40;

        let snapshot = NetworkSnapshot {
            depots: vec![test_depot("D1"), test_depot("D2")],
            vehicles: vec![active, idle],
            parkings: vec![parked("v1", "D1"), parked("v2", "D1")],
            ..Default::default()
        };

        let occupancy = average_occupancy_by_depot(&snapshot);
        assert_eq!(occupancy.len(), 1);
        assert_eq!(occupancy[0].depot_id, "D1");
        assert_eq!(occupancy[0].parked_count, 2);
        assert_eq!(occupancy[0].avg_occupancy, 45.0);
    }

    #[test]
    fn test_groupings() {
        let snapshot = NetworkSnapshot {
            stops: vec![test_stop("B", "Z2"), test_stop("C", "Z1"), test_stop("A", "Z1")],
            depots: vec![test_depot("D1")],
            vehicles: vec![test_vehicle("v2", None), test_vehicle("v1", None)],
            parkings: vec![parked("v2", "D1"), parked("v1", "D1")],
            ..Default::default()
        };

        let zones = stops_by_zone(&snapshot);
        let z1: Vec<&str> = zones["Z1"].iter().map(|s| s.id.as_str()).collect();
        assert_eq!(z1, vec!["A", "C"]);
        assert_eq!(zones["Z2"].len(), 1);

        let depots = vehicles_by_depot(&snapshot);
        let parked_here: Vec<&str> = depots["Depot D1"]
            .iter()
            .map(|v| v.vehicle_uuid.as_str())
            .collect();
        assert_eq!(parked_here, vec!["v1", "v2"]);
    }

    #[test]
    fn test_top_connected_stops_by_degree() {
        let snapshot = NetworkSnapshot {
            stops: vec![
                test_stop("A", "Z1"),
                test_stop("B", "Z1"),
                test_stop("C", "Z1"),
                test_stop("LONELY", "Z1"),
            ],
            next_edges: vec![test_next("A", "B", 1), test_next("B", "C", 1), test_next("C", "B", 1)],
            ..Default::default()
        };
        let graph = extract_stop_graph(&snapshot);

        let ranked = top_connected_stops(&graph, &snapshot, 10);
        let ids: Vec<(&str, usize)> = ranked
            .iter()
            .map(|s| (s.stop_id.as_str(), s.degree))
            .collect();
        assert_eq!(ids, vec![("B", 3), ("C", 2), ("A", 1)]);
        assert_eq!(top_connected_stops(&graph, &snapshot, 1).len(), 1);
    }
}
