//! End-to-end tests over the public API with the in-memory store.
//!
//! Run with: cargo test --test network_tests

use std::collections::HashSet;
use std::sync::Arc;
use transit_graph::analytics::report::RouteQuery;
use transit_graph::analytics::ReportRequest;
use transit_graph::error::GraphError;
use transit_graph::seed::NetworkSeed;
use transit_graph::store::*;
use transit_graph::{AppState, Config, StoreBackend};

const NETWORK: &str = r#"
stops:
  - { id: S1, name: Central, lat: 0.0, lon: 0.0, zone: A, shelter: true }
  - { id: S2, name: Market, lat: 0.0, lon: 1.0, zone: A }
  - { id: S3, name: Harbour, lat: 0.0, lon: 2.0, zone: B }
  - { id: S4, name: Airport, lat: 0.0, lon: 3.0, zone: C }
lines:
  - { id: L1, name: Red, mode: bus, frequency_mins: 10 }
  - { id: L2, name: Blue, mode: tram, frequency_mins: 6 }
vehicles:
  - { vehicle_uuid: v1, id: BUS-1, capacity: 60, last_known_lat: 0.0, last_known_lon: 0.5, last_seen_ts: "2026-01-01T08:00:00Z" }
  - { vehicle_uuid: v2, id: BUS-2, capacity: 60, last_known_lat: 5.0, last_known_lon: 5.0, last_seen_ts: "2026-01-01T08:00:00Z" }
  - { vehicle_uuid: v3, id: BUS-3, capacity: 40 }
depots:
  - { id: D1, name: North, lat: 1.0, lon: 0.0, capacity: 10 }
  - { id: D2, name: South, lat: -1.0, lon: 0.0, capacity: 10 }
next:
  - { from_id: S1, to_id: S2, travel_time: 100 }
  - { from_id: S2, to_id: S3, travel_time: 100 }
  - { from_id: S3, to_id: S4, travel_time: 100 }
  - { from_id: S1, to_id: S3, travel_time: 500 }
serves:
  - { line_id: L1, stop_id: S1, order: 1 }
  - { line_id: L1, stop_id: S2, order: 2 }
  - { line_id: L1, stop_id: S3, order: 3 }
  - { line_id: L2, stop_id: S2, order: 1 }
  - { line_id: L2, stop_id: S3, order: 2 }
parkings:
  - { vehicle_uuid: v1, depot_id: D1 }
  - { vehicle_uuid: v2, depot_id: D1 }
  - { vehicle_uuid: v3, depot_id: D2 }
"#;

fn memory_config() -> Config {
    Config {
        store_backend: StoreBackend::Memory,
        seed_path: None,
        neo4j_uri: String::new(),
        neo4j_user: String::new(),
        neo4j_password: String::new(),
    }
}

async fn seeded_state() -> AppState {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
    NetworkSeed::from_yaml_str(NETWORK)
        .unwrap()
        .apply(store.as_ref())
        .await
        .unwrap();
    AppState::with_store(store, memory_config())
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_shortest_path_prefers_fewest_hops() {
    let state = seeded_state().await;

    // S1 -> S3 directly is slower but one hop
    let path = state.paths.shortest_path("S1", "S4", 5).await.unwrap();
    assert_eq!(path.stop_ids, vec!["S1", "S3", "S4"]);
    assert_eq!(path.hops, 2);

    let err = state.paths.shortest_path("S1", "S4", 1).await.unwrap_err();
    assert!(matches!(err, GraphError::NoPathFound { max_hops: 1, .. }));

    let err = state.paths.shortest_path("S4", "S1", 5).await.unwrap_err();
    assert!(matches!(err, GraphError::NoPathFound { .. }));
}

#[tokio::test]
async fn test_deleted_stop_breaks_routes() {
    let state = seeded_state().await;
    state.store.delete_stop("S3").await.unwrap();

    let err = state.store.get_next("S2", "S3").await.unwrap_err();
    assert!(matches!(err, GraphError::NotFound { .. }));
    let err = state.paths.shortest_path("S1", "S4", 5).await.unwrap_err();
    assert!(matches!(err, GraphError::NoPathFound { .. }));
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_dispatch_picks_nearest_and_activates_it() {
    let state = seeded_state().await;

    let assignment = state.dispatch.assign_nearest_idle_vehicle("L1").await.unwrap();
    assert_eq!(assignment.vehicle.vehicle_uuid, "v1");
    assert_eq!(assignment.vehicle.status, VehicleStatus::Active);

    let stored = state.store.get_vehicle("v1").await.unwrap();
    assert_eq!(stored.status, VehicleStatus::Active);
    let edge = state.store.get_assigned_to("v1", "L1").await.unwrap();
    assert_eq!(edge.since, assignment.since);

    // v3 has no position, so only v2 is left
    let next = state.dispatch.assign_nearest_idle_vehicle("L1").await.unwrap();
    assert_eq!(next.vehicle.vehicle_uuid, "v2");
    let err = state
        .dispatch
        .assign_nearest_idle_vehicle("L1")
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::NoIdleVehicleAvailable(_)));
}

#[tokio::test]
async fn test_dispatch_without_origin_stop() {
    let state = seeded_state().await;
    state.store.delete_serves("L1", "S1").await.unwrap();

    let err = state
        .dispatch
        .assign_nearest_idle_vehicle("L1")
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::NoOriginStop(_)));
    // Nothing was written
    assert_eq!(
        state.store.get_vehicle("v1").await.unwrap().status,
        VehicleStatus::Idle
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_never_double_assigns() {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
    store
        .create_stop(&StopNode::new("O", "Origin", 0.0, 0.0, "A", false))
        .await
        .unwrap();
    store
        .create_line(&LineNode::new("L1", "Red", "bus", 5))
        .await
        .unwrap();
    store
        .create_serves(&ServesEdge::new("L1", "O", 1))
        .await
        .unwrap();

    const VEHICLES: usize = 3;
    const CALLERS: usize = 10;
    for i in 0..VEHICLES {
        let mut v = VehicleNode::new(format!("BUS-{}", i), 50);
        v.last_known_lat = Some(i as f64);
        v.last_known_lon = Some(0.0);
        store.create_vehicle(&v).await.unwrap();
    }

    let state = AppState::with_store(store.clone(), memory_config());
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let dispatch = state.dispatch.clone();
            tokio::spawn(async move { dispatch.assign_nearest_idle_vehicle("L1").await })
        })
        .collect();

    let mut assigned = HashSet::new();
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(a) => assert!(assigned.insert(a.vehicle.vehicle_uuid)),
            Err(GraphError::NoIdleVehicleAvailable(_)) => exhausted += 1,
            Err(other) => panic!("unexpected dispatch error: {other}"),
        }
    }

    assert_eq!(assigned.len(), VEHICLES);
    assert_eq!(exhausted, CALLERS - VEHICLES);
    for v in store.list_vehicles().await.unwrap() {
        assert_eq!(v.status, VehicleStatus::Active);
    }
}

// ============================================================================
// Recalibration
// ============================================================================

#[tokio::test]
async fn test_recalibration_threshold_end_to_end() {
    let state = seeded_state().await;

    let outcome = state
        .calibration
        .recalibrate_next("S1", "S2", 120)
        .await
        .unwrap();
    assert!(!outcome.updated);

    let outcome = state
        .calibration
        .recalibrate_next("S1", "S2", 121)
        .await
        .unwrap();
    assert!(outcome.updated);
    assert_eq!(outcome.calibration_count, 1);
    assert_eq!(
        state.store.get_next("S1", "S2").await.unwrap().travel_time,
        Some(121)
    );

    let err = state
        .calibration
        .recalibrate_next("S2", "S1", 500)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::EdgeNotFound { .. }));
}

// ============================================================================
// Analytics and reports
// ============================================================================

#[tokio::test]
async fn test_analytics_over_seeded_network() {
    let state = seeded_state().await;

    let pairs = state.analytics.top_pairs(1).await.unwrap();
    assert_eq!((pairs[0].from.as_str(), pairs[0].to.as_str()), ("S2", "S3"));
    assert_eq!(pairs[0].lines, 2);

    // v3 has no last_seen_ts, so D2 has nothing to average
    let idle = state.analytics.depots_idle_stats(10).await.unwrap();
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0].depot_id, "D1");
    assert_eq!(idle[0].parked_count, 2);
    assert!(idle[0].avg_idle_ms > 0.0);

    state.dispatch.assign_nearest_idle_vehicle("L1").await.unwrap();
    let occupancy = state.analytics.average_occupancy_by_depot().await.unwrap();
    let d1 = occupancy.iter().find(|o| o.depot_id == "D1").unwrap();
    assert_eq!(d1.avg_occupancy, 30.0);
    let d2 = occupancy.iter().find(|o| o.depot_id == "D2").unwrap();
    assert_eq!(d2.avg_occupancy, 0.0);
}

#[tokio::test]
async fn test_report_collects_every_section() {
    let state = seeded_state().await;
    let request = ReportRequest {
        top_stops_limit: 2,
        route: Some(RouteQuery {
            start_id: "S1".into(),
            end_id: "S4".into(),
            max_hops: 5,
        }),
    };

    let report = state.reports.build(&request).await.unwrap();
    assert_eq!(report.vehicles_by_depot["North"].len(), 2);
    assert_eq!(report.vehicles_by_depot["South"].len(), 1);
    assert_eq!(report.stops_by_zone["A"].len(), 2);
    assert_eq!(report.top_connected_stops.len(), 2);
    assert_eq!(report.route.unwrap().hops, 2);

    let json = serde_json::to_value(&state.reports.build(&ReportRequest::default()).await.unwrap())
        .unwrap();
    assert!(json["route"].is_null());
}
