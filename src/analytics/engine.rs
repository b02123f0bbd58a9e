//! Analytics engine: the read-only query surface.
//!
//! The `AnalyticsEngine` trait is the single entry point for analytics
//! consumers (CLI, report assembly). Each call takes one store snapshot and
//! aggregates it, so a result is internally consistent even while writers
//! are active. The trait also enables mocking in downstream consumer tests.

use crate::error::Result;
use crate::network::extract_stop_graph;
use crate::store::{GraphStore, StopNode};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::algorithms;
use super::models::{ConnectedStop, DepotIdleStat, DepotOccupancy, TopPair, VehicleSummary};

// ============================================================================
// Trait
// ============================================================================

/// Analytics engine trait for read-only aggregation queries.
///
/// Consumers use `Arc<dyn AnalyticsEngine>` for dependency injection.
/// Empty networks produce empty results, never errors.
#[async_trait]
pub trait AnalyticsEngine: Send + Sync {
    /// NEXT pairs ranked by the number of lines serving both stops.
    async fn top_pairs(&self, limit: usize) -> Result<Vec<TopPair>>;

    /// Depots ranked by idle parked vehicles, with mean time since last seen.
    async fn depots_idle_stats(&self, limit: usize) -> Result<Vec<DepotIdleStat>>;

    /// Capacity in active service per depot (a proxy metric, not passengers).
    async fn average_occupancy_by_depot(&self) -> Result<Vec<DepotOccupancy>>;

    /// Parked vehicles keyed by depot name.
    async fn vehicles_by_depot(&self) -> Result<BTreeMap<String, Vec<VehicleSummary>>>;

    /// Stops keyed by zone.
    async fn stops_by_zone(&self) -> Result<BTreeMap<String, Vec<StopNode>>>;

    /// Stops ranked by NEXT degree.
    async fn top_connected_stops(&self, limit: usize) -> Result<Vec<ConnectedStop>>;
}

// ============================================================================
// Concrete implementation
// ============================================================================

/// Analytics engine backed by a `GraphStore`.
pub struct GraphAnalyticsEngine {
    store: Arc<dyn GraphStore>,
}

impl GraphAnalyticsEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AnalyticsEngine for GraphAnalyticsEngine {
    async fn top_pairs(&self, limit: usize) -> Result<Vec<TopPair>> {
        let snapshot = self.store.snapshot().await?;
        Ok(algorithms::top_pairs(&snapshot, limit))
    }

    async fn depots_idle_stats(&self, limit: usize) -> Result<Vec<DepotIdleStat>> {
        let snapshot = self.store.snapshot().await?;
        Ok(algorithms::depots_idle_stats(&snapshot, limit, Utc::now()))
    }

    async fn average_occupancy_by_depot(&self) -> Result<Vec<DepotOccupancy>> {
        let snapshot = self.store.snapshot().await?;
        Ok(algorithms::average_occupancy_by_depot(&snapshot))
    }

    async fn vehicles_by_depot(&self) -> Result<BTreeMap<String, Vec<VehicleSummary>>> {
        let snapshot = self.store.snapshot().await?;
        Ok(algorithms::vehicles_by_depot(&snapshot))
    }

    async fn stops_by_zone(&self) -> Result<BTreeMap<String, Vec<StopNode>>> {
        let snapshot = self.store.snapshot().await?;
        Ok(algorithms::stops_by_zone(&snapshot))
    }

    async fn top_connected_stops(&self, limit: usize) -> Result<Vec<ConnectedStop>> {
        let snapshot = self.store.snapshot().await?;
        let graph = extract_stop_graph(&snapshot);
        Ok(algorithms::top_connected_stops(&graph, &snapshot, limit))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryGraphStore, ParkedAtEdge, ServesEdge};
    use crate::test_helpers::*;

    #[tokio::test]
    async fn test_empty_store_yields_empty_results() {
        let engine = GraphAnalyticsEngine::new(Arc::new(MemoryGraphStore::new()));
        assert!(engine.top_pairs(5).await.unwrap().is_empty());
        assert!(engine.depots_idle_stats(5).await.unwrap().is_empty());
        assert!(engine.average_occupancy_by_depot().await.unwrap().is_empty());
        assert!(engine.vehicles_by_depot().await.unwrap().is_empty());
        assert!(engine.stops_by_zone().await.unwrap().is_empty());
        assert!(engine.top_connected_stops(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_pairs_through_store() {
        let store = MemoryGraphStore::new();
        for id in ["A", "B"] {
            store.create_stop(&test_stop(id, "Z1")).await.unwrap();
        }
        for line in ["L1", "L2"] {
            store.create_line(&test_line(line)).await.unwrap();
            store.create_serves(&ServesEdge::new(line, "A", 1)).await.unwrap();
            store.create_serves(&ServesEdge::new(line, "B", 2)).await.unwrap();
        }
        store.create_next(&test_next("A", "B", 5)).await.unwrap();

        let engine = GraphAnalyticsEngine::new(Arc::new(store));
        let pairs = engine.top_pairs(1).await.unwrap();
        assert_eq!(
            pairs,
            vec![TopPair {
                from: "A".into(),
                to: "B".into(),
                lines: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_parked_active_vehicle_is_not_idle() {
        let store = MemoryGraphStore::new();
        store.create_depot(&test_depot("D1")).await.unwrap();
        store.create_line(&test_line("L1")).await.unwrap();
        let mut v = test_vehicle("v1", Some((0.0, 0.0)));
        v.last_seen_ts = Some(Utc::now());
        store.create_vehicle(&v).await.unwrap();
        store
            .create_parked_at(&ParkedAtEdge {
                vehicle_uuid: "v1".into(),
                depot_id: "D1".into(),
                since: Utc::now(),
            })
            .await
            .unwrap();

        let store: Arc<dyn GraphStore> = Arc::new(store);
        let engine = GraphAnalyticsEngine::new(store.clone());
        assert_eq!(engine.depots_idle_stats(5).await.unwrap().len(), 1);

        // Going into service leaves the PARKED_AT edge but flips the status
        store
            .update_vehicle(
                "v1",
                &crate::store::UpdateVehicleRequest {
                    status: Some(crate::store::VehicleStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(engine.depots_idle_stats(5).await.unwrap().is_empty());

        let occupancy = engine.average_occupancy_by_depot().await.unwrap();
        assert_eq!(occupancy[0].avg_occupancy, f64::from(v.capacity));
    }
}
