//! Nearest-idle-vehicle dispatch.
//!
//! Distance is the squared planar distance between raw lat/lon degrees. This
//! is a flat-earth approximation, not a geodesic distance: it only ranks
//! candidates, and it ranks them well enough at city scale.

use crate::error::{require_id, Result};
use crate::store::{Assignment, Coordinates, GraphStore, VehicleNode};
use std::sync::Arc;

/// `(vlat - olat)² + (vlon - olon)²`
pub fn squared_distance(a: Coordinates, b: Coordinates) -> f64 {
    let dlat = a.lat - b.lat;
    let dlon = a.lon - b.lon;
    dlat * dlat + dlon * dlon
}

/// Pick the IDLE vehicle with a known position closest to `origin`.
///
/// Ties on distance go to the lowest `vehicle_uuid`.
pub fn nearest_idle(origin: Coordinates, candidates: &[VehicleNode]) -> Option<String> {
    candidates
        .iter()
        .filter(|v| v.is_idle())
        .filter_map(|v| v.position().map(|p| (squared_distance(p, origin), v)))
        .min_by(|(da, a), (db, b)| {
            da.total_cmp(db)
                .then_with(|| a.vehicle_uuid.cmp(&b.vehicle_uuid))
        })
        .map(|(_, v)| v.vehicle_uuid.clone())
}

/// Assigns vehicles to lines.
pub struct DispatchPlanner {
    store: Arc<dyn GraphStore>,
}

impl DispatchPlanner {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Assign the idle vehicle nearest to the line's origin stop.
    ///
    /// Selection and the ASSIGNED_TO write happen in one store transaction,
    /// so concurrent calls never hand out the same vehicle twice. Fails with
    /// `NoOriginStop` when the line has no SERVES edge with order 1 (an
    /// unknown line included) and `NoIdleVehicleAvailable` when nothing is
    /// eligible.
    pub async fn assign_nearest_idle_vehicle(&self, line_id: &str) -> Result<Assignment> {
        require_id("Line", line_id)?;

        let assignment = self
            .store
            .assign_vehicle_atomically(line_id, &nearest_idle)
            .await?;

        tracing::info!(
            line_id,
            vehicle_uuid = %assignment.vehicle.vehicle_uuid,
            vehicle_id = %assignment.vehicle.id,
            "Assigned nearest idle vehicle"
        );

        Ok(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::store::{MemoryGraphStore, ServesEdge, VehicleStatus};
    use crate::test_helpers::{test_line, test_stop, test_vehicle};

    fn at(lat: f64, lon: f64) -> Coordinates {
        Coordinates { lat, lon }
    }

    /// Line L1 whose origin stop sits at (0, 0)
    async fn line_with_origin() -> MemoryGraphStore {
        let store = MemoryGraphStore::new();
        store.create_line(&test_line("L1")).await.unwrap();
        let mut origin = test_stop("O", "Z1");
        origin.lat = 0.0;
        origin.lon = 0.0;
        store.create_stop(&origin).await.unwrap();
        store.create_stop(&test_stop("S2", "Z1")).await.unwrap();
        store.create_serves(&ServesEdge::new("L1", "O", 1)).await.unwrap();
        store.create_serves(&ServesEdge::new("L1", "S2", 2)).await.unwrap();
        store
    }

    #[test]
    fn test_squared_distance() {
        assert_eq!(squared_distance(at(0.0, 0.0), at(3.0, 4.0)), 25.0);
    }

    #[test]
    fn test_nearest_idle_skips_active_and_unpositioned() {
        let mut active = test_vehicle("v-active", Some((0.0, 0.0)));
        active.status = VehicleStatus::Active;
        let candidates = vec![
            active,
            test_vehicle("v-nowhere", None),
            test_vehicle("v-far", Some((5.0, 5.0))),
            test_vehicle("v-near", Some((1.0, 1.0))),
        ];
        assert_eq!(
            nearest_idle(at(0.0, 0.0), &candidates).as_deref(),
            Some("v-near")
        );
        assert_eq!(nearest_idle(at(0.0, 0.0), &[]), None);
    }

    #[test]
    fn test_nearest_idle_breaks_ties_on_lowest_uuid() {
        let candidates = vec![
            test_vehicle("v-b", Some((1.0, 0.0))),
            test_vehicle("v-a", Some((0.0, 1.0))),
            test_vehicle("v-c", Some((-1.0, 0.0))),
        ];
        assert_eq!(
            nearest_idle(at(0.0, 0.0), &candidates).as_deref(),
            Some("v-a")
        );
    }

    #[tokio::test]
    async fn test_assign_marks_vehicle_active_and_links_line() {
        let store = line_with_origin().await;
        store
            .create_vehicle(&test_vehicle("v-far", Some((3.0, 3.0))))
            .await
            .unwrap();
        store
            .create_vehicle(&test_vehicle("v-near", Some((0.5, 0.5))))
            .await
            .unwrap();
        let store: Arc<dyn GraphStore> = Arc::new(store);

        let planner = DispatchPlanner::new(store.clone());
        let assignment = planner.assign_nearest_idle_vehicle("L1").await.unwrap();

        assert_eq!(assignment.vehicle.vehicle_uuid, "v-near");
        assert_eq!(assignment.vehicle.status, VehicleStatus::Active);
        assert_eq!(
            store.get_vehicle("v-near").await.unwrap().status,
            VehicleStatus::Active
        );
        let edge = store.get_assigned_to("v-near", "L1").await.unwrap();
        assert_eq!(edge.since, assignment.since);

        // v-near is no longer idle
        let second = planner.assign_nearest_idle_vehicle("L1").await.unwrap();
        assert_eq!(second.vehicle.vehicle_uuid, "v-far");

        let err = planner.assign_nearest_idle_vehicle("L1").await.unwrap_err();
        assert!(matches!(err, GraphError::NoIdleVehicleAvailable(_)));
    }

    #[tokio::test]
    async fn test_assign_requires_origin_stop() {
        let store = MemoryGraphStore::new();
        store.create_line(&test_line("L1")).await.unwrap();
        store.create_stop(&test_stop("S2", "Z1")).await.unwrap();
        store.create_serves(&ServesEdge::new("L1", "S2", 2)).await.unwrap();
        store
            .create_vehicle(&test_vehicle("v1", Some((0.0, 0.0))))
            .await
            .unwrap();

        let planner = DispatchPlanner::new(Arc::new(store));
        let err = planner.assign_nearest_idle_vehicle("L1").await.unwrap_err();
        assert!(matches!(err, GraphError::NoOriginStop(ref id) if id == "L1"));

        let err = planner.assign_nearest_idle_vehicle("").await.unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_failed_dispatch_writes_nothing() {
        let store = line_with_origin().await;
        store.create_vehicle(&test_vehicle("v1", None)).await.unwrap();
        let store: Arc<dyn GraphStore> = Arc::new(store);

        let planner = DispatchPlanner::new(store.clone());
        let err = planner.assign_nearest_idle_vehicle("L1").await.unwrap_err();
        assert!(matches!(err, GraphError::NoIdleVehicleAvailable(_)));

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.assignments.is_empty());
        assert!(snapshot.vehicles.iter().all(|v| v.is_idle()));
    }
}
