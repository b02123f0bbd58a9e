//! Test helper factories
//!
//! Convenience constructors for network entities with sensible defaults.
#![allow(dead_code)]

use crate::store::*;

// ============================================================================
// Entity factories
// ============================================================================

/// Stop named "Stop {id}" in the given zone, positioned at (45.0, 9.0)
pub fn test_stop(id: &str, zone: &str) -> StopNode {
    StopNode::new(id, format!("Stop {}", id), 45.0, 9.0, zone, false)
}

/// Active bus line named "Line {id}"
pub fn test_line(id: &str) -> LineNode {
    LineNode::new(id, format!("Line {}", id), "bus", 10)
}

/// Idle vehicle with a fixed uuid and an optional (lat, lon) position
pub fn test_vehicle(uuid: &str, position: Option<(f64, f64)>) -> VehicleNode {
    let mut vehicle = VehicleNode::new(format!("V-{}", uuid), 50);
    vehicle.vehicle_uuid = uuid.to_string();
    if let Some((lat, lon)) = position {
        vehicle.last_known_lat = Some(lat);
        vehicle.last_known_lon = Some(lon);
    }
    vehicle
}

/// Depot named "Depot {id}"
pub fn test_depot(id: &str) -> DepotNode {
    DepotNode::new(id, format!("Depot {}", id), 45.0, 9.0, 20)
}

/// NEXT edge with a travel time and no distance
pub fn test_next(from: &str, to: &str, travel_time: i32) -> NextEdge {
    NextEdge::new(from, to, Some(travel_time), None)
}
