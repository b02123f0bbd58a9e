//! Analytics result records.

use crate::store::{VehicleNode, VehicleStatus};
use serde::{Deserialize, Serialize};

/// A NEXT-connected stop pair and how many lines serve both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPair {
    pub from: String,
    pub to: String,
    /// Distinct lines with SERVES edges to both stops
    pub lines: usize,
}

/// Idle vehicles parked at a depot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepotIdleStat {
    pub depot_id: String,
    pub depot_name: String,
    /// IDLE vehicles with a known `last_seen_ts`
    pub parked_count: usize,
    /// Mean time since `last_seen_ts`, in milliseconds
    pub avg_idle_ms: f64,
}

/// Capacity in active service among the vehicles parked at a depot.
///
/// `avg_occupancy` averages `capacity` for ACTIVE vehicles and 0 for the
/// rest. It is a proxy for how much of the depot's fleet capacity is out on
/// lines, not a passenger count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepotOccupancy {
    pub depot_id: String,
    pub depot_name: String,
    pub parked_count: usize,
    pub avg_occupancy: f64,
}

/// Vehicle projection used in depot listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub vehicle_uuid: String,
    pub id: String,
    pub status: VehicleStatus,
    pub capacity: i32,
}

impl From<&VehicleNode> for VehicleSummary {
    fn from(v: &VehicleNode) -> Self {
        Self {
            vehicle_uuid: v.vehicle_uuid.clone(),
            id: v.id.clone(),
            status: v.status,
            capacity: v.capacity,
        }
    }
}

/// A stop ranked by NEXT degree (incoming + outgoing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedStop {
    pub stop_id: String,
    pub stop_name: String,
    pub degree: usize,
}
