//! GraphStore trait definition
//!
//! Defines the contract a graph-capable store must satisfy: CRUD for the four
//! node types and four relationship types with referential-integrity checks,
//! a consistent whole-network snapshot for read-only consumers, and two
//! transactional primitives for the read-decide-write operations (dispatch
//! and NEXT recalibration).
//!
//! Both `MemoryGraphStore` and `Neo4jClient` implement it, so the routing,
//! dispatch and analytics layers only ever see `Arc<dyn GraphStore>`.

use crate::error::{GraphError, Result};
use crate::store::models::*;
use async_trait::async_trait;

/// Picks one vehicle (by `vehicle_uuid`) among IDLE candidates with a known
/// position, given the line's origin. `None` means nothing is eligible.
pub type VehicleSelector = dyn Fn(Coordinates, &[VehicleNode]) -> Option<String> + Send + Sync;

/// Decides, from the current NEXT edge, what to write. `Ok(None)` leaves the
/// edge untouched; an `Err` aborts without writing.
pub type NextEdgeDecision =
    dyn Fn(&NextEdge) -> Result<Option<UpdateNextRequest>> + Send + Sync;

/// Result of [`GraphStore::update_next_if`]
#[derive(Debug, Clone, PartialEq)]
pub struct NextEdgeUpdate {
    /// The edge as stored after the call
    pub edge: NextEdge,
    /// Whether the decision produced a write
    pub applied: bool,
}

/// Abstract interface for all graph operations.
///
/// Node deletes are detach-deletes and idempotent. Relationship creation fails
/// with `EndpointNotFound` (writing nothing) when either endpoint is missing.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Stop operations
    // ========================================================================

    /// Create a stop; `AlreadyExists` if the id is taken
    async fn create_stop(&self, stop: &StopNode) -> Result<()>;

    /// Get a stop by id
    async fn get_stop(&self, id: &str) -> Result<StopNode>;

    /// Merge the supplied fields into a stop, returning the stored result
    async fn update_stop(&self, id: &str, update: &UpdateStopRequest) -> Result<StopNode>;

    /// Detach-delete a stop (no-op when absent)
    async fn delete_stop(&self, id: &str) -> Result<()>;

    /// All stops, ordered by id
    async fn list_stops(&self) -> Result<Vec<StopNode>>;

    // ========================================================================
    // Line operations
    // ========================================================================

    async fn create_line(&self, line: &LineNode) -> Result<()>;

    async fn get_line(&self, id: &str) -> Result<LineNode>;

    async fn update_line(&self, id: &str, update: &UpdateLineRequest) -> Result<LineNode>;

    async fn delete_line(&self, id: &str) -> Result<()>;

    async fn list_lines(&self) -> Result<Vec<LineNode>>;

    // ========================================================================
    // Vehicle operations (keyed by vehicle_uuid)
    // ========================================================================

    async fn create_vehicle(&self, vehicle: &VehicleNode) -> Result<()>;

    async fn get_vehicle(&self, vehicle_uuid: &str) -> Result<VehicleNode>;

    async fn update_vehicle(
        &self,
        vehicle_uuid: &str,
        update: &UpdateVehicleRequest,
    ) -> Result<VehicleNode>;

    async fn delete_vehicle(&self, vehicle_uuid: &str) -> Result<()>;

    async fn list_vehicles(&self) -> Result<Vec<VehicleNode>>;

    // ========================================================================
    // Depot operations
    // ========================================================================

    async fn create_depot(&self, depot: &DepotNode) -> Result<()>;

    async fn get_depot(&self, id: &str) -> Result<DepotNode>;

    async fn update_depot(&self, id: &str, update: &UpdateDepotRequest) -> Result<DepotNode>;

    async fn delete_depot(&self, id: &str) -> Result<()>;

    async fn list_depots(&self) -> Result<Vec<DepotNode>>;

    // ========================================================================
    // NEXT (Stop -> Stop)
    // ========================================================================

    /// Create a NEXT edge; unique per (from, to)
    async fn create_next(&self, edge: &NextEdge) -> Result<()>;

    async fn get_next(&self, from_id: &str, to_id: &str) -> Result<NextEdge>;

    async fn update_next(
        &self,
        from_id: &str,
        to_id: &str,
        update: &UpdateNextRequest,
    ) -> Result<NextEdge>;

    async fn delete_next(&self, from_id: &str, to_id: &str) -> Result<()>;

    // ========================================================================
    // SERVES (Line -> Stop)
    // ========================================================================

    /// Create a SERVES edge; unique per (line, stop)
    async fn create_serves(&self, edge: &ServesEdge) -> Result<()>;

    async fn get_serves(&self, line_id: &str, stop_id: &str) -> Result<ServesEdge>;

    async fn update_serves(
        &self,
        line_id: &str,
        stop_id: &str,
        update: &UpdateServesRequest,
    ) -> Result<ServesEdge>;

    async fn delete_serves(&self, line_id: &str, stop_id: &str) -> Result<()>;

    /// SERVES edges of a line sorted by `order` (then stop id)
    async fn list_line_stops(&self, line_id: &str) -> Result<Vec<ServesEdge>>;

    // ========================================================================
    // ASSIGNED_TO (Vehicle -> Line)
    // ========================================================================

    /// Append an ASSIGNED_TO edge and set the vehicle ACTIVE
    async fn create_assigned_to(&self, edge: &AssignedToEdge) -> Result<()>;

    /// Most recent (greatest `since`) ASSIGNED_TO between the pair
    async fn get_assigned_to(&self, vehicle_uuid: &str, line_id: &str) -> Result<AssignedToEdge>;

    async fn update_assigned_to(
        &self,
        vehicle_uuid: &str,
        line_id: &str,
        update: &UpdateSinceRequest,
    ) -> Result<AssignedToEdge>;

    /// Remove every ASSIGNED_TO between the pair; status is left as is
    async fn delete_assigned_to(&self, vehicle_uuid: &str, line_id: &str) -> Result<()>;

    // ========================================================================
    // PARKED_AT (Vehicle -> Depot)
    // ========================================================================

    /// Append a PARKED_AT edge and set the vehicle IDLE
    async fn create_parked_at(&self, edge: &ParkedAtEdge) -> Result<()>;

    /// Most recent (greatest `since`) PARKED_AT between the pair
    async fn get_parked_at(&self, vehicle_uuid: &str, depot_id: &str) -> Result<ParkedAtEdge>;

    async fn update_parked_at(
        &self,
        vehicle_uuid: &str,
        depot_id: &str,
        update: &UpdateSinceRequest,
    ) -> Result<ParkedAtEdge>;

    async fn delete_parked_at(&self, vehicle_uuid: &str, depot_id: &str) -> Result<()>;

    // ========================================================================
    // Snapshot & transactional primitives
    // ========================================================================

    /// Every node and relationship, read in one consistent pass
    async fn snapshot(&self) -> Result<NetworkSnapshot>;

    /// Dispatch transaction.
    ///
    /// Atomically: resolve the origin stop of `line_id` (SERVES order 1,
    /// else `NoOriginStop`), collect IDLE vehicles with both coordinates set,
    /// let `select` pick one (`None` -> `NoIdleVehicleAvailable`), then create
    /// ASSIGNED_TO(vehicle -> line, since = now) and set the vehicle ACTIVE.
    /// No other dispatch can observe the chosen vehicle as IDLE afterwards.
    async fn assign_vehicle_atomically(
        &self,
        line_id: &str,
        select: &VehicleSelector,
    ) -> Result<Assignment>;

    /// Compare-and-set on one NEXT edge.
    ///
    /// Reads the edge (missing -> `EdgeNotFound`), runs `decide` on it and
    /// applies the returned update, all without another writer interleaving
    /// on the same edge.
    async fn update_next_if(
        &self,
        from_id: &str,
        to_id: &str,
        decide: &NextEdgeDecision,
    ) -> Result<NextEdgeUpdate>;

    // ========================================================================
    // Type-generic relationship entry points
    // ========================================================================

    /// Create any relationship
    async fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        match relationship {
            Relationship::Next(e) => self.create_next(e).await,
            Relationship::Serves(e) => self.create_serves(e).await,
            Relationship::AssignedTo(e) => self.create_assigned_to(e).await,
            Relationship::ParkedAt(e) => self.create_parked_at(e).await,
        }
    }

    /// Get any relationship by its (type, from, to) key
    async fn get_relationship(&self, key: &RelationshipKey) -> Result<Relationship> {
        let (from, to) = (key.from_id.as_str(), key.to_id.as_str());
        Ok(match key.rel_type {
            RelationshipType::Next => Relationship::Next(self.get_next(from, to).await?),
            RelationshipType::Serves => Relationship::Serves(self.get_serves(from, to).await?),
            RelationshipType::AssignedTo => {
                Relationship::AssignedTo(self.get_assigned_to(from, to).await?)
            }
            RelationshipType::ParkedAt => {
                Relationship::ParkedAt(self.get_parked_at(from, to).await?)
            }
        })
    }

    /// Merge a partial update into any relationship
    async fn update_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        update: &RelationshipUpdate,
    ) -> Result<Relationship> {
        Ok(match update {
            RelationshipUpdate::Next(u) => {
                Relationship::Next(self.update_next(from_id, to_id, u).await?)
            }
            RelationshipUpdate::Serves(u) => {
                Relationship::Serves(self.update_serves(from_id, to_id, u).await?)
            }
            RelationshipUpdate::AssignedTo(u) => {
                Relationship::AssignedTo(self.update_assigned_to(from_id, to_id, u).await?)
            }
            RelationshipUpdate::ParkedAt(u) => {
                Relationship::ParkedAt(self.update_parked_at(from_id, to_id, u).await?)
            }
        })
    }

    /// Delete any relationship (no-op when absent)
    async fn delete_relationship(&self, key: &RelationshipKey) -> Result<()> {
        let (from, to) = (key.from_id.as_str(), key.to_id.as_str());
        match key.rel_type {
            RelationshipType::Next => self.delete_next(from, to).await,
            RelationshipType::Serves => self.delete_serves(from, to).await,
            RelationshipType::AssignedTo => self.delete_assigned_to(from, to).await,
            RelationshipType::ParkedAt => self.delete_parked_at(from, to).await,
        }
    }
}

/// Validate both ends of a relationship key
pub(crate) fn require_endpoint_ids(rel_type: RelationshipType, from: &str, to: &str) -> Result<()> {
    let (from_kind, to_kind) = rel_type.endpoints();
    if from.trim().is_empty() || to.trim().is_empty() {
        return Err(GraphError::InvalidArgument(format!(
            "{} requires non-empty {} and {} ids",
            rel_type, from_kind, to_kind
        )));
    }
    Ok(())
}
