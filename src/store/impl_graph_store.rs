//! `GraphStore` implementation for `Neo4jClient`.
//!
//! Every method simply delegates to the corresponding inherent method on `Neo4jClient`.

use async_trait::async_trait;

use super::models::*;
use super::neo4j::Neo4jClient;
use super::traits::{GraphStore, NextEdgeDecision, NextEdgeUpdate, VehicleSelector};
use crate::error::Result;

#[async_trait]
impl GraphStore for Neo4jClient {
    // ========================================================================
    // Stop operations
    // ========================================================================

    async fn create_stop(&self, stop: &StopNode) -> Result<()> {
        self.create_stop(stop).await
    }

    async fn get_stop(&self, id: &str) -> Result<StopNode> {
        self.get_stop(id).await
    }

    async fn update_stop(&self, id: &str, update: &UpdateStopRequest) -> Result<StopNode> {
        self.update_stop(id, update).await
    }

    async fn delete_stop(&self, id: &str) -> Result<()> {
        self.delete_stop(id).await
    }

    async fn list_stops(&self) -> Result<Vec<StopNode>> {
        self.list_stops().await
    }

    // ========================================================================
    // Line operations
    // ========================================================================

    async fn create_line(&self, line: &LineNode) -> Result<()> {
        self.create_line(line).await
    }

    async fn get_line(&self, id: &str) -> Result<LineNode> {
        self.get_line(id).await
    }

    async fn update_line(&self, id: &str, update: &UpdateLineRequest) -> Result<LineNode> {
        self.update_line(id, update).await
    }

    async fn delete_line(&self, id: &str) -> Result<()> {
        self.delete_line(id).await
    }

    async fn list_lines(&self) -> Result<Vec<LineNode>> {
        self.list_lines().await
    }

    // ========================================================================
    // Vehicle operations (keyed by vehicle_uuid)
    // ========================================================================

    async fn create_vehicle(&self, vehicle: &VehicleNode) -> Result<()> {
        self.create_vehicle(vehicle).await
    }

    async fn get_vehicle(&self, vehicle_uuid: &str) -> Result<VehicleNode> {
        self.get_vehicle(vehicle_uuid).await
    }

    async fn update_vehicle(
        &self,
        vehicle_uuid: &str,
        update: &UpdateVehicleRequest,
    ) -> Result<VehicleNode> {
        self.update_vehicle(vehicle_uuid, update).await
    }

    async fn delete_vehicle(&self, vehicle_uuid: &str) -> Result<()> {
        self.delete_vehicle(vehicle_uuid).await
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleNode>> {
        self.list_vehicles().await
    }

    // ========================================================================
    // Depot operations
    // ========================================================================

    async fn create_depot(&self, depot: &DepotNode) -> Result<()> {
        self.create_depot(depot).await
    }

    async fn get_depot(&self, id: &str) -> Result<DepotNode> {
        self.get_depot(id).await
    }

    async fn update_depot(&self, id: &str, update: &UpdateDepotRequest) -> Result<DepotNode> {
        self.update_depot(id, update).await
    }

    async fn delete_depot(&self, id: &str) -> Result<()> {
        self.delete_depot(id).await
    }

    async fn list_depots(&self) -> Result<Vec<DepotNode>> {
        self.list_depots().await
    }

    // ========================================================================
    // NEXT (Stop -> Stop)
    // ========================================================================

    async fn create_next(&self, edge: &NextEdge) -> Result<()> {
        self.create_next(edge).await
    }

    async fn get_next(&self, from_id: &str, to_id: &str) -> Result<NextEdge> {
        self.get_next(from_id, to_id).await
    }

    async fn update_next(
        &self,
        from_id: &str,
        to_id: &str,
        update: &UpdateNextRequest,
    ) -> Result<NextEdge> {
        self.update_next(from_id, to_id, update).await
    }

    async fn delete_next(&self, from_id: &str, to_id: &str) -> Result<()> {
        self.delete_next(from_id, to_id).await
    }

    // ========================================================================
    // SERVES (Line -> Stop)
    // ========================================================================

    async fn create_serves(&self, edge: &ServesEdge) -> Result<()> {
        self.create_serves(edge).await
    }

    async fn get_serves(&self, line_id: &str, stop_id: &str) -> Result<ServesEdge> {
        self.get_serves(line_id, stop_id).await
    }

    async fn update_serves(
        &self,
        line_id: &str,
        stop_id: &str,
        update: &UpdateServesRequest,
    ) -> Result<ServesEdge> {
        self.update_serves(line_id, stop_id, update).await
    }

    async fn delete_serves(&self, line_id: &str, stop_id: &str) -> Result<()> {
        self.delete_serves(line_id, stop_id).await
    }

    async fn list_line_stops(&self, line_id: &str) -> Result<Vec<ServesEdge>> {
        self.list_line_stops(line_id).await
    }

    // ========================================================================
    // ASSIGNED_TO (Vehicle -> Line)
    // ========================================================================

    async fn create_assigned_to(&self, edge: &AssignedToEdge) -> Result<()> {
        self.create_assigned_to(edge).await
    }

    async fn get_assigned_to(&self, vehicle_uuid: &str, line_id: &str) -> Result<AssignedToEdge> {
        self.get_assigned_to(vehicle_uuid, line_id).await
    }

    async fn update_assigned_to(
        &self,
        vehicle_uuid: &str,
        line_id: &str,
        update: &UpdateSinceRequest,
    ) -> Result<AssignedToEdge> {
        self.update_assigned_to(vehicle_uuid, line_id, update).await
    }

    async fn delete_assigned_to(&self, vehicle_uuid: &str, line_id: &str) -> Result<()> {
        self.delete_assigned_to(vehicle_uuid, line_id).await
    }

    // ========================================================================
    // PARKED_AT (Vehicle -> Depot)
    // ========================================================================

    async fn create_parked_at(&self, edge: &ParkedAtEdge) -> Result<()> {
        self.create_parked_at(edge).await
    }

    async fn get_parked_at(&self, vehicle_uuid: &str, depot_id: &str) -> Result<ParkedAtEdge> {
        self.get_parked_at(vehicle_uuid, depot_id).await
    }

    async fn update_parked_at(
        &self,
        vehicle_uuid: &str,
        depot_id: &str,
        update: &UpdateSinceRequest,
    ) -> Result<ParkedAtEdge> {
        self.update_parked_at(vehicle_uuid, depot_id, update).await
    }

    async fn delete_parked_at(&self, vehicle_uuid: &str, depot_id: &str) -> Result<()> {
        self.delete_parked_at(vehicle_uuid, depot_id).await
    }

    // ========================================================================
    // Snapshot & transactional primitives
    // ========================================================================

    async fn snapshot(&self) -> Result<NetworkSnapshot> {
        self.snapshot().await
    }

    async fn assign_vehicle_atomically(
        &self,
        line_id: &str,
        select: &VehicleSelector,
    ) -> Result<Assignment> {
        self.assign_vehicle_atomically(line_id, select).await
    }

    async fn update_next_if(
        &self,
        from_id: &str,
        to_id: &str,
        decide: &NextEdgeDecision,
    ) -> Result<NextEdgeUpdate> {
        self.update_next_if(from_id, to_id, decide).await
    }
}
