//! In-memory implementation of GraphStore.
//!
//! Nodes live in `BTreeMap`s keyed by id and relationships in `BTreeMap`s keyed
//! by `(from, to)`, so outgoing adjacency is a range scan and iteration order
//! is deterministic. The whole graph sits behind a single `tokio::sync::RwLock`
//! and every operation takes it exactly once: reads see a consistent snapshot,
//! and the dispatch / recalibration transactions cannot interleave with any
//! other writer.

use crate::error::{require_id, GraphError, Result};
use crate::store::models::*;
use crate::store::traits::{
    require_endpoint_ids, GraphStore, NextEdgeDecision, NextEdgeUpdate, VehicleSelector,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

type EdgeKey = (String, String);

fn edge_key(from: &str, to: &str) -> EdgeKey {
    (from.to_string(), to.to_string())
}

/// Relationships whose key starts with `from`
fn outgoing<'a, V>(
    map: &'a BTreeMap<EdgeKey, V>,
    from: &'a str,
) -> impl Iterator<Item = (&'a EdgeKey, &'a V)> + 'a {
    map.range((from.to_string(), String::new())..)
        .take_while(move |((f, _), _)| f == from)
}

#[derive(Debug, Default)]
struct GraphState {
    stops: BTreeMap<String, StopNode>,
    lines: BTreeMap<String, LineNode>,
    vehicles: BTreeMap<String, VehicleNode>,
    depots: BTreeMap<String, DepotNode>,

    // Relationships (adjacency keyed by (from, to))
    next: BTreeMap<EdgeKey, NextEdge>,
    serves: BTreeMap<EdgeKey, ServesEdge>,
    assigned_to: BTreeMap<EdgeKey, Vec<AssignedToEdge>>,
    parked_at: BTreeMap<EdgeKey, Vec<ParkedAtEdge>>,
}

impl GraphState {
    /// Origin stop of a line: the SERVES edge with order 1 (lowest stop id if several)
    fn origin_of(&self, line_id: &str) -> Option<&StopNode> {
        outgoing(&self.serves, line_id)
            .find(|(_, e)| e.order == 1)
            .and_then(|((_, stop_id), _)| self.stops.get(stop_id))
    }

    fn require_stop(&self, relationship: RelationshipType, id: &str) -> Result<()> {
        if self.stops.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::endpoint_not_found(relationship.as_str(), "Stop", id))
        }
    }

    fn require_line(&self, relationship: RelationshipType, id: &str) -> Result<()> {
        if self.lines.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::endpoint_not_found(relationship.as_str(), "Line", id))
        }
    }

    fn require_vehicle(&self, relationship: RelationshipType, id: &str) -> Result<()> {
        if self.vehicles.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::endpoint_not_found(relationship.as_str(), "Vehicle", id))
        }
    }

    fn require_depot(&self, relationship: RelationshipType, id: &str) -> Result<()> {
        if self.depots.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::endpoint_not_found(relationship.as_str(), "Depot", id))
        }
    }

    fn set_vehicle_status(&mut self, vehicle_uuid: &str, status: VehicleStatus) {
        if let Some(v) = self.vehicles.get_mut(vehicle_uuid) {
            v.status = status;
        }
    }
}

/// Most recent copy of a repeatable relationship (greatest `since`, last created on ties)
fn latest<V>(edges: &[V], since: impl Fn(&V) -> DateTime<Utc>) -> Option<&V> {
    edges.iter().max_by_key(|e| since(e))
}

/// Endpoint a deleted node occupies in a relationship map
#[derive(Debug, Clone, Copy)]
enum Side {
    From,
    To,
}

/// Drop every relationship whose `side` endpoint is `id`; returns how many keys went.
///
/// Ids are only unique per label, so the other endpoint is never compared.
fn detach<V>(map: &mut BTreeMap<EdgeKey, V>, id: &str, side: Side) -> usize {
    let before = map.len();
    map.retain(|(from, to), _| match side {
        Side::From => from != id,
        Side::To => to != id,
    });
    before - map.len()
}

/// In-memory GraphStore backend.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    state: RwLock<GraphState>,
}

impl MemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    // ========================================================================
    // Stop operations
    // ========================================================================

    async fn create_stop(&self, stop: &StopNode) -> Result<()> {
        require_id("Stop", &stop.id)?;
        let mut state = self.state.write().await;
        if state.stops.contains_key(&stop.id) {
            return Err(GraphError::already_exists("Stop", &stop.id));
        }
        state.stops.insert(stop.id.clone(), stop.clone());
        Ok(())
    }

    async fn get_stop(&self, id: &str) -> Result<StopNode> {
        require_id("Stop", id)?;
        self.state
            .read()
            .await
            .stops
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::not_found("Stop", id))
    }

    async fn update_stop(&self, id: &str, update: &UpdateStopRequest) -> Result<StopNode> {
        require_id("Stop", id)?;
        let mut state = self.state.write().await;
        let stop = state
            .stops
            .get_mut(id)
            .ok_or_else(|| GraphError::not_found("Stop", id))?;
        update.apply(stop);
        Ok(stop.clone())
    }

    async fn delete_stop(&self, id: &str) -> Result<()> {
        require_id("Stop", id)?;
        let mut state = self.state.write().await;
        if state.stops.remove(id).is_some() {
            let next = detach(&mut state.next, id, Side::From)
                + detach(&mut state.next, id, Side::To);
            let serves = detach(&mut state.serves, id, Side::To);
            tracing::debug!(stop = id, next, serves, "Detach-deleted stop");
        }
        Ok(())
    }

    async fn list_stops(&self) -> Result<Vec<StopNode>> {
        Ok(self.state.read().await.stops.values().cloned().collect())
    }

    // ========================================================================
    // Line operations
    // ========================================================================

    async fn create_line(&self, line: &LineNode) -> Result<()> {
        require_id("Line", &line.id)?;
        let mut state = self.state.write().await;
        if state.lines.contains_key(&line.id) {
            return Err(GraphError::already_exists("Line", &line.id));
        }
        state.lines.insert(line.id.clone(), line.clone());
        Ok(())
    }

    async fn get_line(&self, id: &str) -> Result<LineNode> {
        require_id("Line", id)?;
        self.state
            .read()
            .await
            .lines
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::not_found("Line", id))
    }

    async fn update_line(&self, id: &str, update: &UpdateLineRequest) -> Result<LineNode> {
        require_id("Line", id)?;
        let mut state = self.state.write().await;
        let line = state
            .lines
            .get_mut(id)
            .ok_or_else(|| GraphError::not_found("Line", id))?;
        update.apply(line);
        Ok(line.clone())
    }

    async fn delete_line(&self, id: &str) -> Result<()> {
        require_id("Line", id)?;
        let mut state = self.state.write().await;
        if state.lines.remove(id).is_some() {
            detach(&mut state.serves, id, Side::From);
            detach(&mut state.assigned_to, id, Side::To);
        }
        Ok(())
    }

    async fn list_lines(&self) -> Result<Vec<LineNode>> {
        Ok(self.state.read().await.lines.values().cloned().collect())
    }

    // ========================================================================
    // Vehicle operations
    // ========================================================================

    async fn create_vehicle(&self, vehicle: &VehicleNode) -> Result<()> {
        require_id("Vehicle", &vehicle.vehicle_uuid)?;
        let mut state = self.state.write().await;
        if state.vehicles.contains_key(&vehicle.vehicle_uuid) {
            return Err(GraphError::already_exists("Vehicle", &vehicle.vehicle_uuid));
        }
        state
            .vehicles
            .insert(vehicle.vehicle_uuid.clone(), vehicle.clone());
        Ok(())
    }

    async fn get_vehicle(&self, vehicle_uuid: &str) -> Result<VehicleNode> {
        require_id("Vehicle", vehicle_uuid)?;
        self.state
            .read()
            .await
            .vehicles
            .get(vehicle_uuid)
            .cloned()
            .ok_or_else(|| GraphError::not_found("Vehicle", vehicle_uuid))
    }

    async fn update_vehicle(
        &self,
        vehicle_uuid: &str,
        update: &UpdateVehicleRequest,
    ) -> Result<VehicleNode> {
        require_id("Vehicle", vehicle_uuid)?;
        let mut state = self.state.write().await;
        let vehicle = state
            .vehicles
            .get_mut(vehicle_uuid)
            .ok_or_else(|| GraphError::not_found("Vehicle", vehicle_uuid))?;
        update.apply(vehicle);
        Ok(vehicle.clone())
    }

    async fn delete_vehicle(&self, vehicle_uuid: &str) -> Result<()> {
        require_id("Vehicle", vehicle_uuid)?;
        let mut state = self.state.write().await;
        if state.vehicles.remove(vehicle_uuid).is_some() {
            detach(&mut state.assigned_to, vehicle_uuid, Side::From);
            detach(&mut state.parked_at, vehicle_uuid, Side::From);
        }
        Ok(())
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleNode>> {
        Ok(self.state.read().await.vehicles.values().cloned().collect())
    }

    // ========================================================================
    // Depot operations
    // ========================================================================

    async fn create_depot(&self, depot: &DepotNode) -> Result<()> {
        require_id("Depot", &depot.id)?;
        let mut state = self.state.write().await;
        if state.depots.contains_key(&depot.id) {
            return Err(GraphError::already_exists("Depot", &depot.id));
        }
        state.depots.insert(depot.id.clone(), depot.clone());
        Ok(())
    }

    async fn get_depot(&self, id: &str) -> Result<DepotNode> {
        require_id("Depot", id)?;
        self.state
            .read()
            .await
            .depots
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::not_found("Depot", id))
    }

    async fn update_depot(&self, id: &str, update: &UpdateDepotRequest) -> Result<DepotNode> {
        require_id("Depot", id)?;
        let mut state = self.state.write().await;
        let depot = state
            .depots
            .get_mut(id)
            .ok_or_else(|| GraphError::not_found("Depot", id))?;
        update.apply(depot);
        Ok(depot.clone())
    }

    async fn delete_depot(&self, id: &str) -> Result<()> {
        require_id("Depot", id)?;
        let mut state = self.state.write().await;
        if state.depots.remove(id).is_some() {
            detach(&mut state.parked_at, id, Side::To);
        }
        Ok(())
    }

    async fn list_depots(&self) -> Result<Vec<DepotNode>> {
        Ok(self.state.read().await.depots.values().cloned().collect())
    }

    // ========================================================================
    // NEXT
    // ========================================================================

    async fn create_next(&self, edge: &NextEdge) -> Result<()> {
        let rel = RelationshipType::Next;
        require_endpoint_ids(rel, &edge.from_id, &edge.to_id)?;
        let mut state = self.state.write().await;
        state.require_stop(rel, &edge.from_id)?;
        state.require_stop(rel, &edge.to_id)?;
        let key = edge_key(&edge.from_id, &edge.to_id);
        if state.next.contains_key(&key) {
            return Err(GraphError::already_exists(
                "NEXT",
                RelationshipKey::new(rel, &edge.from_id, &edge.to_id).to_string(),
            ));
        }
        state.next.insert(key, edge.clone());
        Ok(())
    }

    async fn get_next(&self, from_id: &str, to_id: &str) -> Result<NextEdge> {
        require_endpoint_ids(RelationshipType::Next, from_id, to_id)?;
        self.state
            .read()
            .await
            .next
            .get(&edge_key(from_id, to_id))
            .cloned()
            .ok_or_else(|| {
                GraphError::not_found(
                    "NEXT",
                    RelationshipKey::new(RelationshipType::Next, from_id, to_id).to_string(),
                )
            })
    }

    async fn update_next(
        &self,
        from_id: &str,
        to_id: &str,
        update: &UpdateNextRequest,
    ) -> Result<NextEdge> {
        require_endpoint_ids(RelationshipType::Next, from_id, to_id)?;
        let mut state = self.state.write().await;
        let edge = state.next.get_mut(&edge_key(from_id, to_id)).ok_or_else(|| {
            GraphError::not_found(
                "NEXT",
                RelationshipKey::new(RelationshipType::Next, from_id, to_id).to_string(),
            )
        })?;
        update.apply(edge);
        Ok(edge.clone())
    }

    async fn delete_next(&self, from_id: &str, to_id: &str) -> Result<()> {
        require_endpoint_ids(RelationshipType::Next, from_id, to_id)?;
        self.state
            .write()
            .await
            .next
            .remove(&edge_key(from_id, to_id));
        Ok(())
    }

    // ========================================================================
    // SERVES
    // ========================================================================

    async fn create_serves(&self, edge: &ServesEdge) -> Result<()> {
        let rel = RelationshipType::Serves;
        require_endpoint_ids(rel, &edge.line_id, &edge.stop_id)?;
        let mut state = self.state.write().await;
        state.require_line(rel, &edge.line_id)?;
        state.require_stop(rel, &edge.stop_id)?;
        let key = edge_key(&edge.line_id, &edge.stop_id);
        if state.serves.contains_key(&key) {
            return Err(GraphError::already_exists(
                "SERVES",
                RelationshipKey::new(rel, &edge.line_id, &edge.stop_id).to_string(),
            ));
        }
        state.serves.insert(key, edge.clone());
        Ok(())
    }

    async fn get_serves(&self, line_id: &str, stop_id: &str) -> Result<ServesEdge> {
        require_endpoint_ids(RelationshipType::Serves, line_id, stop_id)?;
        self.state
            .read()
            .await
            .serves
            .get(&edge_key(line_id, stop_id))
            .cloned()
            .ok_or_else(|| {
                GraphError::not_found(
                    "SERVES",
                    RelationshipKey::new(RelationshipType::Serves, line_id, stop_id).to_string(),
                )
            })
    }

    async fn update_serves(
        &self,
        line_id: &str,
        stop_id: &str,
        update: &UpdateServesRequest,
    ) -> Result<ServesEdge> {
        require_endpoint_ids(RelationshipType::Serves, line_id, stop_id)?;
        let mut state = self.state.write().await;
        let edge = state
            .serves
            .get_mut(&edge_key(line_id, stop_id))
            .ok_or_else(|| {
                GraphError::not_found(
                    "SERVES",
                    RelationshipKey::new(RelationshipType::Serves, line_id, stop_id).to_string(),
                )
            })?;
        if let Some(order) = update.order {
            edge.order = order;
        }
        Ok(edge.clone())
    }

    async fn delete_serves(&self, line_id: &str, stop_id: &str) -> Result<()> {
        require_endpoint_ids(RelationshipType::Serves, line_id, stop_id)?;
        self.state
            .write()
            .await
            .serves
            .remove(&edge_key(line_id, stop_id));
        Ok(())
    }

    async fn list_line_stops(&self, line_id: &str) -> Result<Vec<ServesEdge>> {
        require_id("Line", line_id)?;
        let state = self.state.read().await;
        if !state.lines.contains_key(line_id) {
            return Err(GraphError::not_found("Line", line_id));
        }
        let mut edges: Vec<ServesEdge> = outgoing(&state.serves, line_id)
            .map(|(_, e)| e.clone())
            .collect();
        edges.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.stop_id.cmp(&b.stop_id)));
        Ok(edges)
    }

    // ========================================================================
    // ASSIGNED_TO
    // ========================================================================

    async fn create_assigned_to(&self, edge: &AssignedToEdge) -> Result<()> {
        let rel = RelationshipType::AssignedTo;
        require_endpoint_ids(rel, &edge.vehicle_uuid, &edge.line_id)?;
        let mut state = self.state.write().await;
        state.require_vehicle(rel, &edge.vehicle_uuid)?;
        state.require_line(rel, &edge.line_id)?;
        state
            .assigned_to
            .entry(edge_key(&edge.vehicle_uuid, &edge.line_id))
            .or_default()
            .push(edge.clone());
        state.set_vehicle_status(&edge.vehicle_uuid, VehicleStatus::Active);
        Ok(())
    }

    async fn get_assigned_to(&self, vehicle_uuid: &str, line_id: &str) -> Result<AssignedToEdge> {
        require_endpoint_ids(RelationshipType::AssignedTo, vehicle_uuid, line_id)?;
        self.state
            .read()
            .await
            .assigned_to
            .get(&edge_key(vehicle_uuid, line_id))
            .and_then(|edges| latest(edges, |e| e.since))
            .cloned()
            .ok_or_else(|| {
                GraphError::not_found(
                    "ASSIGNED_TO",
                    RelationshipKey::new(RelationshipType::AssignedTo, vehicle_uuid, line_id)
                        .to_string(),
                )
            })
    }

    async fn update_assigned_to(
        &self,
        vehicle_uuid: &str,
        line_id: &str,
        update: &UpdateSinceRequest,
    ) -> Result<AssignedToEdge> {
        require_endpoint_ids(RelationshipType::AssignedTo, vehicle_uuid, line_id)?;
        let mut state = self.state.write().await;
        let edges = state
            .assigned_to
            .get_mut(&edge_key(vehicle_uuid, line_id))
            .ok_or_else(|| {
                GraphError::not_found(
                    "ASSIGNED_TO",
                    RelationshipKey::new(RelationshipType::AssignedTo, vehicle_uuid, line_id)
                        .to_string(),
                )
            })?;
        if let Some(since) = update.since {
            for edge in edges.iter_mut() {
                edge.since = since;
            }
        }
        latest(edges, |e| e.since).cloned().ok_or_else(|| {
            GraphError::not_found("ASSIGNED_TO", format!("{vehicle_uuid} -> {line_id}"))
        })
    }

    async fn delete_assigned_to(&self, vehicle_uuid: &str, line_id: &str) -> Result<()> {
        require_endpoint_ids(RelationshipType::AssignedTo, vehicle_uuid, line_id)?;
        self.state
            .write()
            .await
            .assigned_to
            .remove(&edge_key(vehicle_uuid, line_id));
        Ok(())
    }

    // ========================================================================
    // PARKED_AT
    // ========================================================================

    async fn create_parked_at(&self, edge: &ParkedAtEdge) -> Result<()> {
        let rel = RelationshipType::ParkedAt;
        require_endpoint_ids(rel, &edge.vehicle_uuid, &edge.depot_id)?;
        let mut state = self.state.write().await;
        state.require_vehicle(rel, &edge.vehicle_uuid)?;
        state.require_depot(rel, &edge.depot_id)?;
        state
            .parked_at
            .entry(edge_key(&edge.vehicle_uuid, &edge.depot_id))
            .or_default()
            .push(edge.clone());
        state.set_vehicle_status(&edge.vehicle_uuid, VehicleStatus::Idle);
        Ok(())
    }

    async fn get_parked_at(&self, vehicle_uuid: &str, depot_id: &str) -> Result<ParkedAtEdge> {
        require_endpoint_ids(RelationshipType::ParkedAt, vehicle_uuid, depot_id)?;
        self.state
            .read()
            .await
            .parked_at
            .get(&edge_key(vehicle_uuid, depot_id))
            .and_then(|edges| latest(edges, |e| e.since))
            .cloned()
            .ok_or_else(|| {
                GraphError::not_found(
                    "PARKED_AT",
                    RelationshipKey::new(RelationshipType::ParkedAt, vehicle_uuid, depot_id)
                        .to_string(),
                )
            })
    }

    async fn update_parked_at(
        &self,
        vehicle_uuid: &str,
        depot_id: &str,
        update: &UpdateSinceRequest,
    ) -> Result<ParkedAtEdge> {
        require_endpoint_ids(RelationshipType::ParkedAt, vehicle_uuid, depot_id)?;
        let mut state = self.state.write().await;
        let edges = state
            .parked_at
            .get_mut(&edge_key(vehicle_uuid, depot_id))
            .ok_or_else(|| {
                GraphError::not_found(
                    "PARKED_AT",
                    RelationshipKey::new(RelationshipType::ParkedAt, vehicle_uuid, depot_id)
                        .to_string(),
                )
            })?;
        if let Some(since) = update.since {
            for edge in edges.iter_mut() {
                edge.since = since;
            }
        }
        latest(edges, |e| e.since).cloned().ok_or_else(|| {
            GraphError::not_found("PARKED_AT", format!("{vehicle_uuid} -> {depot_id}"))
        })
    }

    async fn delete_parked_at(&self, vehicle_uuid: &str, depot_id: &str) -> Result<()> {
        require_endpoint_ids(RelationshipType::ParkedAt, vehicle_uuid, depot_id)?;
        self.state
            .write()
            .await
            .parked_at
            .remove(&edge_key(vehicle_uuid, depot_id));
        Ok(())
    }

    // ========================================================================
    // Snapshot & transactional primitives
    // ========================================================================

    async fn snapshot(&self) -> Result<NetworkSnapshot> {
        let state = self.state.read().await;
        Ok(NetworkSnapshot {
            stops: state.stops.values().cloned().collect(),
            lines: state.lines.values().cloned().collect(),
            vehicles: state.vehicles.values().cloned().collect(),
            depots: state.depots.values().cloned().collect(),
            next_edges: state.next.values().cloned().collect(),
            serves: state.serves.values().cloned().collect(),
            assignments: state.assigned_to.values().flatten().cloned().collect(),
            parkings: state.parked_at.values().flatten().cloned().collect(),
            taken_at: Utc::now(),
        })
    }

    async fn assign_vehicle_atomically(
        &self,
        line_id: &str,
        select: &VehicleSelector,
    ) -> Result<Assignment> {
        require_id("Line", line_id)?;
        let mut state = self.state.write().await;

        let origin = state
            .origin_of(line_id)
            .map(StopNode::coordinates)
            .ok_or_else(|| GraphError::NoOriginStop(line_id.to_string()))?;

        let candidates: Vec<VehicleNode> = state
            .vehicles
            .values()
            .filter(|v| v.is_idle() && v.position().is_some())
            .cloned()
            .collect();

        let chosen = select(origin, &candidates)
            .filter(|uuid| candidates.iter().any(|v| &v.vehicle_uuid == uuid))
            .ok_or_else(|| GraphError::NoIdleVehicleAvailable(line_id.to_string()))?;

        let since = Utc::now();
        state
            .assigned_to
            .entry(edge_key(&chosen, line_id))
            .or_default()
            .push(AssignedToEdge {
                vehicle_uuid: chosen.clone(),
                line_id: line_id.to_string(),
                since,
            });
        let vehicle = state
            .vehicles
            .get_mut(&chosen)
            .ok_or_else(|| GraphError::not_found("Vehicle", &chosen))?;
        vehicle.status = VehicleStatus::Active;

        Ok(Assignment {
            vehicle: vehicle.clone(),
            line_id: line_id.to_string(),
            since,
        })
    }

    async fn update_next_if(
        &self,
        from_id: &str,
        to_id: &str,
        decide: &NextEdgeDecision,
    ) -> Result<NextEdgeUpdate> {
        require_endpoint_ids(RelationshipType::Next, from_id, to_id)?;
        let mut state = self.state.write().await;
        let edge = state
            .next
            .get_mut(&edge_key(from_id, to_id))
            .ok_or_else(|| GraphError::EdgeNotFound {
                from: from_id.to_string(),
                to: to_id.to_string(),
            })?;

        match decide(edge)? {
            Some(update) => {
                update.apply(edge);
                Ok(NextEdgeUpdate {
                    edge: edge.clone(),
                    applied: true,
                })
            }
            None => Ok(NextEdgeUpdate {
                edge: edge.clone(),
                applied: false,
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
