//! YAML network seeds.
//!
//! A seed file lists nodes and relationships in the same shapes the store
//! models serialize to. Loading goes through the public `GraphStore`
//! operations, so a seed is validated exactly like any other write.
//!
//! ```yaml
//! stops:
//!   - { id: S1, name: Central, lat: 45.46, lon: 9.19, zone: A }
//! lines:
//!   - { id: L1, name: Red, mode: metro, frequency_mins: 5 }
//! next:
//!   - { from_id: S1, to_id: S2, travel_time: 120 }
//! serves:
//!   - { line_id: L1, stop_id: S1, order: 1 }
//! ```

use crate::store::{
    AssignedToEdge, DepotNode, GraphStore, LineNode, NextEdge, ParkedAtEdge, ServesEdge, StopNode,
    VehicleNode,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A whole network described in one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSeed {
    pub stops: Vec<StopNode>,
    pub lines: Vec<LineNode>,
    pub vehicles: Vec<VehicleNode>,
    pub depots: Vec<DepotNode>,
    pub next: Vec<NextEdge>,
    pub serves: Vec<ServesEdge>,
    pub assignments: Vec<AssignedToEdge>,
    pub parkings: Vec<ParkedAtEdge>,
}

/// Counts of what a seed wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub nodes: usize,
    pub relationships: usize,
}

impl NetworkSeed {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Invalid network seed")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))
    }

    /// Write every node, then every relationship. Stops at the first error;
    /// entities written before it stay in the store.
    pub async fn apply(&self, store: &dyn GraphStore) -> Result<SeedSummary> {
        for stop in &self.stops {
            store
                .create_stop(stop)
                .await
                .with_context(|| format!("Seeding stop {}", stop.id))?;
        }
        for line in &self.lines {
            store
                .create_line(line)
                .await
                .with_context(|| format!("Seeding line {}", line.id))?;
        }
        for vehicle in &self.vehicles {
            store
                .create_vehicle(vehicle)
                .await
                .with_context(|| format!("Seeding vehicle {}", vehicle.vehicle_uuid))?;
        }
        for depot in &self.depots {
            store
                .create_depot(depot)
                .await
                .with_context(|| format!("Seeding depot {}", depot.id))?;
        }

        for edge in &self.next {
            store
                .create_next(edge)
                .await
                .with_context(|| format!("Seeding NEXT {} -> {}", edge.from_id, edge.to_id))?;
        }
        for edge in &self.serves {
            store
                .create_serves(edge)
                .await
                .with_context(|| format!("Seeding SERVES {} -> {}", edge.line_id, edge.stop_id))?;
        }
        for edge in &self.assignments {
            store.create_assigned_to(edge).await.with_context(|| {
                format!("Seeding ASSIGNED_TO {} -> {}", edge.vehicle_uuid, edge.line_id)
            })?;
        }
        for edge in &self.parkings {
            store.create_parked_at(edge).await.with_context(|| {
                format!("Seeding PARKED_AT {} -> {}", edge.vehicle_uuid, edge.depot_id)
            })?;
        }

        let summary = SeedSummary {
            nodes: self.stops.len() + self.lines.len() + self.vehicles.len() + self.depots.len(),
            relationships: self.next.len()
                + self.serves.len()
                + self.assignments.len()
                + self.parkings.len(),
        };
        tracing::info!(
            nodes = summary.nodes,
            relationships = summary.relationships,
            "Seeded network"
        );
        Ok(summary)
    }
}
