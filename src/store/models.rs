//! Graph models for the transit network: nodes, relationships and partial updates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Labels
// ============================================================================

/// Node labels stored in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Stop,
    Line,
    Vehicle,
    Depot,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Stop => "Stop",
            NodeKind::Line => "Line",
            NodeKind::Vehicle => "Vehicle",
            NodeKind::Depot => "Depot",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Directed relationship types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Stop -> Stop
    Next,
    /// Line -> Stop
    Serves,
    /// Vehicle -> Line
    AssignedTo,
    /// Vehicle -> Depot
    ParkedAt,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Next => "NEXT",
            RelationshipType::Serves => "SERVES",
            RelationshipType::AssignedTo => "ASSIGNED_TO",
            RelationshipType::ParkedAt => "PARKED_AT",
        }
    }

    /// (from, to) node labels
    pub fn endpoints(&self) -> (NodeKind, NodeKind) {
        match self {
            RelationshipType::Next => (NodeKind::Stop, NodeKind::Stop),
            RelationshipType::Serves => (NodeKind::Line, NodeKind::Stop),
            RelationshipType::AssignedTo => (NodeKind::Vehicle, NodeKind::Line),
            RelationshipType::ParkedAt => (NodeKind::Vehicle, NodeKind::Depot),
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Planar coordinates (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// A physical transit location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopNode {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub zone: String,
    #[serde(default)]
    pub shelter: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl StopNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        lat: f64,
        lon: f64,
        zone: impl Into<String>,
        shelter: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lat,
            lon,
            zone: zone.into(),
            shelter,
            created_at: Utc::now(),
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// A route composed of stops (via SERVES)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineNode {
    pub id: String,
    pub name: String,
    pub mode: String,
    pub frequency_mins: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl LineNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mode: impl Into<String>,
        frequency_mins: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mode: mode.into(),
            frequency_mins,
            active: true,
        }
    }
}

/// Operational status of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    /// Parked at a depot, available for dispatch
    #[default]
    Idle,
    /// Assigned to a line
    Active,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Idle => "IDLE",
            VehicleStatus::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IDLE" => Ok(VehicleStatus::Idle),
            "ACTIVE" => Ok(VehicleStatus::Active),
            other => Err(format!("unknown vehicle status: {other}")),
        }
    }
}

/// A fleet unit. Keyed by `vehicle_uuid`; `id` is the fleet number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleNode {
    pub vehicle_uuid: String,
    pub id: String,
    pub capacity: i32,
    #[serde(default)]
    pub status: VehicleStatus,
    #[serde(default)]
    pub last_seen_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_known_lat: Option<f64>,
    #[serde(default)]
    pub last_known_lon: Option<f64>,
}

impl VehicleNode {
    /// New idle vehicle with a freshly generated uuid and no known position
    pub fn new(id: impl Into<String>, capacity: i32) -> Self {
        Self {
            vehicle_uuid: Uuid::new_v4().to_string(),
            id: id.into(),
            capacity,
            status: VehicleStatus::Idle,
            last_seen_ts: None,
            last_known_lat: None,
            last_known_lon: None,
        }
    }

    /// Last known position, if both coordinates are set
    pub fn position(&self) -> Option<Coordinates> {
        match (self.last_known_lat, self.last_known_lon) {
            (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == VehicleStatus::Idle
    }
}

/// A vehicle parking/staging facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepotNode {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub capacity: i32,
}

impl DepotNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lon: f64, capacity: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lat,
            lon,
            capacity,
        }
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// Directed adjacency between consecutive stops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextEdge {
    pub from_id: String,
    pub to_id: String,
    /// Travel time (seconds); `None` means not yet measured
    #[serde(default)]
    pub travel_time: Option<i32>,
    #[serde(default)]
    pub distance: Option<i32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_calibrated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub calibration_count: u32,
}

impl NextEdge {
    pub fn new(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        travel_time: Option<i32>,
        distance: Option<i32>,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            travel_time,
            distance,
            created_at: Utc::now(),
            last_calibrated: None,
            calibration_count: 0,
        }
    }
}

/// Line -> Stop, `order` is the position along the route (1 = origin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServesEdge {
    pub line_id: String,
    pub stop_id: String,
    pub order: i32,
}

impl ServesEdge {
    pub fn new(line_id: impl Into<String>, stop_id: impl Into<String>, order: i32) -> Self {
        Self {
            line_id: line_id.into(),
            stop_id: stop_id.into(),
            order,
        }
    }
}

/// Vehicle -> Line. Creating it marks the vehicle ACTIVE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedToEdge {
    pub vehicle_uuid: String,
    pub line_id: String,
    #[serde(default = "Utc::now")]
    pub since: DateTime<Utc>,
}

/// Vehicle -> Depot. Creating it marks the vehicle IDLE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkedAtEdge {
    pub vehicle_uuid: String,
    pub depot_id: String,
    #[serde(default = "Utc::now")]
    pub since: DateTime<Utc>,
}

/// Any relationship, for the type-generic CRUD entry points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    Next(NextEdge),
    Serves(ServesEdge),
    AssignedTo(AssignedToEdge),
    ParkedAt(ParkedAtEdge),
}

impl Relationship {
    pub fn rel_type(&self) -> RelationshipType {
        match self {
            Relationship::Next(_) => RelationshipType::Next,
            Relationship::Serves(_) => RelationshipType::Serves,
            Relationship::AssignedTo(_) => RelationshipType::AssignedTo,
            Relationship::ParkedAt(_) => RelationshipType::ParkedAt,
        }
    }

    /// (from id, to id)
    pub fn endpoints(&self) -> (&str, &str) {
        match self {
            Relationship::Next(e) => (&e.from_id, &e.to_id),
            Relationship::Serves(e) => (&e.line_id, &e.stop_id),
            Relationship::AssignedTo(e) => (&e.vehicle_uuid, &e.line_id),
            Relationship::ParkedAt(e) => (&e.vehicle_uuid, &e.depot_id),
        }
    }
}

/// (type, from, to) triple identifying a relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub rel_type: RelationshipType,
    pub from_id: String,
    pub to_id: String,
}

impl RelationshipKey {
    pub fn new(rel_type: RelationshipType, from_id: impl Into<String>, to_id: impl Into<String>) -> Self {
        Self {
            rel_type,
            from_id: from_id.into(),
            to_id: to_id.into(),
        }
    }
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[:{}]->({})", self.from_id, self.rel_type, self.to_id)
    }
}

// ============================================================================
// Partial updates (absent fields keep their stored value)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStopRequest {
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub zone: Option<String>,
    pub shelter: Option<bool>,
}

impl UpdateStopRequest {
    pub fn apply(&self, stop: &mut StopNode) {
        if let Some(name) = &self.name {
            stop.name = name.clone();
        }
        if let Some(lat) = self.lat {
            stop.lat = lat;
        }
        if let Some(lon) = self.lon {
            stop.lon = lon;
        }
        if let Some(zone) = &self.zone {
            stop.zone = zone.clone();
        }
        if let Some(shelter) = self.shelter {
            stop.shelter = shelter;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateLineRequest {
    pub name: Option<String>,
    pub mode: Option<String>,
    pub frequency_mins: Option<i32>,
    pub active: Option<bool>,
}

impl UpdateLineRequest {
    pub fn apply(&self, line: &mut LineNode) {
        if let Some(name) = &self.name {
            line.name = name.clone();
        }
        if let Some(mode) = &self.mode {
            line.mode = mode.clone();
        }
        if let Some(freq) = self.frequency_mins {
            line.frequency_mins = freq;
        }
        if let Some(active) = self.active {
            line.active = active;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateVehicleRequest {
    pub id: Option<String>,
    pub capacity: Option<i32>,
    pub status: Option<VehicleStatus>,
    pub last_seen_ts: Option<DateTime<Utc>>,
    pub last_known_lat: Option<f64>,
    pub last_known_lon: Option<f64>,
}

impl UpdateVehicleRequest {
    pub fn apply(&self, vehicle: &mut VehicleNode) {
        if let Some(id) = &self.id {
            vehicle.id = id.clone();
        }
        if let Some(capacity) = self.capacity {
            vehicle.capacity = capacity;
        }
        if let Some(status) = self.status {
            vehicle.status = status;
        }
        if let Some(ts) = self.last_seen_ts {
            vehicle.last_seen_ts = Some(ts);
        }
        if let Some(lat) = self.last_known_lat {
            vehicle.last_known_lat = Some(lat);
        }
        if let Some(lon) = self.last_known_lon {
            vehicle.last_known_lon = Some(lon);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDepotRequest {
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub capacity: Option<i32>,
}

impl UpdateDepotRequest {
    pub fn apply(&self, depot: &mut DepotNode) {
        if let Some(name) = &self.name {
            depot.name = name.clone();
        }
        if let Some(lat) = self.lat {
            depot.lat = lat;
        }
        if let Some(lon) = self.lon {
            depot.lon = lon;
        }
        if let Some(capacity) = self.capacity {
            depot.capacity = capacity;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateNextRequest {
    pub travel_time: Option<i32>,
    pub distance: Option<i32>,
    pub last_calibrated: Option<DateTime<Utc>>,
    pub calibration_count: Option<u32>,
}

impl UpdateNextRequest {
    pub fn apply(&self, edge: &mut NextEdge) {
        if let Some(tt) = self.travel_time {
            edge.travel_time = Some(tt);
        }
        if let Some(distance) = self.distance {
            edge.distance = Some(distance);
        }
        if let Some(ts) = self.last_calibrated {
            edge.last_calibrated = Some(ts);
        }
        if let Some(count) = self.calibration_count {
            edge.calibration_count = count;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateServesRequest {
    pub order: Option<i32>,
}

/// Partial update for ASSIGNED_TO and PARKED_AT
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSinceRequest {
    pub since: Option<DateTime<Utc>>,
}

/// Partial update for any relationship type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipUpdate {
    Next(UpdateNextRequest),
    Serves(UpdateServesRequest),
    AssignedTo(UpdateSinceRequest),
    ParkedAt(UpdateSinceRequest),
}

impl RelationshipUpdate {
    pub fn rel_type(&self) -> RelationshipType {
        match self {
            RelationshipUpdate::Next(_) => RelationshipType::Next,
            RelationshipUpdate::Serves(_) => RelationshipType::Serves,
            RelationshipUpdate::AssignedTo(_) => RelationshipType::AssignedTo,
            RelationshipUpdate::ParkedAt(_) => RelationshipType::ParkedAt,
        }
    }
}

// ============================================================================
// Composite results
// ============================================================================

/// Outcome of a dispatch transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// The vehicle as stored after the assignment (status ACTIVE)
    pub vehicle: VehicleNode,
    pub line_id: String,
    pub since: DateTime<Utc>,
}

/// Every node and relationship, read at one instant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub stops: Vec<StopNode>,
    pub lines: Vec<LineNode>,
    pub vehicles: Vec<VehicleNode>,
    pub depots: Vec<DepotNode>,
    pub next_edges: Vec<NextEdge>,
    pub serves: Vec<ServesEdge>,
    pub assignments: Vec<AssignedToEdge>,
    pub parkings: Vec<ParkedAtEdge>,
    pub taken_at: DateTime<Utc>,
}
