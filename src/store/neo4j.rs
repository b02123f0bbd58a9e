//! Neo4j client for the transit graph
//!
//! Nodes are stored under their label (`Stop`, `Line`, `Vehicle`, `Depot`)
//! with the same property names as the Rust records. Timestamps are stored as
//! epoch milliseconds so Cypher can do arithmetic against `timestamp()`.

use crate::error::{require_id, GraphError, Result};
use crate::store::models::*;
use crate::store::traits::{require_endpoint_ids, NextEdgeDecision, NextEdgeUpdate, VehicleSelector};
use anyhow::Context;
use chrono::{DateTime, Utc};
use neo4rs::{query, BoltType, Graph, Node, Query, Relation, Row, Txn};
use std::sync::Arc;

impl From<neo4rs::Error> for GraphError {
    fn from(err: neo4rs::Error) -> Self {
        GraphError::Backend(anyhow::Error::new(err))
    }
}

impl From<neo4rs::DeError> for GraphError {
    fn from(err: neo4rs::DeError) -> Self {
        GraphError::Backend(anyhow::Error::new(err).context("Failed to decode Neo4j value"))
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| GraphError::Backend(anyhow::anyhow!("timestamp out of range: {}", ms)))
}

/// Decode an optional millis property; an absent property stays `None`
fn opt_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

/// Property that uniquely keys each label
fn key_prop(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Vehicle => "vehicle_uuid",
        _ => "id",
    }
}

/// Builder for `SET alias.prop = $param` clauses
///
/// Only supplied fields produce a clause, which gives partial-update merge
/// semantics without a separate code path per entity.
#[derive(Default)]
struct SetBuilder {
    clauses: Vec<String>,
    params: Vec<(String, BoltType)>,
}

impl SetBuilder {
    fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, alias: &str, prop: &str, value: impl Into<BoltType>) -> &mut Self {
        let param = format!("{}_{}", alias, prop);
        self.clauses.push(format!("{}.{} = ${}", alias, prop, param));
        self.params.push((param, value.into()));
        self
    }

    fn set_opt<T: Into<BoltType>>(&mut self, alias: &str, prop: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.set(alias, prop, value);
        }
        self
    }

    /// `SET ...` or an empty string
    fn clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("SET {}", self.clauses.join(", "))
        }
    }

    fn bind(self, mut q: Query) -> Query {
        for (name, value) in self.params {
            q = q.param(&name, value);
        }
        q
    }
}

// ============================================================================
// Property mapping
// ============================================================================

fn stop_props(stop: &StopNode) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set("n", "name", stop.name.clone())
        .set("n", "lat", stop.lat)
        .set("n", "lon", stop.lon)
        .set("n", "zone", stop.zone.clone())
        .set("n", "shelter", stop.shelter)
        .set("n", "created_at", to_millis(stop.created_at));
    set
}

fn stop_update_props(update: &UpdateStopRequest) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set_opt("n", "name", update.name.clone())
        .set_opt("n", "lat", update.lat)
        .set_opt("n", "lon", update.lon)
        .set_opt("n", "zone", update.zone.clone())
        .set_opt("n", "shelter", update.shelter);
    set
}

fn line_props(line: &LineNode) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set("n", "name", line.name.clone())
        .set("n", "mode", line.mode.clone())
        .set("n", "frequency_mins", line.frequency_mins as i64)
        .set("n", "active", line.active);
    set
}

fn line_update_props(update: &UpdateLineRequest) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set_opt("n", "name", update.name.clone())
        .set_opt("n", "mode", update.mode.clone())
        .set_opt("n", "frequency_mins", update.frequency_mins.map(i64::from))
        .set_opt("n", "active", update.active);
    set
}

fn vehicle_props(vehicle: &VehicleNode) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set("n", "id", vehicle.id.clone())
        .set("n", "capacity", vehicle.capacity as i64)
        .set("n", "status", vehicle.status.as_str())
        .set_opt("n", "last_seen_ts", vehicle.last_seen_ts.map(to_millis))
        .set_opt("n", "last_known_lat", vehicle.last_known_lat)
        .set_opt("n", "last_known_lon", vehicle.last_known_lon);
    set
}

fn vehicle_update_props(update: &UpdateVehicleRequest) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set_opt("n", "id", update.id.clone())
        .set_opt("n", "capacity", update.capacity.map(i64::from))
        .set_opt("n", "status", update.status.map(|s| s.as_str()))
        .set_opt("n", "last_seen_ts", update.last_seen_ts.map(to_millis))
        .set_opt("n", "last_known_lat", update.last_known_lat)
        .set_opt("n", "last_known_lon", update.last_known_lon);
    set
}

fn depot_props(depot: &DepotNode) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set("n", "name", depot.name.clone())
        .set("n", "lat", depot.lat)
        .set("n", "lon", depot.lon)
        .set("n", "capacity", depot.capacity as i64);
    set
}

fn depot_update_props(update: &UpdateDepotRequest) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set_opt("n", "name", update.name.clone())
        .set_opt("n", "lat", update.lat)
        .set_opt("n", "lon", update.lon)
        .set_opt("n", "capacity", update.capacity.map(i64::from));
    set
}

fn next_props(edge: &NextEdge) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set_opt("r", "travel_time", edge.travel_time.map(i64::from))
        .set_opt("r", "distance", edge.distance.map(i64::from))
        .set("r", "created_at", to_millis(edge.created_at))
        .set_opt("r", "last_calibrated", edge.last_calibrated.map(to_millis))
        .set("r", "calibration_count", edge.calibration_count as i64);
    set
}

fn next_update_props(update: &UpdateNextRequest) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set_opt("r", "travel_time", update.travel_time.map(i64::from))
        .set_opt("r", "distance", update.distance.map(i64::from))
        .set_opt("r", "last_calibrated", update.last_calibrated.map(to_millis))
        .set_opt("r", "calibration_count", update.calibration_count.map(i64::from));
    set
}

fn since_props(since: Option<DateTime<Utc>>) -> SetBuilder {
    let mut set = SetBuilder::new();
    set.set_opt("r", "since", since.map(to_millis));
    set
}

fn node_to_stop(node: &Node) -> Result<StopNode> {
    Ok(StopNode {
        id: node.get("id")?,
        name: node.get("name").unwrap_or_default(),
        lat: node.get("lat")?,
        lon: node.get("lon")?,
        zone: node.get("zone").unwrap_or_default(),
        shelter: node.get("shelter").unwrap_or(false),
        created_at: opt_millis(node.get("created_at").ok())?.unwrap_or_else(Utc::now),
    })
}

fn node_to_line(node: &Node) -> Result<LineNode> {
    Ok(LineNode {
        id: node.get("id")?,
        name: node.get("name").unwrap_or_default(),
        mode: node.get("mode").unwrap_or_default(),
        frequency_mins: node.get::<i64>("frequency_mins").unwrap_or(0) as i32,
        active: node.get("active").unwrap_or(true),
    })
}

fn node_to_vehicle(node: &Node) -> Result<VehicleNode> {
    Ok(VehicleNode {
        vehicle_uuid: node.get("vehicle_uuid")?,
        id: node.get("id").unwrap_or_default(),
        capacity: node.get::<i64>("capacity").unwrap_or(0) as i32,
        status: node
            .get::<String>("status")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        last_seen_ts: opt_millis(node.get("last_seen_ts").ok())?,
        last_known_lat: node.get("last_known_lat").ok(),
        last_known_lon: node.get("last_known_lon").ok(),
    })
}

fn node_to_depot(node: &Node) -> Result<DepotNode> {
    Ok(DepotNode {
        id: node.get("id")?,
        name: node.get("name").unwrap_or_default(),
        lat: node.get("lat")?,
        lon: node.get("lon")?,
        capacity: node.get::<i64>("capacity").unwrap_or(0) as i32,
    })
}

/// Rows shaped `from_id, to_id, r`
fn row_to_next(row: &Row) -> Result<NextEdge> {
    let rel: Relation = row.get("r")?;
    Ok(NextEdge {
        from_id: row.get("from_id")?,
        to_id: row.get("to_id")?,
        travel_time: rel.get::<i64>("travel_time").ok().map(|v| v as i32),
        distance: rel.get::<i64>("distance").ok().map(|v| v as i32),
        created_at: opt_millis(rel.get("created_at").ok())?.unwrap_or_else(Utc::now),
        last_calibrated: opt_millis(rel.get("last_calibrated").ok())?,
        calibration_count: rel.get::<i64>("calibration_count").unwrap_or(0) as u32,
    })
}

fn row_to_serves(row: &Row) -> Result<ServesEdge> {
    Ok(ServesEdge {
        line_id: row.get("from_id")?,
        stop_id: row.get("to_id")?,
        order: row.get::<i64>("stop_order")? as i32,
    })
}

fn row_since(row: &Row) -> Result<DateTime<Utc>> {
    Ok(opt_millis(row.get("since").ok())?.unwrap_or_else(Utc::now))
}

fn row_to_assigned(row: &Row) -> Result<AssignedToEdge> {
    Ok(AssignedToEdge {
        vehicle_uuid: row.get("from_id")?,
        line_id: row.get("to_id")?,
        since: row_since(row)?,
    })
}

fn row_to_parked(row: &Row) -> Result<ParkedAtEdge> {
    Ok(ParkedAtEdge {
        vehicle_uuid: row.get("from_id")?,
        depot_id: row.get("to_id")?,
        since: row_since(row)?,
    })
}

/// `MATCH (a)-[r:TYPE]->(b)` with both endpoints keyed by parameters
fn edge_pattern(rel: RelationshipType) -> String {
    let (from_kind, to_kind) = rel.endpoints();
    format!(
        "(a:{} {{{}: $from_id}})-[r:{}]->(b:{} {{{}: $to_id}})",
        from_kind,
        key_prop(from_kind),
        rel,
        to_kind,
        key_prop(to_kind)
    )
}

/// Columns every relationship row carries
fn edge_return(rel: RelationshipType) -> String {
    let (from_kind, to_kind) = rel.endpoints();
    let extra = match rel {
        RelationshipType::Next => "r".to_string(),
        RelationshipType::Serves => "r.order AS stop_order".to_string(),
        _ => "r.since AS since".to_string(),
    };
    format!(
        "a.{} AS from_id, b.{} AS to_id, {}",
        key_prop(from_kind),
        key_prop(to_kind),
        extra
    )
}

/// Read a NEXT edge under its write lock
///
/// Setting and removing a scratch property takes the lock while leaving the
/// stored properties as they were.
fn next_lock_cypher() -> String {
    let rel = RelationshipType::Next;
    format!(
        "MATCH {} SET r._lock = true REMOVE r._lock RETURN {}",
        edge_pattern(rel),
        edge_return(rel)
    )
}

const CONSTRAINT_VIOLATION: &str = "Neo.ClientError.Schema.ConstraintValidationFailed";

/// Whether a backend error is Neo4j rejecting a write on a uniqueness constraint
fn is_constraint_violation(err: &GraphError) -> bool {
    match err {
        GraphError::Backend(e) => matches!(
            e.downcast_ref::<neo4rs::Error>(),
            Some(neo4rs::Error::Neo4j(n)) if n.code() == CONSTRAINT_VIOLATION
        ),
        _ => false,
    }
}

fn edge_not_found(rel: RelationshipType, from_id: &str, to_id: &str) -> GraphError {
    GraphError::not_found(rel.as_str(), RelationshipKey::new(rel, from_id, to_id).to_string())
}

/// Drain a transaction-bound row stream
async fn collect_rows(txn: &mut Txn, q: Query) -> Result<Vec<Row>> {
    let mut stream = txn.execute(q).await?;
    let mut rows = Vec::new();
    while let Some(row) = stream.next(txn.handle()).await? {
        rows.push(row);
    }
    Ok(rows)
}

/// Client for Neo4j operations
pub struct Neo4jClient {
    graph: Arc<Graph>,
}

impl Neo4jClient {
    /// Create a new Neo4j client
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        let client = Self {
            graph: Arc::new(graph),
        };

        // Initialize schema
        client.init_schema().await?;

        Ok(client)
    }

    /// Initialize the graph schema with constraints and indexes
    async fn init_schema(&self) -> Result<()> {
        let constraints = [
            "CREATE CONSTRAINT stop_id IF NOT EXISTS FOR (s:Stop) REQUIRE s.id IS UNIQUE",
            "CREATE CONSTRAINT line_id IF NOT EXISTS FOR (l:Line) REQUIRE l.id IS UNIQUE",
            "CREATE CONSTRAINT vehicle_uuid IF NOT EXISTS FOR (v:Vehicle) REQUIRE v.vehicle_uuid IS UNIQUE",
            "CREATE CONSTRAINT depot_id IF NOT EXISTS FOR (d:Depot) REQUIRE d.id IS UNIQUE",
        ];

        let indexes = [
            "CREATE INDEX stop_zone IF NOT EXISTS FOR (s:Stop) ON (s.zone)",
            "CREATE INDEX vehicle_status IF NOT EXISTS FOR (v:Vehicle) ON (v.status)",
        ];

        // Duplicate detection relies on these, so a failure aborts startup
        for constraint in constraints {
            self.graph
                .run(query(constraint))
                .await
                .with_context(|| format!("Failed to create constraint: {}", constraint))?;
        }

        for index in indexes {
            if let Err(e) = self.graph.run(query(index)).await {
                tracing::warn!("Failed to create index: {}", e);
            }
        }

        Ok(())
    }

    // ========================================================================
    // Generic node helpers
    // ========================================================================

    async fn create_node(&self, kind: NodeKind, key: &str, props: SetBuilder) -> Result<()> {
        require_id(kind.label(), key)?;
        let cypher = format!(
            r#"
            OPTIONAL MATCH (existing:{label} {{{prop}: $key}})
            WITH existing WHERE existing IS NULL
            CREATE (n:{label} {{{prop}: $key}})
            {set}
            RETURN count(n) AS created
            "#,
            label = kind,
            prop = key_prop(kind),
            set = props.clause()
        );
        let q = props.bind(query(&cypher).param("key", key));

        // A concurrent create can slip past the OPTIONAL MATCH and trip the constraint
        let created = match self.count_created(q).await {
            Err(e) if is_constraint_violation(&e) => 0,
            other => other?,
        };
        if created == 0 {
            return Err(GraphError::already_exists(kind.label(), key));
        }
        Ok(())
    }

    async fn count_created(&self, q: Query) -> Result<i64> {
        let mut result = self.graph.execute(q).await?;
        match result.next().await? {
            Some(row) => Ok(row.get::<i64>("created")?),
            None => Ok(0),
        }
    }

    async fn fetch_node(&self, kind: NodeKind, key: &str) -> Result<Node> {
        require_id(kind.label(), key)?;
        let cypher = format!(
            "MATCH (n:{} {{{}: $key}}) RETURN n",
            kind,
            key_prop(kind)
        );
        let mut result = self.graph.execute(query(&cypher).param("key", key)).await?;
        match result.next().await? {
            Some(row) => Ok(row.get("n")?),
            None => Err(GraphError::not_found(kind.label(), key)),
        }
    }

    async fn update_node(&self, kind: NodeKind, key: &str, props: SetBuilder) -> Result<Node> {
        require_id(kind.label(), key)?;
        let cypher = format!(
            "MATCH (n:{} {{{}: $key}}) {} RETURN n",
            kind,
            key_prop(kind),
            props.clause()
        );
        let q = props.bind(query(&cypher).param("key", key));
        let mut result = self.graph.execute(q).await?;
        match result.next().await? {
            Some(row) => Ok(row.get("n")?),
            None => Err(GraphError::not_found(kind.label(), key)),
        }
    }

    async fn delete_node(&self, kind: NodeKind, key: &str) -> Result<()> {
        require_id(kind.label(), key)?;
        let cypher = format!(
            "MATCH (n:{} {{{}: $key}}) DETACH DELETE n",
            kind,
            key_prop(kind)
        );
        self.graph.run(query(&cypher).param("key", key)).await?;
        Ok(())
    }

    async fn list_nodes(&self, kind: NodeKind) -> Result<Vec<Node>> {
        let cypher = format!(
            "MATCH (n:{label}) RETURN n ORDER BY n.{prop}",
            label = kind,
            prop = key_prop(kind)
        );
        let mut result = self.graph.execute(query(&cypher)).await?;
        let mut nodes = Vec::new();
        while let Some(row) = result.next().await? {
            nodes.push(row.get("n")?);
        }
        Ok(nodes)
    }

    // ========================================================================
    // Generic relationship helpers
    // ========================================================================

    /// Create a relationship after matching both endpoints.
    ///
    /// `unique` refuses a second edge between the pair; `status` is written to
    /// the vehicle endpoint in the same statement.
    async fn create_edge(
        &self,
        rel: RelationshipType,
        from_id: &str,
        to_id: &str,
        unique: bool,
        props: SetBuilder,
        status: Option<VehicleStatus>,
    ) -> Result<()> {
        require_endpoint_ids(rel, from_id, to_id)?;
        let (from_kind, to_kind) = rel.endpoints();

        let mut set = props.clause();
        if let Some(status) = status {
            let status_clause = format!("a.status = '{}'", status);
            set = if set.is_empty() {
                format!("SET {}", status_clause)
            } else {
                format!("{}, {}", set, status_clause)
            };
        }
        let guard = if unique {
            format!("WHERE NOT (a)-[:{}]->(b)", rel)
        } else {
            String::new()
        };
        let cypher = format!(
            r#"
            MATCH (a:{from_kind} {{{from_prop}: $from_id}}), (b:{to_kind} {{{to_prop}: $to_id}})
            {guard}
            CREATE (a)-[r:{rel}]->(b)
            {set}
            RETURN count(r) AS created
            "#,
            from_prop = key_prop(from_kind),
            to_prop = key_prop(to_kind),
        );
        let q = props.bind(
            query(&cypher)
                .param("from_id", from_id)
                .param("to_id", to_id),
        );

        let mut result = self.graph.execute(q).await?;
        let created = match result.next().await? {
            Some(row) => row.get::<i64>("created")?,
            None => 0,
        };
        if created > 0 {
            return Ok(());
        }

        // Nothing written: work out why
        let lookup = format!(
            r#"
            OPTIONAL MATCH (a:{from_kind} {{{from_prop}: $from_id}})
            OPTIONAL MATCH (b:{to_kind} {{{to_prop}: $to_id}})
            RETURN a IS NOT NULL AS has_from, b IS NOT NULL AS has_to
            "#,
            from_prop = key_prop(from_kind),
            to_prop = key_prop(to_kind),
        );
        let mut result = self
            .graph
            .execute(
                query(&lookup)
                    .param("from_id", from_id)
                    .param("to_id", to_id),
            )
            .await?;
        let (has_from, has_to) = match result.next().await? {
            Some(row) => (row.get::<bool>("has_from")?, row.get::<bool>("has_to")?),
            None => (false, false),
        };
        if !has_from {
            Err(GraphError::endpoint_not_found(rel.as_str(), from_kind.label(), from_id))
        } else if !has_to {
            Err(GraphError::endpoint_not_found(rel.as_str(), to_kind.label(), to_id))
        } else {
            Err(GraphError::already_exists(
                rel.as_str(),
                RelationshipKey::new(rel, from_id, to_id).to_string(),
            ))
        }
    }

    /// Most recent edge between the pair, after applying `props` to every copy
    async fn update_edge(
        &self,
        rel: RelationshipType,
        from_id: &str,
        to_id: &str,
        props: SetBuilder,
    ) -> Result<Row> {
        require_endpoint_ids(rel, from_id, to_id)?;
        let order = match rel {
            RelationshipType::AssignedTo | RelationshipType::ParkedAt => "ORDER BY since DESC",
            _ => "",
        };
        let cypher = format!(
            "MATCH {} {} RETURN {} {} LIMIT 1",
            edge_pattern(rel),
            props.clause(),
            edge_return(rel),
            order
        );
        let q = props.bind(
            query(&cypher)
                .param("from_id", from_id)
                .param("to_id", to_id),
        );
        let mut result = self.graph.execute(q).await?;
        result
            .next()
            .await?
            .ok_or_else(|| edge_not_found(rel, from_id, to_id))
    }

    async fn fetch_edge(&self, rel: RelationshipType, from_id: &str, to_id: &str) -> Result<Row> {
        self.update_edge(rel, from_id, to_id, SetBuilder::new()).await
    }

    async fn delete_edge(&self, rel: RelationshipType, from_id: &str, to_id: &str) -> Result<()> {
        require_endpoint_ids(rel, from_id, to_id)?;
        let cypher = format!("MATCH {} DELETE r", edge_pattern(rel));
        self.graph
            .run(
                query(&cypher)
                    .param("from_id", from_id)
                    .param("to_id", to_id),
            )
            .await?;
        Ok(())
    }

    // ========================================================================
    // Stop operations
    // ========================================================================

    pub async fn create_stop(&self, stop: &StopNode) -> Result<()> {
        self.create_node(NodeKind::Stop, &stop.id, stop_props(stop))
            .await
    }

    pub async fn get_stop(&self, id: &str) -> Result<StopNode> {
        node_to_stop(&self.fetch_node(NodeKind::Stop, id).await?)
    }

    pub async fn update_stop(&self, id: &str, update: &UpdateStopRequest) -> Result<StopNode> {
        node_to_stop(
            &self
                .update_node(NodeKind::Stop, id, stop_update_props(update))
                .await?,
        )
    }

    pub async fn delete_stop(&self, id: &str) -> Result<()> {
        self.delete_node(NodeKind::Stop, id).await
    }

    pub async fn list_stops(&self) -> Result<Vec<StopNode>> {
        self.list_nodes(NodeKind::Stop)
            .await?
            .iter()
            .map(node_to_stop)
            .collect()
    }

    // ========================================================================
    // Line operations
    // ========================================================================

    pub async fn create_line(&self, line: &LineNode) -> Result<()> {
        self.create_node(NodeKind::Line, &line.id, line_props(line))
            .await
    }

    pub async fn get_line(&self, id: &str) -> Result<LineNode> {
        node_to_line(&self.fetch_node(NodeKind::Line, id).await?)
    }

    pub async fn update_line(&self, id: &str, update: &UpdateLineRequest) -> Result<LineNode> {
        node_to_line(
            &self
                .update_node(NodeKind::Line, id, line_update_props(update))
                .await?,
        )
    }

    pub async fn delete_line(&self, id: &str) -> Result<()> {
        self.delete_node(NodeKind::Line, id).await
    }

    pub async fn list_lines(&self) -> Result<Vec<LineNode>> {
        self.list_nodes(NodeKind::Line)
            .await?
            .iter()
            .map(node_to_line)
            .collect()
    }

    // ========================================================================
    // Vehicle operations
    // ========================================================================

    pub async fn create_vehicle(&self, vehicle: &VehicleNode) -> Result<()> {
        self.create_node(
            NodeKind::Vehicle,
            &vehicle.vehicle_uuid,
            vehicle_props(vehicle),
        )
        .await
    }

    pub async fn get_vehicle(&self, vehicle_uuid: &str) -> Result<VehicleNode> {
        node_to_vehicle(&self.fetch_node(NodeKind::Vehicle, vehicle_uuid).await?)
    }

    pub async fn update_vehicle(
        &self,
        vehicle_uuid: &str,
        update: &UpdateVehicleRequest,
    ) -> Result<VehicleNode> {
        node_to_vehicle(
            &self
                .update_node(NodeKind::Vehicle, vehicle_uuid, vehicle_update_props(update))
                .await?,
        )
    }

    pub async fn delete_vehicle(&self, vehicle_uuid: &str) -> Result<()> {
        self.delete_node(NodeKind::Vehicle, vehicle_uuid).await
    }

    pub async fn list_vehicles(&self) -> Result<Vec<VehicleNode>> {
        self.list_nodes(NodeKind::Vehicle)
            .await?
            .iter()
            .map(node_to_vehicle)
            .collect()
    }

    // ========================================================================
    // Depot operations
    // ========================================================================

    pub async fn create_depot(&self, depot: &DepotNode) -> Result<()> {
        self.create_node(NodeKind::Depot, &depot.id, depot_props(depot))
            .await
    }

    pub async fn get_depot(&self, id: &str) -> Result<DepotNode> {
        node_to_depot(&self.fetch_node(NodeKind::Depot, id).await?)
    }

    pub async fn update_depot(&self, id: &str, update: &UpdateDepotRequest) -> Result<DepotNode> {
        node_to_depot(
            &self
                .update_node(NodeKind::Depot, id, depot_update_props(update))
                .await?,
        )
    }

    pub async fn delete_depot(&self, id: &str) -> Result<()> {
        self.delete_node(NodeKind::Depot, id).await
    }

    pub async fn list_depots(&self) -> Result<Vec<DepotNode>> {
        self.list_nodes(NodeKind::Depot)
            .await?
            .iter()
            .map(node_to_depot)
            .collect()
    }

    // ========================================================================
    // NEXT
    // ========================================================================

    pub async fn create_next(&self, edge: &NextEdge) -> Result<()> {
        self.create_edge(
            RelationshipType::Next,
            &edge.from_id,
            &edge.to_id,
            true,
            next_props(edge),
            None,
        )
        .await
    }

    pub async fn get_next(&self, from_id: &str, to_id: &str) -> Result<NextEdge> {
        row_to_next(&self.fetch_edge(RelationshipType::Next, from_id, to_id).await?)
    }

    pub async fn update_next(
        &self,
        from_id: &str,
        to_id: &str,
        update: &UpdateNextRequest,
    ) -> Result<NextEdge> {
        row_to_next(
            &self
                .update_edge(RelationshipType::Next, from_id, to_id, next_update_props(update))
                .await?,
        )
    }

    pub async fn delete_next(&self, from_id: &str, to_id: &str) -> Result<()> {
        self.delete_edge(RelationshipType::Next, from_id, to_id)
            .await
    }

    // ========================================================================
    // SERVES
    // ========================================================================

    pub async fn create_serves(&self, edge: &ServesEdge) -> Result<()> {
        let mut props = SetBuilder::new();
        props.set("r", "order", edge.order as i64);
        self.create_edge(
            RelationshipType::Serves,
            &edge.line_id,
            &edge.stop_id,
            true,
            props,
            None,
        )
        .await
    }

    pub async fn get_serves(&self, line_id: &str, stop_id: &str) -> Result<ServesEdge> {
        row_to_serves(
            &self
                .fetch_edge(RelationshipType::Serves, line_id, stop_id)
                .await?,
        )
    }

    pub async fn update_serves(
        &self,
        line_id: &str,
        stop_id: &str,
        update: &UpdateServesRequest,
    ) -> Result<ServesEdge> {
        let mut props = SetBuilder::new();
        props.set_opt("r", "order", update.order.map(i64::from));
        row_to_serves(
            &self
                .update_edge(RelationshipType::Serves, line_id, stop_id, props)
                .await?,
        )
    }

    pub async fn delete_serves(&self, line_id: &str, stop_id: &str) -> Result<()> {
        self.delete_edge(RelationshipType::Serves, line_id, stop_id)
            .await
    }

    pub async fn list_line_stops(&self, line_id: &str) -> Result<Vec<ServesEdge>> {
        require_id("Line", line_id)?;
        let q = query(
            r#"
            MATCH (l:Line {id: $line_id})
            OPTIONAL MATCH (l)-[r:SERVES]->(s:Stop)
            RETURN l.id AS from_id, s.id AS to_id, r.order AS stop_order
            ORDER BY stop_order, to_id
            "#,
        )
        .param("line_id", line_id);

        let mut result = self.graph.execute(q).await?;
        let mut line_found = false;
        let mut edges = Vec::new();
        while let Some(row) = result.next().await? {
            line_found = true;
            if row.get::<String>("to_id").is_ok() {
                edges.push(row_to_serves(&row)?);
            }
        }
        if !line_found {
            return Err(GraphError::not_found("Line", line_id));
        }
        Ok(edges)
    }

    // ========================================================================
    // ASSIGNED_TO
    // ========================================================================

    pub async fn create_assigned_to(&self, edge: &AssignedToEdge) -> Result<()> {
        self.create_edge(
            RelationshipType::AssignedTo,
            &edge.vehicle_uuid,
            &edge.line_id,
            false,
            since_props(Some(edge.since)),
            Some(VehicleStatus::Active),
        )
        .await
    }

    pub async fn get_assigned_to(&self, vehicle_uuid: &str, line_id: &str) -> Result<AssignedToEdge> {
        row_to_assigned(
            &self
                .fetch_edge(RelationshipType::AssignedTo, vehicle_uuid, line_id)
                .await?,
        )
    }

    pub async fn update_assigned_to(
        &self,
        vehicle_uuid: &str,
        line_id: &str,
        update: &UpdateSinceRequest,
    ) -> Result<AssignedToEdge> {
        row_to_assigned(
            &self
                .update_edge(
                    RelationshipType::AssignedTo,
                    vehicle_uuid,
                    line_id,
                    since_props(update.since),
                )
                .await?,
        )
    }

    pub async fn delete_assigned_to(&self, vehicle_uuid: &str, line_id: &str) -> Result<()> {
        self.delete_edge(RelationshipType::AssignedTo, vehicle_uuid, line_id)
            .await
    }

    // ========================================================================
    // PARKED_AT
    // ========================================================================

    pub async fn create_parked_at(&self, edge: &ParkedAtEdge) -> Result<()> {
        self.create_edge(
            RelationshipType::ParkedAt,
            &edge.vehicle_uuid,
            &edge.depot_id,
            false,
            since_props(Some(edge.since)),
            Some(VehicleStatus::Idle),
        )
        .await
    }

    pub async fn get_parked_at(&self, vehicle_uuid: &str, depot_id: &str) -> Result<ParkedAtEdge> {
        row_to_parked(
            &self
                .fetch_edge(RelationshipType::ParkedAt, vehicle_uuid, depot_id)
                .await?,
        )
    }

    pub async fn update_parked_at(
        &self,
        vehicle_uuid: &str,
        depot_id: &str,
        update: &UpdateSinceRequest,
    ) -> Result<ParkedAtEdge> {
        row_to_parked(
            &self
                .update_edge(
                    RelationshipType::ParkedAt,
                    vehicle_uuid,
                    depot_id,
                    since_props(update.since),
                )
                .await?,
        )
    }

    pub async fn delete_parked_at(&self, vehicle_uuid: &str, depot_id: &str) -> Result<()> {
        self.delete_edge(RelationshipType::ParkedAt, vehicle_uuid, depot_id)
            .await
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Read every node and relationship inside one transaction
    pub async fn snapshot(&self) -> Result<NetworkSnapshot> {
        let mut txn = self.graph.start_txn().await?;
        match Self::snapshot_in(&mut txn).await {
            Ok(snapshot) => {
                txn.commit().await?;
                tracing::debug!(
                    stops = snapshot.stops.len(),
                    next_edges = snapshot.next_edges.len(),
                    vehicles = snapshot.vehicles.len(),
                    "Loaded network snapshot"
                );
                Ok(snapshot)
            }
            Err(e) => {
                if let Err(rb) = txn.rollback().await {
                    tracing::warn!("Snapshot rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    async fn snapshot_in(txn: &mut Txn) -> Result<NetworkSnapshot> {
        async fn nodes<T>(
            txn: &mut Txn,
            kind: NodeKind,
            decode: fn(&Node) -> Result<T>,
        ) -> Result<Vec<T>> {
            let cypher = format!(
                "MATCH (n:{label}) RETURN n ORDER BY n.{prop}",
                label = kind,
                prop = key_prop(kind)
            );
            collect_rows(txn, query(&cypher))
                .await?
                .iter()
                .map(|row| decode(&row.get::<Node>("n")?))
                .collect()
        }

        async fn edges<T>(
            txn: &mut Txn,
            rel: RelationshipType,
            decode: fn(&Row) -> Result<T>,
        ) -> Result<Vec<T>> {
            let (from_kind, to_kind) = rel.endpoints();
            let cypher = format!(
                "MATCH (a:{})-[r:{}]->(b:{}) RETURN {} ORDER BY from_id, to_id",
                from_kind,
                rel,
                to_kind,
                edge_return(rel)
            );
            collect_rows(txn, query(&cypher))
                .await?
                .iter()
                .map(decode)
                .collect()
        }

        Ok(NetworkSnapshot {
            stops: nodes(txn, NodeKind::Stop, node_to_stop).await?,
            lines: nodes(txn, NodeKind::Line, node_to_line).await?,
            vehicles: nodes(txn, NodeKind::Vehicle, node_to_vehicle).await?,
            depots: nodes(txn, NodeKind::Depot, node_to_depot).await?,
            next_edges: edges(txn, RelationshipType::Next, row_to_next).await?,
            serves: edges(txn, RelationshipType::Serves, row_to_serves).await?,
            assignments: edges(txn, RelationshipType::AssignedTo, row_to_assigned).await?,
            parkings: edges(txn, RelationshipType::ParkedAt, row_to_parked).await?,
            taken_at: Utc::now(),
        })
    }

    // ========================================================================
    // Transactional primitives
    // ========================================================================

    /// Dispatch transaction, serialized through the `:DispatchLock` node
    pub async fn assign_vehicle_atomically(
        &self,
        line_id: &str,
        select: &VehicleSelector,
    ) -> Result<Assignment> {
        require_id("Line", line_id)?;
        let mut txn = self.graph.start_txn().await?;
        match Self::assign_in(&mut txn, line_id, select).await {
            Ok(assignment) => {
                txn.commit().await?;
                Ok(assignment)
            }
            Err(e) => {
                if let Err(rb) = txn.rollback().await {
                    tracing::warn!("Dispatch rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    async fn assign_in(
        txn: &mut Txn,
        line_id: &str,
        select: &VehicleSelector,
    ) -> Result<Assignment> {
        // Write lock on the singleton; held until commit/rollback
        txn.run(query(
            "MERGE (l:DispatchLock {id: 'dispatch'}) SET l.touched = timestamp()",
        ))
        .await?;

        let origin_rows = collect_rows(
            txn,
            query(
                r#"
                MATCH (:Line {id: $line_id})-[r:SERVES]->(s:Stop)
                WHERE r.order = 1
                RETURN s.lat AS lat, s.lon AS lon
                ORDER BY s.id
                LIMIT 1
                "#,
            )
            .param("line_id", line_id),
        )
        .await?;
        let origin = match origin_rows.first() {
            Some(row) => Coordinates {
                lat: row.get("lat")?,
                lon: row.get("lon")?,
            },
            None => return Err(GraphError::NoOriginStop(line_id.to_string())),
        };

        let candidates = collect_rows(
            txn,
            query(
                r#"
                MATCH (v:Vehicle)
                WHERE v.status = 'IDLE'
                  AND v.last_known_lat IS NOT NULL
                  AND v.last_known_lon IS NOT NULL
                RETURN v
                ORDER BY v.vehicle_uuid
                "#,
            ),
        )
        .await?
        .iter()
        .map(|row| node_to_vehicle(&row.get::<Node>("v")?))
        .collect::<Result<Vec<_>>>()?;

        let chosen = select(origin, &candidates)
            .filter(|uuid| candidates.iter().any(|v| &v.vehicle_uuid == uuid))
            .ok_or_else(|| GraphError::NoIdleVehicleAvailable(line_id.to_string()))?;

        let since = Utc::now();
        let rows = collect_rows(
            txn,
            query(
                r#"
                MATCH (v:Vehicle {vehicle_uuid: $vehicle_uuid}), (l:Line {id: $line_id})
                CREATE (v)-[:ASSIGNED_TO {since: $since}]->(l)
                SET v.status = 'ACTIVE'
                RETURN v
                "#,
            )
            .param("vehicle_uuid", chosen.as_str())
            .param("line_id", line_id)
            .param("since", to_millis(since)),
        )
        .await?;
        let vehicle = match rows.first() {
            Some(row) => node_to_vehicle(&row.get::<Node>("v")?)?,
            None => return Err(GraphError::not_found("Vehicle", chosen)),
        };

        Ok(Assignment {
            vehicle,
            line_id: line_id.to_string(),
            since,
        })
    }

    /// Compare-and-set on one NEXT edge inside a transaction
    pub async fn update_next_if(
        &self,
        from_id: &str,
        to_id: &str,
        decide: &NextEdgeDecision,
    ) -> Result<NextEdgeUpdate> {
        require_endpoint_ids(RelationshipType::Next, from_id, to_id)?;
        let mut txn = self.graph.start_txn().await?;
        match Self::update_next_in(&mut txn, from_id, to_id, decide).await {
            Ok(outcome) => {
                txn.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rb) = txn.rollback().await {
                    tracing::warn!("Recalibration rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    async fn update_next_in(
        txn: &mut Txn,
        from_id: &str,
        to_id: &str,
        decide: &NextEdgeDecision,
    ) -> Result<NextEdgeUpdate> {
        let rel = RelationshipType::Next;

        let rows = collect_rows(
            txn,
            query(&next_lock_cypher())
                .param("from_id", from_id)
                .param("to_id", to_id),
        )
        .await?;
        let current = match rows.first() {
            Some(row) => row_to_next(row)?,
            None => {
                return Err(GraphError::EdgeNotFound {
                    from: from_id.to_string(),
                    to: to_id.to_string(),
                })
            }
        };

        let Some(update) = decide(&current)? else {
            return Ok(NextEdgeUpdate {
                edge: current,
                applied: false,
            });
        };

        let props = next_update_props(&update);
        let cypher = format!(
            "MATCH {} {} RETURN {}",
            edge_pattern(rel),
            props.clause(),
            edge_return(rel)
        );
        let rows = collect_rows(
            txn,
            props.bind(
                query(&cypher)
                    .param("from_id", from_id)
                    .param("to_id", to_id),
            ),
        )
        .await?;
        let edge = match rows.first() {
            Some(row) => row_to_next(row)?,
            None => return Err(edge_not_found(rel, from_id, to_id)),
        };

        Ok(NextEdgeUpdate {
            edge,
            applied: true,
        })
    }
}
