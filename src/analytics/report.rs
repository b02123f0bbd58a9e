//! Report assembly.
//!
//! Collects the read-only projections a report renderer consumes: vehicles
//! by depot, stops by zone, the most connected stops and an optional route.
//! Rendering (PDF or otherwise) belongs to the consumer; this module never
//! writes to the store.

use crate::error::Result;
use crate::network::{PathFinder, PathResult};
use crate::store::StopNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::engine::AnalyticsEngine;
use super::models::{ConnectedStop, VehicleSummary};

fn default_top_stops() -> usize {
    10
}

/// Route to include in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteQuery {
    pub start_id: String,
    pub end_id: String,
    pub max_hops: u32,
}

/// What to put in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default = "default_top_stops")]
    pub top_stops_limit: usize,
    #[serde(default)]
    pub route: Option<RouteQuery>,
}

impl Default for ReportRequest {
    fn default() -> Self {
        Self {
            top_stops_limit: default_top_stops(),
            route: None,
        }
    }
}

/// Data behind a network status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkReport {
    pub generated_at: DateTime<Utc>,
    pub vehicles_by_depot: BTreeMap<String, Vec<VehicleSummary>>,
    pub stops_by_zone: BTreeMap<String, Vec<StopNode>>,
    pub top_connected_stops: Vec<ConnectedStop>,
    /// Present when the request asked for a route
    pub route: Option<PathResult>,
}

/// Builds `NetworkReport`s from the analytics and routing components.
pub struct ReportBuilder {
    analytics: Arc<dyn AnalyticsEngine>,
    paths: Arc<PathFinder>,
}

impl ReportBuilder {
    pub fn new(analytics: Arc<dyn AnalyticsEngine>, paths: Arc<PathFinder>) -> Self {
        Self { analytics, paths }
    }

    /// Gather every section concurrently. A requested route that does not
    /// exist fails the whole report with `NoPathFound`.
    pub async fn build(&self, request: &ReportRequest) -> Result<NetworkReport> {
        let route = async {
            match &request.route {
                Some(q) => self
                    .paths
                    .shortest_path(&q.start_id, &q.end_id, q.max_hops)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let (vehicles_by_depot, stops_by_zone, top_connected_stops, route) = futures::try_join!(
            self.analytics.vehicles_by_depot(),
            self.analytics.stops_by_zone(),
            self.analytics.top_connected_stops(request.top_stops_limit),
            route,
        )?;

        tracing::debug!(
            depots = vehicles_by_depot.len(),
            zones = stops_by_zone.len(),
            with_route = route.is_some(),
            "Assembled network report"
        );

        Ok(NetworkReport {
            generated_at: Utc::now(),
            vehicles_by_depot,
            stops_by_zone,
            top_connected_stops,
            route,
        })
    }
}
