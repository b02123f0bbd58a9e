//! NEXT travel-time recalibration.
//!
//! An observed average only replaces the stored travel time when it exceeds
//! it by more than 20%. Below the threshold the call is a no-op, not an error.

use crate::error::{require_id, GraphError, Result};
use crate::store::{GraphStore, NextEdge, UpdateNextRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `observed > current * 1.2`, evaluated exactly in integers
pub fn exceeds_threshold(current: i32, observed: i32) -> bool {
    i64::from(observed) * 5 > i64::from(current) * 6
}

/// Result of a recalibration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    pub from_id: String,
    pub to_id: String,
    /// Travel time after the call (unchanged on a no-op)
    pub travel_time: i32,
    pub calibration_count: u32,
    pub last_calibrated: Option<DateTime<Utc>>,
    /// Whether the edge was rewritten
    pub updated: bool,
}

/// Threshold-gated NEXT edge updates.
pub struct RecalibrationEngine {
    store: Arc<dyn GraphStore>,
}

impl RecalibrationEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Recalibrate NEXT(from → to) against an observed average travel time.
    ///
    /// Fails with `EdgeNotFound` when the edge is missing or has no travel
    /// time yet. The read and the conditional write form one compare-and-set,
    /// so concurrent calls on the same edge serialize.
    pub async fn recalibrate_next(
        &self,
        from_id: &str,
        to_id: &str,
        observed_avg: i32,
    ) -> Result<CalibrationOutcome> {
        require_id("Stop", from_id)?;
        require_id("Stop", to_id)?;

        let (from, to) = (from_id.to_string(), to_id.to_string());
        let decide = move |edge: &NextEdge| -> Result<Option<UpdateNextRequest>> {
            let current = edge.travel_time.ok_or_else(|| GraphError::EdgeNotFound {
                from: from.clone(),
                to: to.clone(),
            })?;
            if !exceeds_threshold(current, observed_avg) {
                return Ok(None);
            }
            Ok(Some(UpdateNextRequest {
                travel_time: Some(observed_avg),
                calibration_count: Some(edge.calibration_count + 1),
                last_calibrated: Some(Utc::now()),
                ..Default::default()
            }))
        };

        let result = self.store.update_next_if(from_id, to_id, &decide).await?;
        let edge = result.edge;

        if result.applied {
            tracing::info!(
                from = from_id,
                to = to_id,
                travel_time = ?edge.travel_time,
                calibration_count = edge.calibration_count,
                "Recalibrated NEXT travel time"
            );
        } else {
            tracing::debug!(
                from = from_id,
                to = to_id,
                observed_avg,
                "Observed travel time within threshold, edge unchanged"
            );
        }

        Ok(CalibrationOutcome {
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            travel_time: edge.travel_time.unwrap_or(observed_avg),
            calibration_count: edge.calibration_count,
            last_calibrated: edge.last_calibrated,
            updated: result.applied,
        })
    }
}
