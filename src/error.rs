//! Typed failures for every graph operation.
//!
//! Callers match on the variant; none of these are retried internally.

use thiserror::Error;

/// Result alias used across the store, routing, dispatch and analytics layers.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Error type for graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Empty or malformed identifier / argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested node or relationship does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Relationship creation referenced a node that does not exist.
    #[error("cannot create {relationship}: {kind} {id} does not exist")]
    EndpointNotFound {
        relationship: &'static str,
        kind: &'static str,
        id: String,
    },

    /// A node or unique relationship with this key is already stored.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// No NEXT path within the hop budget.
    #[error("no path from {from} to {to} within {max_hops} hops")]
    NoPathFound {
        from: String,
        to: String,
        max_hops: u32,
    },

    /// The line has no SERVES edge with order 1.
    #[error("line {0} has no origin stop (SERVES order 1)")]
    NoOriginStop(String),

    /// No IDLE vehicle with a known position is available.
    #[error("no idle vehicle available for line {0}")]
    NoIdleVehicleAvailable(String),

    /// The NEXT edge is missing or has no travel time.
    #[error("NEXT edge {from} -> {to} not found or has no travel_time")]
    EdgeNotFound { from: String, to: String },

    /// Storage driver failure (connection, query, decoding).
    #[error("graph backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl GraphError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        GraphError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        GraphError::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn endpoint_not_found(
        relationship: &'static str,
        kind: &'static str,
        id: impl Into<String>,
    ) -> Self {
        GraphError::EndpointNotFound {
            relationship,
            kind,
            id: id.into(),
        }
    }

    /// True for `NotFound` of any kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. })
    }
}

/// Reject empty (or whitespace-only) identifiers.
pub(crate) fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(GraphError::InvalidArgument(format!("{kind} id must not be empty")));
    }
    Ok(())
}
