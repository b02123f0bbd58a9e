//! Read-only network analytics.
//!
//! ## Architecture
//!
//! ```text
//! GraphStore::snapshot ──► algorithms (pure aggregation) ──► AnalyticsEngine
//!                                                                 │
//!                                             report (assembly for renderers)
//! ```
//!
//! ## Modules
//!
//! - [`models`]: result records (TopPair, DepotIdleStat, DepotOccupancy, ...)
//! - [`algorithms`]: aggregation functions over a `NetworkSnapshot`
//! - [`engine`]: `AnalyticsEngine` trait and `GraphAnalyticsEngine`
//! - [`report`]: `NetworkReport` assembly for the reporting collaborator

pub mod algorithms;
pub mod engine;
pub mod models;
pub mod report;

pub use engine::{AnalyticsEngine, GraphAnalyticsEngine};
pub use models::{ConnectedStop, DepotIdleStat, DepotOccupancy, TopPair, VehicleSummary};
pub use report::{NetworkReport, ReportBuilder, ReportRequest};
