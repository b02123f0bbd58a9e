//! Stop network routing.
//!
//! ## Architecture
//!
//! ```text
//! GraphStore::snapshot ──► extraction ──► petgraph::DiGraph (stops + NEXT)
//!                                              │
//!                                     PathFinder (bounded BFS)
//! ```
//!
//! ## Modules
//!
//! - [`models`]: `StopGraph` (petgraph wrapper with id ↔ NodeIndex mapping) and `PathResult`
//! - [`extraction`]: snapshot → `StopGraph` conversion
//! - [`pathfinder`]: `PathFinder`, fewest-hop routing bounded by a hop budget

pub mod extraction;
pub mod models;
pub mod pathfinder;

pub use extraction::extract_stop_graph;
pub use models::{NextHop, PathResult, StopGraph};
pub use pathfinder::PathFinder;
