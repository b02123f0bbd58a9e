//! Graph storage: models, the GraphStore contract and its two backends

mod impl_graph_store;
pub mod memory;
pub mod models;
pub mod neo4j;
pub mod traits;

pub use memory::MemoryGraphStore;
pub use models::*;
pub use neo4j::Neo4jClient;
pub use traits::{GraphStore, NextEdgeDecision, NextEdgeUpdate, VehicleSelector};
