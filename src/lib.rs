//! Transit Graph
//!
//! An operations graph for a public-transport network:
//! - Stops, lines, vehicles and depots with typed relationships
//!   (NEXT, SERVES, ASSIGNED_TO, PARKED_AT) behind one `GraphStore` trait
//! - In-memory and Neo4j backends with the same contract
//! - Hop-bounded shortest paths over NEXT edges
//! - Nearest-idle-vehicle dispatch and travel-time recalibration
//! - Read-only network analytics and report data

pub mod analytics;
pub mod calibration;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod seed;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

use analytics::{AnalyticsEngine, GraphAnalyticsEngine, ReportBuilder};
use anyhow::{bail, Context, Result};
use calibration::RecalibrationEngine;
use dispatch::DispatchPlanner;
use network::PathFinder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use store::{GraphStore, MemoryGraphStore, Neo4jClient};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub store: StoreYamlConfig,
    pub neo4j: Neo4jYamlConfig,
}

/// Store configuration section
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreYamlConfig {
    pub backend: StoreBackend,
    /// Optional YAML network seed applied at startup
    pub seed_path: Option<PathBuf>,
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "transit123".into(),
        }
    }
}

/// Which `GraphStore` implementation backs the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Neo4j,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "neo4j" => Ok(Self::Neo4j),
            other => bail!("Unknown store backend '{}', expected memory or neo4j", other),
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub seed_path: Option<PathBuf>,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
}

impl Config {
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let store_backend = match std::env::var("TRANSIT_STORE_BACKEND") {
            Ok(value) => value.parse().context("Invalid TRANSIT_STORE_BACKEND")?,
            Err(_) => yaml.store.backend,
        };

        Ok(Self {
            store_backend,
            seed_path: std::env::var("TRANSIT_SEED_PATH")
                .ok()
                .map(PathBuf::from)
                .or(yaml.store.seed_path),
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GraphStore>,
    pub config: Arc<Config>,
    pub paths: Arc<PathFinder>,
    pub dispatch: Arc<DispatchPlanner>,
    pub calibration: Arc<RecalibrationEngine>,
    pub analytics: Arc<dyn AnalyticsEngine>,
    pub reports: Arc<ReportBuilder>,
}

impl AppState {
    /// Connect the configured backend, apply the seed if any, and build the engines
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn GraphStore> = match config.store_backend {
            StoreBackend::Memory => Arc::new(MemoryGraphStore::new()),
            StoreBackend::Neo4j => Arc::new(
                Neo4jClient::new(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
                    .await
                    .with_context(|| format!("Failed to connect to Neo4j at {}", config.neo4j_uri))?,
            ),
        };

        if let Some(path) = &config.seed_path {
            seed::NetworkSeed::load(path)?.apply(store.as_ref()).await?;
        }

        Ok(Self::with_store(store, config))
    }

    /// Build the engines on top of an existing store
    pub fn with_store(store: Arc<dyn GraphStore>, config: Config) -> Self {
        let paths = Arc::new(PathFinder::new(store.clone()));
        let analytics: Arc<dyn AnalyticsEngine> =
            Arc::new(GraphAnalyticsEngine::new(store.clone()));
        Self {
            dispatch: Arc::new(DispatchPlanner::new(store.clone())),
            calibration: Arc::new(RecalibrationEngine::new(store.clone())),
            reports: Arc::new(ReportBuilder::new(analytics.clone(), paths.clone())),
            analytics,
            paths,
            config: Arc::new(config),
            store,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
