//! Transit Graph - command line
//!
//! Runs one network operation against the configured store and prints the
//! result as JSON.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transit_graph::analytics::report::RouteQuery;
use transit_graph::analytics::ReportRequest;
use transit_graph::{AppState, Config, StoreBackend};

#[derive(Parser)]
#[command(name = "transit-graph")]
#[command(about = "Transit network routing, dispatch and analytics")]
struct Cli {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store backend (overrides config)
    #[arg(long, global = true)]
    backend: Option<StoreBackend>,

    /// Network seed applied before the command runs (overrides config)
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fewest-hop path between two stops along NEXT edges
    ShortestPath {
        start: String,
        end: String,
        #[arg(long, default_value = "10")]
        max_hops: u32,
    },

    /// Assign the idle vehicle nearest to a line's origin stop
    Assign { line_id: String },

    /// Feed an observed average travel time for NEXT(from -> to)
    Recalibrate {
        from: String,
        to: String,
        observed_avg: i32,
    },

    /// Stop pairs served by the most lines
    TopPairs {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Depots ranked by idle parked vehicles
    DepotStats {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Capacity in active service per depot
    Occupancy,

    /// Stops with the most NEXT connections
    TopStops {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Network report data, optionally with a route between two stops
    Report {
        #[arg(long, default_value = "10")]
        top_stops: usize,
        #[arg(long, requires = "route_to")]
        route_from: Option<String>,
        #[arg(long, requires = "route_from")]
        route_to: Option<String>,
        #[arg(long, default_value = "10")]
        max_hops: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,transit_graph=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.store_backend = backend;
    }
    if let Some(seed) = cli.seed {
        config.seed_path = Some(seed);
    }

    let state = AppState::new(config).await?;

    match cli.command {
        Commands::ShortestPath {
            start,
            end,
            max_hops,
        } => print_json(&state.paths.shortest_path(&start, &end, max_hops).await?),
        Commands::Assign { line_id } => {
            print_json(&state.dispatch.assign_nearest_idle_vehicle(&line_id).await?)
        }
        Commands::Recalibrate {
            from,
            to,
            observed_avg,
        } => print_json(
            &state
                .calibration
                .recalibrate_next(&from, &to, observed_avg)
                .await?,
        ),
        Commands::TopPairs { limit } => print_json(&state.analytics.top_pairs(limit).await?),
        Commands::DepotStats { limit } => {
            print_json(&state.analytics.depots_idle_stats(limit).await?)
        }
        Commands::Occupancy => print_json(&state.analytics.average_occupancy_by_depot().await?),
        Commands::TopStops { limit } => {
            print_json(&state.analytics.top_connected_stops(limit).await?)
        }
        Commands::Report {
            top_stops,
            route_from,
            route_to,
            max_hops,
        } => {
            let route = match (route_from, route_to) {
                (Some(start_id), Some(end_id)) => Some(RouteQuery {
                    start_id,
                    end_id,
                    max_hops,
                }),
                _ => None,
            };
            let request = ReportRequest {
                top_stops_limit: top_stops,
                route,
            };
            print_json(&state.reports.build(&request).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
