#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `crash_curve`: road curvature at accident locations.
//!
//! Each subcommand is one pipeline stage; stages communicate through files
//! under the configured data directory. Log output goes through
//! `indicatif-log-bridge` (see [`crash_curve_cli_utils::init_logger`]) so it
//! never tears the progress bars.

mod commands;
mod io;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crash_curve_config::PipelineConfig;

use crate::commands::Context;

#[derive(Parser)]
#[command(
    name = "crash_curve",
    about = "Road curvature and clustering at accident locations"
)]
struct Cli {
    /// TOML file overriding the built-in configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch roads around every accident in resumable batches, then combine
    /// them. Rerun after failures to fetch only the missing batches.
    FetchRoads {
        /// Accident CSV (default: `<data_dir>/accidents.csv`)
        #[arg(long)]
        accidents: Option<PathBuf>,
        /// Road search radius in metres
        #[arg(long)]
        radius: Option<f64>,
        /// Accidents per request
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Combine already persisted road batches without fetching
    Combine,
    /// Estimate Menger curvature of the nearest road at each accident
    Curvature {
        /// Combined road candidates (JSON lines)
        #[arg(long)]
        roads: Option<PathBuf>,
        /// Output `.geojsonseq`
        #[arg(long)]
        output: Option<PathBuf>,
        /// Arc-length distance of the outer samples, in metres
        #[arg(long)]
        path_distance: Option<f64>,
    },
    /// Crop each accident's nearest road to the sampled span
    Crop {
        /// Combined road candidates (JSON lines)
        #[arg(long)]
        roads: Option<PathBuf>,
        /// Output `.geojsonseq`
        #[arg(long)]
        output: Option<PathBuf>,
        /// Arc-length distance of the crop ends, in metres
        #[arg(long)]
        path_distance: Option<f64>,
    },
    /// Run DBSCAN over the configured radius and min-points grids
    ClusterSweep {
        /// Accident CSV
        #[arg(long)]
        accidents: Option<PathBuf>,
        /// Output sweep CSV
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Keep the non-noise accidents of one sweep configuration
    ClusterSelect {
        /// Accident CSV
        #[arg(long)]
        accidents: Option<PathBuf>,
        /// DBSCAN radius in metres (must be in the radius grid)
        #[arg(long)]
        radius: Option<f64>,
        /// DBSCAN minimum points (must be in the min-points grid)
        #[arg(long)]
        min_points: Option<usize>,
        /// Output clusters CSV
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fetch roads around each cluster centroid
    ClusterRoads {
        /// Clusters CSV written by `cluster-select`
        #[arg(long)]
        clusters: Option<PathBuf>,
        /// Output `.geojsonseq`
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = crash_curve_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = PipelineConfig::load(cli.config.as_deref())?;
    let ctx = Context::new(config, multi);

    match cli.command {
        Commands::FetchRoads {
            accidents,
            radius,
            batch_size,
        } => commands::fetch_roads(&ctx, accidents, radius, batch_size).await?,
        Commands::Combine => commands::combine(&ctx)?,
        Commands::Curvature {
            roads,
            output,
            path_distance,
        } => commands::curvature(&ctx, roads, output, path_distance)?,
        Commands::Crop {
            roads,
            output,
            path_distance,
        } => commands::crop(&ctx, roads, output, path_distance)?,
        Commands::ClusterSweep { accidents, output } => {
            commands::cluster_sweep(&ctx, accidents, output)?;
        }
        Commands::ClusterSelect {
            accidents,
            radius,
            min_points,
            output,
        } => commands::cluster_select(&ctx, accidents, radius, min_points, output)?,
        Commands::ClusterRoads { clusters, output } => {
            commands::cluster_roads(&ctx, clusters, output).await?;
        }
    }

    Ok(())
}
