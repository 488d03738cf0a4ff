//! landstitch CLI - Command-line interface
//!
//! This binary drives a full retiling run of the landstitch library over a
//! set of vector input layers.

use clap::Parser;
use geo::{coord, Rect};
use landstitch::config::RunConfig;
use landstitch::logging::{default_log_dir, default_log_file, init_logging};
use landstitch::store::MemoryStore;
use landstitch::workflow::Workflow;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Parser)]
#[command(name = "landstitch")]
#[command(version = landstitch::VERSION)]
#[command(about = "Retile and topologically reconcile vector land-cover data", long_about = None)]
struct Args {
    /// Name of the import batch; rerunning the same name resumes
    #[arg(long, default_value = "default")]
    source: String,

    /// Area of interest as min-x,min-y,max-x,max-y
    #[arg(long, value_parser = parse_aoi)]
    aoi: Rect<f64>,

    /// Split the AOI into this many tiles per axis
    #[arg(long, default_value = "2")]
    partition_count: usize,

    /// Upper bound on concurrently processed tiles and merge pairs
    #[arg(long, default_value = "4")]
    parallelism: usize,

    /// Baseline line layer (.json row file)
    #[arg(long)]
    baseline: PathBuf,

    /// Hardbone polygon layer
    #[arg(long)]
    hardbone: PathBuf,

    /// Backbone polygon layer
    #[arg(long)]
    backbone: PathBuf,

    /// Optional study-area border polygon layer
    #[arg(long)]
    border: Option<PathBuf>,

    /// Output path (.json row file)
    #[arg(long)]
    output: PathBuf,

    /// Write each processed tile's clipped polygons to this directory
    #[arg(long)]
    tile_output_dir: Option<PathBuf>,

    /// Buffered context margin around each tile
    #[arg(long, default_value = "1000")]
    buffer_distance: f64,

    /// Endpoint snap tolerance against the baseline layer
    #[arg(long, default_value = "20")]
    snap_tolerance: f64,

    /// Douglas-Peucker simplification tolerance
    #[arg(long, default_value = "15")]
    simplify_tolerance: f64,

    /// Chaikin corner-cutting ratio
    #[arg(long, default_value = "0.25")]
    smooth_ratio: f64,

    /// Snap-round precision grid scale
    #[arg(long, default_value = "10000")]
    precision_scale: f64,

    /// Minimum polygon area; smaller polygons merge into a neighbor
    #[arg(long, default_value = "5000")]
    elimination_threshold: f64,
}

fn parse_aoi(value: &str) -> Result<Rect<f64>, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid AOI coordinate: {e}"))?;
    if parts.len() != 4 {
        return Err("expected four values: min-x,min-y,max-x,max-y".to_string());
    }
    if parts[0] >= parts[2] || parts[1] >= parts[3] {
        return Err("AOI minimum must be strictly below maximum".to_string());
    }
    Ok(Rect::new(
        coord! { x: parts[0], y: parts[1] },
        coord! { x: parts[2], y: parts[3] },
    ))
}

fn config_from(args: &Args) -> RunConfig {
    let mut config = RunConfig::new(args.source.clone(), args.aoi)
        .with_partition_count(args.partition_count)
        .with_degree_of_parallelism(args.parallelism)
        .with_buffer_distance(args.buffer_distance)
        .with_snap_tolerance(args.snap_tolerance)
        .with_simplify_tolerance(args.simplify_tolerance)
        .with_smooth_ratio(args.smooth_ratio)
        .with_precision_scale(args.precision_scale)
        .with_elimination_threshold(args.elimination_threshold)
        .with_baseline_path(&args.baseline)
        .with_hardbone_path(&args.hardbone)
        .with_backbone_path(&args.backbone)
        .with_output_path(&args.output);
    if let Some(border) = &args.border {
        config = config.with_border_path(border);
    }
    if let Some(dir) = &args.tile_output_dir {
        config = config.with_tile_output_dir(dir);
    }
    config
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _guard = match init_logging(default_log_dir(), default_log_file()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {}", e);
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let workflow = Workflow::new(config_from(&args), Arc::new(MemoryStore::new()), cancel);
    if let Err(e) = workflow.run().await {
        error!(%e, "run failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
