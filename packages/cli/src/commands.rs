//! One function per subcommand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crash_curve_cli_utils::{IndicatifProgress, MultiProgress};
use crash_curve_cluster::{ClusterCentroid, cluster_centroids, metric_coords, sweep};
use crash_curve_config::paths::ensure_parent;
use crash_curve_config::{DataPaths, PipelineConfig};
use crash_curve_curvature::CurvatureEngine;
use crash_curve_fetch::{BatchNaming, OverpassClient, ResumableFetcher, read_combined};
use crash_curve_geometry_models::AccidentPoint;

use crate::io;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Shared state for every subcommand.
pub struct Context {
    pub config: PipelineConfig,
    pub paths: DataPaths,
    pub multi: MultiProgress,
}

impl Context {
    pub fn new(config: PipelineConfig, multi: MultiProgress) -> Self {
        let paths = config.data_paths();
        Self {
            config,
            paths,
            multi,
        }
    }

    fn fetcher(
        &self,
        dir: PathBuf,
        radius: f64,
        naming: BatchNaming,
        batch_size: usize,
    ) -> Result<ResumableFetcher, Box<dyn std::error::Error>> {
        let fetch = &self.config.fetch;
        let client = OverpassClient::new(fetch.overpass_options(&self.config.frame))?;

        Ok(ResumableFetcher::new(Arc::new(client), dir, radius)
            .with_naming(naming)
            .with_batch_size(batch_size)
            .with_courtesy_delay(fetch.courtesy_delay()))
    }
}

pub async fn fetch_roads(
    ctx: &Context,
    accidents: Option<PathBuf>,
    radius: Option<f64>,
    batch_size: Option<usize>,
) -> CommandResult {
    let start = Instant::now();
    let accidents = accidents.unwrap_or_else(|| ctx.paths.accidents());
    let radius = radius.unwrap_or(ctx.config.curvature.search_radius);
    let batch_size = batch_size.unwrap_or(ctx.config.fetch.batch_size);
    if batch_size == 0 {
        return Err("--batch-size must be at least 1".into());
    }

    let points = io::read_accidents(&accidents)?;
    let output = ctx.paths.roads();
    ensure_parent(&output)?;

    let fetcher = ctx.fetcher(
        ctx.paths.road_batches_dir(),
        radius,
        ctx.config.fetch.naming.clone(),
        batch_size,
    )?;
    let progress = IndicatifProgress::batches_bar(&ctx.multi, "Fetching roads");
    let (report, summary) = fetcher.run_and_combine(&points, &output, &progress).await?;

    log::info!(
        "Combined {} accident(s) with roads into {} ({} without roads dropped) in {:.1}s",
        summary.records,
        output.display(),
        summary.dropped_empty,
        start.elapsed().as_secs_f64()
    );
    if report.failed() > 0 {
        log::warn!(
            "{} batch(es) failed; run fetch-roads again to fill them in",
            report.failed()
        );
    }

    Ok(())
}

pub fn combine(ctx: &Context) -> CommandResult {
    let output = ctx.paths.roads();
    ensure_parent(&output)?;

    let summary = crash_curve_fetch::combine(
        &ctx.paths.road_batches_dir(),
        &ctx.config.fetch.naming,
        &output,
    )?;
    if summary.corrupt > 0 {
        log::warn!(
            "{} batch file(s) could not be read; delete them and run fetch-roads again",
            summary.corrupt
        );
    }

    Ok(())
}

fn curvature_engine(ctx: &Context, path_distance: Option<f64>) -> Result<CurvatureEngine, String> {
    let path_distance = path_distance.unwrap_or(ctx.config.curvature.path_distance);
    if !(path_distance.is_finite() && path_distance > 0.0) {
        return Err(format!("path distance must be positive, got {path_distance}"));
    }

    Ok(CurvatureEngine::new(
        ctx.config.frame.clone(),
        path_distance,
        ctx.config.curvature.snap_tolerance,
    ))
}

pub fn curvature(
    ctx: &Context,
    roads: Option<PathBuf>,
    output: Option<PathBuf>,
    path_distance: Option<f64>,
) -> CommandResult {
    let roads = roads.unwrap_or_else(|| ctx.paths.roads());
    let output = output.unwrap_or_else(|| ctx.paths.curvature());
    let mut engine = curvature_engine(ctx, path_distance)?;

    let items = read_combined(&roads)?;
    log::info!(
        "Estimating curvature for {} accident(s) with d = {} m",
        items.len(),
        engine.path_distance()
    );

    let progress = IndicatifProgress::records_bar(&ctx.multi, "Curvature");
    let (records, summary) = engine.evaluate_all(&items, &progress);

    let features = records
        .iter()
        .map(crash_curve_curvature::CurvatureRecord::to_feature)
        .collect::<Result<Vec<_>, _>>()?;
    ensure_parent(&output)?;
    io::write_geojsonseq(&output, features)?;

    println!(
        "{} accident(s): {} with curvature, {} null ({} without a road)",
        summary.total, summary.computed, summary.null, summary.without_road
    );
    Ok(())
}

pub fn crop(
    ctx: &Context,
    roads: Option<PathBuf>,
    output: Option<PathBuf>,
    path_distance: Option<f64>,
) -> CommandResult {
    let roads = roads.unwrap_or_else(|| ctx.paths.roads());
    let output = output.unwrap_or_else(|| ctx.paths.cropped_roads());
    let mut engine = curvature_engine(ctx, path_distance)?;

    let items = read_combined(&roads)?;
    let progress = IndicatifProgress::records_bar(&ctx.multi, "Cropping roads");
    let cropped = engine.crop_all(&items, &progress);

    let features = cropped
        .iter()
        .map(io::cropped_feature)
        .collect::<Result<Vec<_>, _>>()?;
    ensure_parent(&output)?;
    io::write_geojsonseq(&output, features)?;

    Ok(())
}

fn sweep_accidents(
    ctx: &Context,
    accidents: &Path,
) -> Result<(Vec<AccidentPoint>, crash_curve_cluster::SweepTable), Box<dyn std::error::Error>> {
    let cluster = &ctx.config.cluster;
    let points = io::read_accidents(accidents)?;
    let coords = metric_coords(&ctx.config.frame, &points)?;

    let cells = cluster.radius_grid.len() * cluster.min_points_grid.len();
    let progress = IndicatifProgress::steps_bar(&ctx.multi, "DBSCAN sweep", cells as u64);
    let table = sweep(
        &coords,
        &cluster.radius_grid,
        &cluster.min_points_grid,
        &progress,
    )?;

    Ok((points, table))
}

pub fn cluster_sweep(
    ctx: &Context,
    accidents: Option<PathBuf>,
    output: Option<PathBuf>,
) -> CommandResult {
    let accidents = accidents.unwrap_or_else(|| ctx.paths.accidents());
    let output = output.unwrap_or_else(|| ctx.paths.cluster_sweep());

    let (_, table) = sweep_accidents(ctx, &accidents)?;

    ensure_parent(&output)?;
    io::write_sweep(&output, &table)?;
    log::info!("Wrote {} sweep row(s) to {}", table.cells.len(), output.display());

    print!("{}", io::format_sweep_table(&table));
    Ok(())
}

pub fn cluster_select(
    ctx: &Context,
    accidents: Option<PathBuf>,
    radius: Option<f64>,
    min_points: Option<usize>,
    output: Option<PathBuf>,
) -> CommandResult {
    let accidents = accidents.unwrap_or_else(|| ctx.paths.accidents());
    let output = output.unwrap_or_else(|| ctx.paths.clusters());
    let radius = radius.unwrap_or(ctx.config.cluster.selected_radius);
    let min_points = min_points.unwrap_or(ctx.config.cluster.selected_min_points);

    let (points, table) = sweep_accidents(ctx, &accidents)?;
    let clustered = table.label(&points, radius, min_points)?;

    let centroids = cluster_centroids(&clustered);
    log::info!(
        "eps={radius} minPts={min_points}: kept {} of {} accident(s) in {} cluster(s)",
        clustered.len(),
        points.len(),
        centroids.len()
    );

    ensure_parent(&output)?;
    io::write_clusters(&output, &clustered)?;
    log::info!("Wrote clusters to {}", output.display());

    Ok(())
}

pub async fn cluster_roads(
    ctx: &Context,
    clusters: Option<PathBuf>,
    output: Option<PathBuf>,
) -> CommandResult {
    let clusters = clusters.unwrap_or_else(|| ctx.paths.clusters());
    let output = output.unwrap_or_else(|| ctx.paths.cluster_roads());

    let centroids = cluster_centroids(&io::read_clusters(&clusters)?);
    if centroids.is_empty() {
        log::warn!("No clusters in {}; nothing to fetch", clusters.display());
        return Ok(());
    }
    let members = centroids
        .iter()
        .map(|c| (c.cluster, c.members))
        .collect::<BTreeMap<_, _>>();
    let points = centroids
        .iter()
        .map(ClusterCentroid::query_point)
        .collect::<Vec<_>>();

    let naming = BatchNaming {
        prefix: format!("cluster_{}", ctx.config.fetch.naming.prefix),
        ..ctx.config.fetch.naming.clone()
    };
    let fetcher = ctx.fetcher(
        ctx.paths.cluster_road_batches_dir(),
        ctx.config.cluster.detail_search_radius,
        naming,
        ctx.config.fetch.batch_size,
    )?;

    let combined = ctx.paths.cluster_roads_combined();
    ensure_parent(&combined)?;
    let progress = IndicatifProgress::batches_bar(&ctx.multi, "Fetching cluster roads");
    let (report, _) = fetcher
        .run_and_combine(&points, &combined, &progress)
        .await?;
    if report.failed() > 0 {
        log::warn!(
            "{} batch(es) failed; run cluster-roads again to fill them in",
            report.failed()
        );
    }

    let mut features = Vec::new();
    for candidates in read_combined(&combined)? {
        let Some(cluster) = ClusterCentroid::cluster_of(&candidates.accident.key) else {
            log::warn!(
                "Skipping unexpected record {} in {}",
                candidates.accident.key,
                combined.display()
            );
            continue;
        };
        for road in &candidates.roads {
            let mut properties = serde_json::Map::new();
            properties.insert("cluster".to_string(), serde_json::json!(cluster));
            properties.insert(
                "members".to_string(),
                serde_json::json!(members.get(&cluster).copied().unwrap_or_default()),
            );
            features.push(io::road_feature(road, properties)?);
        }
    }

    ensure_parent(&output)?;
    io::write_geojsonseq(&output, features)?;

    Ok(())
}
