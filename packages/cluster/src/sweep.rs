//! Grid search over DBSCAN parameters.

use std::sync::Arc;

use crash_curve_geometry_models::AccidentPoint;
use crash_curve_progress::ProgressCallback;
use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::{
    ClusterAssignment, ClusterError, ClusteredAccident, NeighborIndex, dbscan_indexed,
    label_accidents,
};

/// One `(radius, min_points)` configuration and its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepCell {
    /// Neighbourhood radius in metres.
    pub radius: Radius,
    /// Minimum number of other points for a core point.
    pub min_points: usize,
    /// The clustering this configuration produced.
    pub assignment: ClusterAssignment,
}

impl SweepCell {
    /// Number of clusters found.
    #[must_use]
    pub const fn cluster_count(&self) -> u32 {
        self.assignment.cluster_count
    }

    /// Number of noise points.
    #[must_use]
    pub fn noise_count(&self) -> usize {
        self.assignment.noise_count()
    }
}

/// A radius compared by bit pattern, so sweep cells can be looked up by the
/// exact value they were run with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Radius(pub f64);

impl PartialEq for Radius {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Radius {}

impl std::fmt::Display for Radius {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Every cell of a sweep, in grid order (radius-major).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepTable {
    /// Cells in the order they were run.
    pub cells: Vec<SweepCell>,
}

impl SweepTable {
    /// Looks up the cell for one configuration.
    #[must_use]
    pub fn get(&self, radius: f64, min_points: usize) -> Option<&SweepCell> {
        self.cells
            .iter()
            .find(|cell| cell.radius == Radius(radius) && cell.min_points == min_points)
    }

    /// The assignment of one configuration with noise removed, as
    /// `(point index, cluster id)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::UnknownConfiguration`] if the configuration
    /// was not part of the sweep.
    pub fn select(&self, radius: f64, min_points: usize) -> Result<Vec<(usize, u32)>, ClusterError> {
        self.get(radius, min_points)
            .map(|cell| cell.assignment.without_noise())
            .ok_or(ClusterError::UnknownConfiguration { radius, min_points })
    }

    /// Labels `accidents` (in the order the sweep was run on) with one
    /// configuration's clusters, dropping noise.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::UnknownConfiguration`] if the configuration
    /// was not part of the sweep.
    pub fn label(
        &self,
        accidents: &[AccidentPoint],
        radius: f64,
        min_points: usize,
    ) -> Result<Vec<ClusteredAccident>, ClusterError> {
        self.get(radius, min_points)
            .map(|cell| label_accidents(accidents, &cell.assignment))
            .ok_or(ClusterError::UnknownConfiguration { radius, min_points })
    }
}

/// Runs DBSCAN for every pair in `radius_grid × min_points_grid`.
///
/// The neighbour index is built once and shared by all cells.
///
/// # Errors
///
/// Returns [`ClusterError::InvalidRadius`] if any radius is not positive
/// and finite; no cell is run in that case.
pub fn sweep(
    points: &[Coord<f64>],
    radius_grid: &[f64],
    min_points_grid: &[usize],
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SweepTable, ClusterError> {
    if let Some(&radius) = radius_grid
        .iter()
        .find(|r| !(r.is_finite() && **r > 0.0))
    {
        return Err(ClusterError::InvalidRadius { radius });
    }

    let index = NeighborIndex::new(points);
    progress.set_total((radius_grid.len() * min_points_grid.len()) as u64);

    let mut cells = Vec::with_capacity(radius_grid.len() * min_points_grid.len());
    for &radius in radius_grid {
        for &min_points in min_points_grid {
            progress.set_message(format!("eps={radius} minPts={min_points}"));
            let assignment = dbscan_indexed(&index, radius, min_points)?;
            log::info!(
                "DBSCAN eps={radius} minPts={min_points}: {} cluster(s), {} noise",
                assignment.cluster_count,
                assignment.noise_count()
            );
            cells.push(SweepCell {
                radius: Radius(radius),
                min_points,
                assignment,
            });
            progress.inc(1);
        }
    }

    progress.finish(format!("{} configuration(s)", cells.len()));
    Ok(SweepTable { cells })
}
