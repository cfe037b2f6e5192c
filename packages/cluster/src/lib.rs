#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Density clustering of accident locations.
//!
//! Accidents are projected into one metric frame anchored at their
//! centroid, then clustered with DBSCAN over a grid of radii and
//! minimum-point counts. One configuration is then selected and its noise
//! discarded.

pub mod dbscan;
pub mod index;
pub mod sweep;

pub use dbscan::{ClusterAssignment, NOISE, dbscan, dbscan_indexed};
pub use index::NeighborIndex;
pub use sweep::{Radius, SweepCell, SweepTable, sweep};

use crash_curve_geometry::{FrameSpec, GeometryError};
use crash_curve_geometry_models::{AccidentKey, AccidentPoint};
use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from clustering.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A neighbourhood radius was zero, negative, or not finite.
    #[error("invalid DBSCAN radius {radius}")]
    InvalidRadius {
        /// The rejected radius.
        radius: f64,
    },

    /// A configuration was requested that the sweep did not run.
    #[error("no sweep result for radius {radius} and min points {min_points}")]
    UnknownConfiguration {
        /// Requested radius.
        radius: f64,
        /// Requested minimum points.
        min_points: usize,
    },

    /// Accidents could not be projected into the metric frame.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Projects accidents into one metric frame anchored at their mean
/// longitude/latitude. Output order matches input order.
///
/// # Errors
///
/// Returns [`ClusterError::Geometry`] if the frame cannot be built or any
/// accident cannot be projected.
pub fn metric_coords(
    frame: &FrameSpec,
    accidents: &[AccidentPoint],
) -> Result<Vec<Coord<f64>>, ClusterError> {
    let Some(anchor) = mean_position(accidents.iter().map(AccidentPoint::coord)) else {
        return Ok(Vec::new());
    };

    let frame = frame.resolve(anchor)?;
    log::debug!("Clustering in frame {}", frame.definition());

    accidents
        .iter()
        .map(|a| frame.to_metric(a.coord()).map_err(ClusterError::from))
        .collect()
}

/// An accident with the cluster it was assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredAccident {
    /// The accident.
    pub accident: AccidentPoint,
    /// Non-noise cluster id.
    pub cluster: u32,
}

/// Pairs accidents with their labels, dropping noise.
#[must_use]
pub fn label_accidents(
    accidents: &[AccidentPoint],
    assignment: &ClusterAssignment,
) -> Vec<ClusteredAccident> {
    assignment
        .without_noise()
        .into_iter()
        .filter_map(|(index, cluster)| {
            accidents.get(index).map(|accident| ClusteredAccident {
                accident: accident.clone(),
                cluster,
            })
        })
        .collect()
}

/// Mean position of one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    /// Cluster id.
    pub cluster: u32,
    /// Number of member accidents.
    pub members: usize,
    /// Mean longitude.
    pub longitude: f64,
    /// Mean latitude.
    pub latitude: f64,
}

/// Document type marking a query point that stands for a cluster centroid
/// rather than a real accident record.
pub const CENTROID_DOCUMENT_TYPE: &str = "cluster_centroid";

impl ClusterCentroid {
    /// The centroid as a point a road source can be queried with. The
    /// cluster id is carried in the report number.
    #[must_use]
    pub fn query_point(&self) -> AccidentPoint {
        AccidentPoint {
            key: AccidentKey {
                document_type: CENTROID_DOCUMENT_TYPE.to_string(),
                year: 0,
                prefecture_code: String::new(),
                police_code: String::new(),
                report_number: self.cluster.to_string(),
            },
            longitude: self.longitude,
            latitude: self.latitude,
        }
    }

    /// Cluster id of a point built by [`Self::query_point`].
    #[must_use]
    pub fn cluster_of(key: &AccidentKey) -> Option<u32> {
        if key.document_type != CENTROID_DOCUMENT_TYPE {
            return None;
        }
        key.report_number.parse().ok()
    }
}

/// Centroid of every cluster in `labelled`, ordered by cluster id.
///
/// Clusters span at most a few hundred metres, so the plain mean of
/// longitudes and latitudes is used.
#[must_use]
pub fn cluster_centroids(labelled: &[ClusteredAccident]) -> Vec<ClusterCentroid> {
    let mut groups: std::collections::BTreeMap<u32, Vec<Coord<f64>>> =
        std::collections::BTreeMap::new();
    for item in labelled {
        groups
            .entry(item.cluster)
            .or_default()
            .push(item.accident.coord());
    }

    groups
        .into_iter()
        .filter_map(|(cluster, coords)| {
            let members = coords.len();
            mean_position(coords.into_iter()).map(|c| ClusterCentroid {
                cluster,
                members,
                longitude: c.x,
                latitude: c.y,
            })
        })
        .collect()
}

fn mean_position(coords: impl Iterator<Item = Coord<f64>>) -> Option<Coord<f64>> {
    let (sum, count) = coords.fold((Coord::zero(), 0_u32), |(sum, n), c| (sum + c, n + 1));
    (count > 0).then(|| sum / f64::from(count))
}
