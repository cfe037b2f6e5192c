#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Planar geometry for road polylines.
//!
//! All length and area arithmetic happens in a distance-true
//! [`MetricFrame`]; roads and accidents are converted into it on the way in
//! and back to WGS84 on the way out. The frame is always passed explicitly.
//!
//! - [`frame`]: geographic ↔ metric conversion.
//! - [`project`](mod@project): nearest point on a polyline and its arc-length offset.
//! - [`sampling`]: length and arc-length interpolation.
//! - [`split`](mod@split): cutting a polyline at points along it.

pub mod frame;
pub mod project;
pub mod sampling;
pub mod split;

pub use frame::{FrameCache, FrameSpec, MetricFrame};
pub use project::{Projection, project};
pub use sampling::{line_length, point_at_fraction, point_at_offset};
pub use split::{DEFAULT_SNAP_TOLERANCE, split};

use geo::LineString;
use thiserror::Error;

/// Errors from geometric operations on a single road or point.
///
/// These never abort a batch; callers turn them into a null result for the
/// one item they concern.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The polyline has fewer than two vertices.
    #[error("polyline has {vertices} vertex(es), at least 2 are required")]
    TooFewVertices {
        /// Number of vertices the polyline actually has.
        vertices: usize,
    },

    /// All vertices of the polyline coincide.
    #[error("polyline has zero length")]
    ZeroLength,

    /// A cut point is farther from the polyline than the snapping tolerance.
    #[error("cut point ({x}, {y}) is {distance} from the polyline (tolerance {tolerance})")]
    CutPointOffLine {
        /// Cut point x.
        x: f64,
        /// Cut point y.
        y: f64,
        /// Distance from the cut point to the polyline.
        distance: f64,
        /// Snapping tolerance that was exceeded.
        tolerance: f64,
    },

    /// A coordinate or parameter was NaN or infinite.
    #[error("non-finite value: {message}")]
    NonFinite {
        /// What was non-finite.
        message: String,
    },

    /// Coordinate transformation failed.
    #[error("projection error: {message}")]
    Projection {
        /// Description of the failure.
        message: String,
    },
}

/// Checks that a polyline has enough vertices to have segments.
///
/// # Errors
///
/// Returns [`GeometryError::TooFewVertices`] for fewer than two vertices.
pub fn ensure_polyline(line: &LineString<f64>) -> Result<(), GeometryError> {
    let vertices = line.0.len();
    if vertices < 2 {
        return Err(GeometryError::TooFewVertices { vertices });
    }
    Ok(())
}
