#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Road curvature at accident locations.
//!
//! For each accident the nearest candidate road is chosen, three points are
//! sampled along it at arc-length offsets `-d`, `0`, `+d` around the
//! accident's projection, and the Menger curvature of that triangle is
//! reported. All arithmetic happens in a [`MetricFrame`]; failures for a
//! single accident become a null curvature, never an aborted run.
//!
//! [`MetricFrame`]: crash_curve_geometry::MetricFrame

pub mod crop;
pub mod engine;
pub mod estimator;
pub mod sampler;

pub use crop::crop_to_segment;
pub use engine::{CurvatureEngine, CurvatureRecord, CurvatureSummary, CroppedRoad, nearest_road};
pub use estimator::{CurvatureResult, curvature, menger_curvature, try_curvature};
pub use sampler::{SampleTriple, sample, sample_metric};

use crash_curve_geometry::GeometryError;
use crash_curve_geometry_models::Crs;
use thiserror::Error;

/// Default arc-length offset between samples, in metres.
pub const DEFAULT_PATH_DISTANCE: f64 = 50.0;

/// Errors from sampling or estimating curvature for one accident.
#[derive(Debug, Error)]
pub enum CurvatureError {
    /// Projection, sampling, or splitting failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Two or more sample points coincide, so the triangle has no
    /// circumcircle.
    #[error("degenerate sample triangle (d12={d12}, d23={d23}, d31={d31})")]
    DegenerateTriangle {
        /// Distance between the first and second sample.
        d12: f64,
        /// Distance between the second and third sample.
        d23: f64,
        /// Distance between the third and first sample.
        d31: f64,
    },

    /// Samples are tagged with a reference the frame cannot convert.
    #[error("samples are in {found}, frame expects {expected}")]
    CrsMismatch {
        /// Reference the frame converts from.
        expected: Crs,
        /// Reference the samples carry.
        found: Crs,
    },
}
