//! Menger curvature of a sample triangle.

use crash_curve_geometry::MetricFrame;
use geo::line_measures::Distance;
use geo::{Area, Coord, Euclidean, Point, Triangle};

use crate::{CurvatureError, SampleTriple};

/// Curvature of one (road, accident) pair; `None` when it cannot be
/// estimated.
pub type CurvatureResult = Option<f64>;

/// Menger curvature `4·A / (d12·d23·d31)` of three planar points.
///
/// Collinear points give exactly `0`.
///
/// # Errors
///
/// Returns [`CurvatureError::DegenerateTriangle`] if two points coincide or
/// the result is not finite.
pub fn menger_curvature(points: [Coord<f64>; 3]) -> Result<f64, CurvatureError> {
    let [p1, p2, p3] = points.map(Point::from);
    let d12 = Euclidean.distance(&p1, &p2);
    let d23 = Euclidean.distance(&p2, &p3);
    let d31 = Euclidean.distance(&p3, &p1);

    let degenerate = CurvatureError::DegenerateTriangle { d12, d23, d31 };
    if !(d12 > 0.0 && d23 > 0.0 && d31 > 0.0) {
        return Err(degenerate);
    }

    let area = Triangle::new(points[0], points[1], points[2]).unsigned_area();
    let value = 4.0 * area / (d12 * d23 * d31);

    if value.is_finite() {
        Ok(value)
    } else {
        Err(degenerate)
    }
}

/// Curvature of a [`SampleTriple`], converting it into `frame` first when
/// it is tagged with the frame's source reference.
///
/// # Errors
///
/// Returns [`CurvatureError::CrsMismatch`] if the triple is in a reference
/// `frame` does not handle, or any error from [`menger_curvature`].
pub fn try_curvature(triple: &SampleTriple, frame: &MetricFrame) -> Result<f64, CurvatureError> {
    let points = if triple.crs == frame.crs() {
        triple.points
    } else if triple.crs == frame.source_crs() {
        let mut metric = [Coord::zero(); 3];
        for (slot, point) in metric.iter_mut().zip(triple.points) {
            *slot = frame.to_metric(point)?;
        }
        metric
    } else {
        return Err(CurvatureError::CrsMismatch {
            expected: frame.source_crs(),
            found: triple.crs.clone(),
        });
    };

    menger_curvature(points)
}

/// Like [`try_curvature`], with failures logged and collapsed to `None`.
#[must_use]
pub fn curvature(triple: &SampleTriple, frame: &MetricFrame) -> CurvatureResult {
    match try_curvature(triple, frame) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Curvature unavailable: {e}");
            None
        }
    }
}
