//! Arc-length interpolation along polylines.

use geo::{Coord, Euclidean, Length, LineInterpolatePoint, LineString};

use crate::{GeometryError, ensure_polyline};

/// Total planar length of a polyline.
#[must_use]
pub fn line_length(line: &LineString<f64>) -> f64 {
    Euclidean.length(line)
}

/// Copy of `line` without consecutive repeated vertices.
///
/// `geo` interpolation yields `None` when a fraction lands on a
/// zero-length segment.
pub(crate) fn without_repeats(line: &LineString<f64>) -> LineString<f64> {
    let mut coords = line.0.clone();
    coords.dedup();
    LineString::new(coords)
}

fn interpolate(line: &LineString<f64>, fraction: f64) -> Result<Coord<f64>, GeometryError> {
    without_repeats(line)
        .line_interpolate_point(fraction)
        .map(|point| point.0)
        .ok_or_else(|| GeometryError::NonFinite {
            message: format!("fraction {fraction}"),
        })
}

/// Point at arc length `offset` from the start, clamped to the ends.
///
/// # Errors
///
/// Returns [`GeometryError`] if the polyline has fewer than two vertices or
/// `offset` is non-finite.
pub fn point_at_offset(line: &LineString<f64>, offset: f64) -> Result<Coord<f64>, GeometryError> {
    ensure_polyline(line)?;
    if !offset.is_finite() {
        return Err(GeometryError::NonFinite {
            message: format!("offset {offset}"),
        });
    }

    let length = line_length(line);
    if length <= 0.0 {
        return Ok(line.0[0]);
    }

    interpolate(line, offset / length)
}

/// Point at `fraction` of the total length (`0` = start, `1` = end).
///
/// Fractions outside `[0, 1]` clamp to the nearest end.
///
/// # Errors
///
/// Returns [`GeometryError::ZeroLength`] for a degenerate polyline, or
/// another [`GeometryError`] for too few vertices or a non-finite fraction.
pub fn point_at_fraction(
    line: &LineString<f64>,
    fraction: f64,
) -> Result<Coord<f64>, GeometryError> {
    ensure_polyline(line)?;
    if !fraction.is_finite() {
        return Err(GeometryError::NonFinite {
            message: format!("fraction {fraction}"),
        });
    }
    if line_length(line) <= 0.0 {
        return Err(GeometryError::ZeroLength);
    }

    interpolate(line, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l_shape() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)])
    }

    fn assert_close(actual: Coord<f64>, expected: (f64, f64)) {
        assert!(
            (actual.x - expected.0).abs() < 1e-9 && (actual.y - expected.1).abs() < 1e-9,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn length_sums_segments() {
        assert!((line_length(&l_shape()) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn offset_walks_across_vertices() {
        assert_close(point_at_offset(&l_shape(), 15.0).unwrap(), (10.0, 5.0));
        assert_close(point_at_offset(&l_shape(), 10.0).unwrap(), (10.0, 0.0));
    }

    #[test]
    fn offsets_clamp_to_ends() {
        assert_close(point_at_offset(&l_shape(), -3.0).unwrap(), (0.0, 0.0));
        assert_close(point_at_offset(&l_shape(), 99.0).unwrap(), (10.0, 10.0));
    }

    #[test]
    fn fraction_is_relative_to_total_length() {
        assert_close(point_at_fraction(&l_shape(), 0.25).unwrap(), (5.0, 0.0));
        assert_close(point_at_fraction(&l_shape(), 1.5).unwrap(), (10.0, 10.0));
        assert_close(point_at_fraction(&l_shape(), -0.5).unwrap(), (0.0, 0.0));
    }

    #[test]
    fn repeated_vertex_does_not_break_interpolation() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        assert_close(point_at_fraction(&line, 0.5).unwrap(), (10.0, 0.0));
        assert_close(point_at_offset(&line, 12.0).unwrap(), (10.0, 2.0));
    }

    #[test]
    fn zero_length_line_has_no_fraction() {
        let line = LineString::from(vec![(1.0, 1.0), (1.0, 1.0)]);
        assert!(matches!(
            point_at_fraction(&line, 0.5),
            Err(GeometryError::ZeroLength)
        ));
        assert_eq!(point_at_offset(&line, 3.0).unwrap(), Coord { x: 1.0, y: 1.0 });
    }

    #[test]
    fn nan_fraction_is_rejected() {
        assert!(matches!(
            point_at_fraction(&l_shape(), f64::NAN),
            Err(GeometryError::NonFinite { .. })
        ));
    }
}
