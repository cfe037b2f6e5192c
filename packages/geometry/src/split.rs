//! Cutting a polyline at points that lie on it.

use geo::{Coord, LineSplit, LineString};

use crate::sampling::without_repeats;
use crate::{GeometryError, line_length, project};

/// Default snapping distance for cut points, in frame units.
pub const DEFAULT_SNAP_TOLERANCE: f64 = 1e-3;

/// Splits `line` at each of `cut_points`.
///
/// Every cut point must lie within `tolerance` of the line; it is snapped
/// onto it before cutting. Pieces are returned in arc-length order from the
/// line start, and pieces no longer than `tolerance` are omitted, so a cut
/// at an endpoint does not produce an empty piece.
///
/// # Errors
///
/// Returns [`GeometryError::CutPointOffLine`] if a cut point is farther than
/// `tolerance` from the line, or another [`GeometryError`] if the line is
/// degenerate.
pub fn split(
    line: &LineString<f64>,
    cut_points: &[Coord<f64>],
    tolerance: f64,
) -> Result<Vec<LineString<f64>>, GeometryError> {
    let mut offsets = Vec::with_capacity(cut_points.len());
    for cut in cut_points {
        let projection = project(line, *cut)?;
        if projection.distance_to > tolerance {
            return Err(GeometryError::CutPointOffLine {
                x: cut.x,
                y: cut.y,
                distance: projection.distance_to,
                tolerance,
            });
        }
        offsets.push(projection.distance_along);
    }

    let length = line_length(line);
    offsets.sort_by(f64::total_cmp);

    // Interior cuts only, at least `tolerance` apart.
    let mut fractions = Vec::with_capacity(offsets.len());
    let mut previous = 0.0;
    for offset in offsets {
        if offset - previous > tolerance && length - offset > tolerance {
            fractions.push(offset / length);
            previous = offset;
        }
    }

    if fractions.is_empty() {
        return Ok(vec![line.clone()]);
    }

    let pieces = without_repeats(line)
        .line_split_many(&fractions)
        .ok_or_else(|| GeometryError::NonFinite {
            message: format!("cut fractions {fractions:?}"),
        })?;

    Ok(pieces
        .into_iter()
        .flatten()
        .filter(|piece| line_length(piece) > tolerance)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (100.0, 0.0)])
    }

    fn assert_close(actual: Coord<f64>, expected: (f64, f64)) {
        assert!(
            (actual.x - expected.0).abs() < 1e-9 && (actual.y - expected.1).abs() < 1e-9,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn two_interior_cuts_give_three_pieces_in_order() {
        // Cuts supplied out of order still come back start-to-end.
        let pieces = split(
            &straight(),
            &[Coord { x: 70.0, y: 0.0 }, Coord { x: 30.0, y: 0.0 }],
            DEFAULT_SNAP_TOLERANCE,
        )
        .unwrap();
        assert_eq!(pieces.len(), 3);
        assert_close(pieces[0].0[1], (30.0, 0.0));
        assert_close(pieces[1].0[0], (30.0, 0.0));
        assert_close(pieces[1].0[1], (70.0, 0.0));
        assert_close(pieces[2].0[1], (100.0, 0.0));
    }

    #[test]
    fn cut_at_endpoint_does_not_produce_empty_piece() {
        let pieces = split(
            &straight(),
            &[Coord { x: 0.0, y: 0.0 }, Coord { x: 40.0, y: 0.0 }],
            DEFAULT_SNAP_TOLERANCE,
        )
        .unwrap();
        assert_eq!(pieces.len(), 2);
        assert!((line_length(&pieces[0]) - 40.0).abs() < 1e-9);
        assert!((line_length(&pieces[1]) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn cuts_at_both_ends_leave_the_line_whole() {
        let pieces = split(
            &straight(),
            &[Coord { x: 100.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }],
            DEFAULT_SNAP_TOLERANCE,
        )
        .unwrap();
        assert_eq!(pieces, vec![straight()]);
    }

    #[test]
    fn coincident_cuts_count_once() {
        let pieces = split(
            &straight(),
            &[Coord { x: 50.0, y: 0.0 }, Coord { x: 50.0, y: 0.0 }],
            DEFAULT_SNAP_TOLERANCE,
        )
        .unwrap();
        assert_eq!(pieces.len(), 2);
    }

    #[test]
    fn near_miss_is_snapped() {
        let pieces = split(&straight(), &[Coord { x: 50.0, y: 0.0005 }], 1e-3).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_close(pieces[0].0[1], (50.0, 0.0));
    }

    #[test]
    fn cut_off_the_line_is_an_error() {
        let err = split(&straight(), &[Coord { x: 50.0, y: 5.0 }], 1e-3).unwrap_err();
        match err {
            GeometryError::CutPointOffLine { distance, .. } => {
                assert!((distance - 5.0).abs() < 1e-12);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_cuts_returns_whole_line() {
        let pieces = split(&straight(), &[], DEFAULT_SNAP_TOLERANCE).unwrap();
        assert_eq!(pieces, vec![straight()]);
    }

    #[test]
    fn split_preserves_corner_vertices() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let pieces = split(
            &line,
            &[Coord { x: 5.0, y: 0.0 }, Coord { x: 10.0, y: 5.0 }],
            DEFAULT_SNAP_TOLERANCE,
        )
        .unwrap();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[1].0.len(), 3);
        assert_eq!(pieces[1].0[1], Coord { x: 10.0, y: 0.0 });
        assert!((line_length(&pieces[1]) - 10.0).abs() < 1e-9);
    }
}
