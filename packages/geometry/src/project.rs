//! Nearest-point projection onto a polyline.

use geo::line_measures::Distance;
use geo::{Closest, ClosestPoint, Coord, Euclidean, LineString, Point};

use crate::{GeometryError, ensure_polyline};

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// The on-road point nearest to the input.
    pub point: Coord<f64>,
    /// Arc length from the polyline start to [`Self::point`].
    pub distance_along: f64,
    /// Straight-line distance from the input to [`Self::point`].
    pub distance_to: f64,
    /// Index of the segment the point lies on.
    pub segment: usize,
}

/// Projects `point` onto `line`.
///
/// Both must be in the same planar frame. When several segments are
/// equally close the earliest one wins.
///
/// # Errors
///
/// Returns [`GeometryError`] if the polyline has fewer than two vertices or
/// the point is non-finite.
pub fn project(line: &LineString<f64>, point: Coord<f64>) -> Result<Projection, GeometryError> {
    ensure_polyline(line)?;
    if !point.x.is_finite() || !point.y.is_finite() {
        return Err(GeometryError::NonFinite {
            message: format!("projected point ({}, {})", point.x, point.y),
        });
    }

    let target = Point::from(point);
    let mut travelled = 0.0;
    let mut best: Option<Projection> = None;

    for (segment, line_segment) in line.lines().enumerate() {
        let start = Point::from(line_segment.start);
        let on_segment = match line_segment.closest_point(&target) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => p,
            Closest::Indeterminate => start,
        };
        let distance_to = Euclidean.distance(&on_segment, &target);

        if best.is_none_or(|b| distance_to < b.distance_to) {
            best = Some(Projection {
                point: on_segment.0,
                distance_along: travelled + Euclidean.distance(&start, &on_segment),
                distance_to,
                segment,
            });
        }

        travelled += Euclidean.distance(&start, &Point::from(line_segment.end));
    }

    best.ok_or(GeometryError::TooFewVertices {
        vertices: line.0.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l_shape() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)])
    }

    #[test]
    fn projects_onto_interior_of_segment() {
        let p = project(&l_shape(), Coord { x: 4.0, y: 3.0 }).unwrap();
        assert_eq!(p.point, Coord { x: 4.0, y: 0.0 });
        assert!((p.distance_along - 4.0).abs() < 1e-12);
        assert!((p.distance_to - 3.0).abs() < 1e-12);
        assert_eq!(p.segment, 0);
    }

    #[test]
    fn offset_accumulates_across_segments() {
        let p = project(&l_shape(), Coord { x: 12.0, y: 6.0 }).unwrap();
        assert_eq!(p.point, Coord { x: 10.0, y: 6.0 });
        assert!((p.distance_along - 16.0).abs() < 1e-12);
        assert_eq!(p.segment, 1);
    }

    #[test]
    fn point_beyond_end_snaps_to_endpoint() {
        let p = project(&l_shape(), Coord { x: 10.0, y: 25.0 }).unwrap();
        assert_eq!(p.point, Coord { x: 10.0, y: 10.0 });
        assert!((p.distance_along - 20.0).abs() < 1e-12);

        let p = project(&l_shape(), Coord { x: -5.0, y: 0.0 }).unwrap();
        assert_eq!(p.point, Coord { x: 0.0, y: 0.0 });
        assert!(p.distance_along.abs() < 1e-12);
    }

    #[test]
    fn equidistant_segments_prefer_the_earliest() {
        // (11, -1) is equally close to the corner from both segments.
        let p = project(&l_shape(), Coord { x: 11.0, y: -1.0 }).unwrap();
        assert_eq!(p.segment, 0);
        assert_eq!(p.point, Coord { x: 10.0, y: 0.0 });
    }

    #[test]
    fn point_on_line_has_zero_distance() {
        let p = project(&l_shape(), Coord { x: 10.0, y: 0.0 }).unwrap();
        assert!(p.distance_to.abs() < 1e-12);
        assert!((p.distance_along - 10.0).abs() < 1e-12);
    }

    #[test]
    fn single_vertex_line_is_rejected() {
        let line = LineString::from(vec![(0.0, 0.0)]);
        assert!(matches!(
            project(&line, Coord { x: 1.0, y: 1.0 }),
            Err(GeometryError::TooFewVertices { vertices: 1 })
        ));
    }

    #[test]
    fn zero_length_segments_are_tolerated() {
        let line = LineString::from(vec![(0.0, 0.0), (0.0, 0.0), (5.0, 0.0)]);
        let p = project(&line, Coord { x: 2.0, y: 1.0 }).unwrap();
        assert_eq!(p.point, Coord { x: 2.0, y: 0.0 });
        assert!((p.distance_along - 2.0).abs() < 1e-12);
    }
}
