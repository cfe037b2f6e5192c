//! Three-point sampling around an accident's projection onto a road.

use crash_curve_geometry::{MetricFrame, line_length, point_at_fraction, project};
use crash_curve_geometry_models::{AccidentPoint, Crs, Road};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::CurvatureError;

/// Three points taken along one road at arc-length offsets `-d`, `0` and
/// `+d` from an accident's projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTriple {
    /// Reference the points are expressed in.
    pub crs: Crs,
    /// Before, at, and after the projection, in arc-length order.
    pub points: [Coord<f64>; 3],
}

/// Samples a road that is already in the metric frame.
///
/// Offsets beyond either end of the road clamp to that end, so a
/// projection at an endpoint yields a repeated point.
///
/// # Errors
///
/// Returns [`CurvatureError::Geometry`] if the road is degenerate or an
/// input is non-finite.
pub fn sample_metric(
    line: &LineString<f64>,
    accident: Coord<f64>,
    path_distance: f64,
) -> Result<[Coord<f64>; 3], CurvatureError> {
    let projection = project(line, accident)?;
    let length = line_length(line);

    let mut points = [Coord::zero(); 3];
    for (slot, offset) in points
        .iter_mut()
        .zip([-path_distance, 0.0, path_distance])
    {
        let fraction = (projection.distance_along + offset) / length;
        *slot = point_at_fraction(line, fraction)?;
    }

    Ok(points)
}

/// Samples `road` around `accident`, both given in WGS84.
///
/// The arithmetic happens in `frame`; the returned points are converted
/// back and tagged with the frame's source reference.
///
/// # Errors
///
/// Returns [`CurvatureError::Geometry`] if conversion or sampling fails.
pub fn sample(
    frame: &MetricFrame,
    road: &Road,
    accident: &AccidentPoint,
    path_distance: f64,
) -> Result<SampleTriple, CurvatureError> {
    let line = frame.line_to_metric(&road.geometry)?;
    let at = frame.to_metric(accident.coord())?;
    let metric = sample_metric(&line, at, path_distance)?;

    let mut points = [Coord::zero(); 3];
    for (slot, point) in points.iter_mut().zip(metric) {
        *slot = frame.to_geographic(point)?;
    }

    Ok(SampleTriple {
        crs: frame.source_crs(),
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (200.0, 0.0)])
    }

    #[test]
    fn samples_are_spaced_by_path_distance() {
        let points = sample_metric(&straight(), Coord { x: 100.0, y: 3.0 }, 50.0).unwrap();
        assert_eq!(
            points,
            [
                Coord { x: 50.0, y: 0.0 },
                Coord { x: 100.0, y: 0.0 },
                Coord { x: 150.0, y: 0.0 },
            ]
        );
    }

    #[test]
    fn middle_sample_is_the_on_road_point() {
        let points = sample_metric(&straight(), Coord { x: 30.0, y: -7.0 }, 10.0).unwrap();
        assert!((points[1].x - 30.0).abs() < 1e-9);
        assert!(points[1].y.abs() < 1e-12);
    }

    #[test]
    fn samples_clamp_near_an_end() {
        let points = sample_metric(&straight(), Coord { x: 20.0, y: 0.0 }, 50.0).unwrap();
        assert_eq!(points[0], Coord { x: 0.0, y: 0.0 });
        assert!((points[2].x - 70.0).abs() < 1e-9);
    }

    #[test]
    fn projection_at_endpoint_repeats_the_endpoint() {
        let points = sample_metric(&straight(), Coord { x: 250.0, y: 0.0 }, 50.0).unwrap();
        assert_eq!(points[1], Coord { x: 200.0, y: 0.0 });
        assert_eq!(points[2], Coord { x: 200.0, y: 0.0 });
    }

    #[test]
    fn zero_length_road_cannot_be_sampled() {
        let line = LineString::from(vec![(5.0, 5.0), (5.0, 5.0)]);
        assert!(sample_metric(&line, Coord { x: 5.0, y: 5.0 }, 1.0).is_err());
    }

    #[test]
    fn planar_frame_sampling_keeps_planar_tag() {
        let frame = MetricFrame::planar();
        let road = Road::new(straight());
        let accident = AccidentPoint {
            key: crash_curve_geometry_models::AccidentKey {
                document_type: "1".to_string(),
                year: 2020,
                prefecture_code: "01".to_string(),
                police_code: "001".to_string(),
                report_number: "1".to_string(),
            },
            longitude: 100.0,
            latitude: 0.0,
        };
        let triple = sample(&frame, &road, &accident, 50.0).unwrap();
        assert_eq!(triple.crs, frame.crs());
        assert_eq!(triple.points[0], Coord { x: 50.0, y: 0.0 });
    }
}
