//! Cropping a road to the stretch the curvature was measured on.

use crash_curve_geometry::{MetricFrame, split};
use crash_curve_geometry_models::{AccidentPoint, Road};

use crate::{CurvatureError, sample_metric};

/// Returns the part of `road` between the outer two curvature samples.
///
/// When splitting at those samples does not give exactly three pieces
/// (an outer sample clamped onto an end of the road), the road is returned
/// unchanged.
///
/// # Errors
///
/// Returns [`CurvatureError::Geometry`] if the road cannot be converted,
/// sampled, or split.
pub fn crop_to_segment(
    frame: &MetricFrame,
    road: &Road,
    accident: &AccidentPoint,
    path_distance: f64,
    snap_tolerance: f64,
) -> Result<Road, CurvatureError> {
    let line = frame.line_to_metric(&road.geometry)?;
    let at = frame.to_metric(accident.coord())?;
    let [before, _, after] = sample_metric(&line, at, path_distance)?;

    let mut pieces = split(&line, &[before, after], snap_tolerance)?;
    if pieces.len() != 3 {
        log::trace!(
            "Road split into {} piece(s) around {}, keeping it whole",
            pieces.len(),
            accident.key
        );
        return Ok(road.clone());
    }

    let middle = pieces.swap_remove(1);
    Ok(road.with_geometry(frame.line_to_geographic(&middle)?))
}

#[cfg(test)]
mod tests {
    use crash_curve_geometry::line_length;
    use crash_curve_geometry_models::AccidentKey;
    use geo::{Coord, LineString};

    use super::*;

    fn accident_at(x: f64, y: f64) -> AccidentPoint {
        AccidentPoint {
            key: AccidentKey {
                document_type: "1".to_string(),
                year: 2019,
                prefecture_code: "13".to_string(),
                police_code: "100".to_string(),
                report_number: "7".to_string(),
            },
            longitude: x,
            latitude: y,
        }
    }

    fn bent_road() -> Road {
        Road::new(LineString::from(vec![
            (0.0, 0.0),
            (100.0, 0.0),
            (100.0, 100.0),
        ]))
    }

    #[test]
    fn interior_accident_crops_to_the_sampled_span() {
        let frame = MetricFrame::planar();
        let cropped =
            crop_to_segment(&frame, &bent_road(), &accident_at(100.0, 0.0), 50.0, 1e-3).unwrap();

        assert!((line_length(&cropped.geometry) - 100.0).abs() < 1e-9);
        let expected = [
            Coord { x: 50.0, y: 0.0 },
            Coord { x: 100.0, y: 0.0 },
            Coord { x: 100.0, y: 50.0 },
        ];
        assert_eq!(cropped.geometry.0.len(), expected.len());
        for (actual, expected) in cropped.geometry.coords().zip(expected) {
            assert!((actual.x - expected.x).abs() < 1e-9);
            assert!((actual.y - expected.y).abs() < 1e-9);
        }
    }

    #[test]
    fn cropped_vertices_stay_on_the_original_road() {
        let frame = MetricFrame::planar();
        let road = bent_road();
        let cropped =
            crop_to_segment(&frame, &road, &accident_at(60.0, 4.0), 25.0, 1e-3).unwrap();

        for vertex in cropped.geometry.coords() {
            let p = crash_curve_geometry::project(&road.geometry, *vertex).unwrap();
            assert!(p.distance_to < 1e-9);
            assert!(p.distance_along >= 35.0 - 1e-9 && p.distance_along <= 85.0 + 1e-9);
        }
    }

    #[test]
    fn accident_near_an_end_keeps_the_whole_road() {
        let frame = MetricFrame::planar();
        let road = bent_road();
        let cropped =
            crop_to_segment(&frame, &road, &accident_at(10.0, 0.0), 30.0, 1e-3).unwrap();
        assert_eq!(cropped, road);
    }

    #[test]
    fn metadata_is_carried_over() {
        let frame = MetricFrame::planar();
        let road = Road {
            way_id: Some(42),
            highway: Some("tertiary".to_string()),
            ..bent_road()
        };
        let cropped =
            crop_to_segment(&frame, &road, &accident_at(100.0, 0.0), 30.0, 1e-3).unwrap();
        assert_eq!(cropped.way_id, Some(42));
        assert_eq!(cropped.highway.as_deref(), Some("tertiary"));
    }
}
