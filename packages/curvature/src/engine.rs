//! Batch curvature over the combined road dataset.

use std::sync::Arc;

use crash_curve_geometry::{FrameCache, FrameSpec, MetricFrame, project};
use crash_curve_geometry_models::{AccidentPoint, Road, RoadCandidates};
use crash_curve_progress::ProgressCallback;
use serde::{Deserialize, Serialize};

use crate::{CurvatureResult, DEFAULT_PATH_DISTANCE, crop_to_segment, sample, try_curvature};

/// Picks the candidate road closest to `accident`, with its distance in
/// frame units.
///
/// Roads that cannot be projected onto are skipped. Ties go to the earlier
/// candidate.
#[must_use]
pub fn nearest_road<'a>(
    frame: &MetricFrame,
    accident: &AccidentPoint,
    roads: &'a [Road],
) -> Option<(&'a Road, f64)> {
    let at = frame.to_metric(accident.coord()).ok()?;
    let mut best: Option<(&Road, f64)> = None;

    for road in roads {
        let distance = match frame
            .line_to_metric(&road.geometry)
            .and_then(|line| project(&line, at))
        {
            Ok(projection) => projection.distance_to,
            Err(e) => {
                log::debug!("Skipping road {:?} near {}: {e}", road.way_id, accident.key);
                continue;
            }
        };

        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((road, distance));
        }
    }

    best
}

/// Curvature outcome for one accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvatureRecord {
    /// The accident.
    pub accident: AccidentPoint,
    /// Closest candidate road, if there was any usable one.
    pub nearest_road: Option<Road>,
    /// Distance from the accident to that road, in metres.
    pub road_distance: Option<f64>,
    /// Menger curvature in 1/m; `None` when it could not be estimated.
    pub curvature: CurvatureResult,
}

impl CurvatureRecord {
    /// Builds a `GeoJSON` feature whose geometry is the nearest road and
    /// whose properties are the accident key, location, and curvature.
    ///
    /// # Errors
    ///
    /// Returns an error if the road geometry is not WGS84.
    pub fn to_feature(
        &self,
    ) -> Result<geojson::Feature, crash_curve_geometry_models::NotGeographicError> {
        let geometry = self
            .nearest_road
            .as_ref()
            .map(|road| road.to_tagged().to_geojson())
            .transpose()?;

        let key = &self.accident.key;
        let properties = serde_json::json!({
            "document_type": key.document_type,
            "year": key.year,
            "prefecture_code": key.prefecture_code,
            "police_code": key.police_code,
            "report_number": key.report_number,
            "longitude": self.accident.longitude,
            "latitude": self.accident.latitude,
            "way_id": self.nearest_road.as_ref().and_then(|r| r.way_id),
            "highway": self.nearest_road.as_ref().and_then(|r| r.highway.clone()),
            "road_distance": self.road_distance,
            "curvature": self.curvature,
        });

        Ok(geojson::Feature {
            bbox: None,
            geometry,
            id: None,
            properties: properties.as_object().cloned(),
            foreign_members: None,
        })
    }
}

/// A road cropped to the span around one accident.
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedRoad {
    /// The accident the crop is centred on.
    pub accident: AccidentPoint,
    /// The cropped road, or the whole nearest road if cropping was not
    /// possible.
    pub road: Road,
}

/// Counts from one batch curvature pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurvatureSummary {
    /// Accidents processed.
    pub total: usize,
    /// Accidents with a curvature value.
    pub computed: usize,
    /// Accidents whose curvature is null.
    pub null: usize,
    /// Accidents with no usable candidate road.
    pub without_road: usize,
}

/// Computes curvature for many accidents, reusing metric frames between
/// them.
#[derive(Debug)]
pub struct CurvatureEngine {
    frames: FrameCache,
    path_distance: f64,
    snap_tolerance: f64,
}

impl CurvatureEngine {
    /// Creates an engine.
    #[must_use]
    pub const fn new(frame: FrameSpec, path_distance: f64, snap_tolerance: f64) -> Self {
        Self {
            frames: FrameCache::new(frame),
            path_distance,
            snap_tolerance,
        }
    }

    /// Arc-length offset between samples.
    #[must_use]
    pub const fn path_distance(&self) -> f64 {
        self.path_distance
    }

    /// Evaluates one accident against its candidate roads.
    ///
    /// Never fails; every problem is logged and yields a null curvature.
    pub fn evaluate(&mut self, candidates: &RoadCandidates) -> CurvatureRecord {
        let accident = &candidates.accident;
        let frame = match self.frames.frame_for(accident.coord()) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("No metric frame for {}: {e}", accident.key);
                return CurvatureRecord {
                    accident: accident.clone(),
                    nearest_road: None,
                    road_distance: None,
                    curvature: None,
                };
            }
        };

        let Some((road, distance)) = nearest_road(frame, accident, &candidates.roads) else {
            log::debug!("No usable road for {}", accident.key);
            return CurvatureRecord {
                accident: accident.clone(),
                nearest_road: None,
                road_distance: None,
                curvature: None,
            };
        };

        let measured = sample(frame, road, accident, self.path_distance)
            .and_then(|triple| try_curvature(&triple, frame));
        let curvature = match measured {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Null curvature for {}: {e}", accident.key);
                None
            }
        };

        CurvatureRecord {
            accident: accident.clone(),
            nearest_road: Some(road.clone()),
            road_distance: Some(distance),
            curvature,
        }
    }

    /// Evaluates every accident in order, reporting one progress unit per
    /// accident.
    pub fn evaluate_all(
        &mut self,
        items: &[RoadCandidates],
        progress: &Arc<dyn ProgressCallback>,
    ) -> (Vec<CurvatureRecord>, CurvatureSummary) {
        progress.set_total(items.len() as u64);

        let mut summary = CurvatureSummary {
            total: items.len(),
            ..CurvatureSummary::default()
        };
        let mut records = Vec::with_capacity(items.len());

        for candidates in items {
            let record = self.evaluate(candidates);
            if record.nearest_road.is_none() {
                summary.without_road += 1;
            }
            if record.curvature.is_some() {
                summary.computed += 1;
            } else {
                summary.null += 1;
            }
            records.push(record);
            progress.inc(1);
        }

        progress.finish(format!(
            "{} curvature(s), {} null",
            summary.computed, summary.null
        ));
        log::info!(
            "Curvature: {} accident(s), {} computed, {} null ({} without a road)",
            summary.total,
            summary.computed,
            summary.null,
            summary.without_road
        );

        (records, summary)
    }

    /// Crops each accident's nearest road to its sampled span. Accidents
    /// without a usable road are skipped.
    pub fn crop_all(
        &mut self,
        items: &[RoadCandidates],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Vec<CroppedRoad> {
        progress.set_total(items.len() as u64);
        let mut cropped = Vec::with_capacity(items.len());

        for candidates in items {
            progress.inc(1);
            let accident = &candidates.accident;
            let frame = match self.frames.frame_for(accident.coord()) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("No metric frame for {}: {e}", accident.key);
                    continue;
                }
            };
            let Some((road, _)) = nearest_road(frame, accident, &candidates.roads) else {
                continue;
            };

            match crop_to_segment(
                frame,
                road,
                accident,
                self.path_distance,
                self.snap_tolerance,
            ) {
                Ok(road) => cropped.push(CroppedRoad {
                    accident: accident.clone(),
                    road,
                }),
                Err(e) => log::debug!("Could not crop road for {}: {e}", accident.key),
            }
        }

        progress.finish(format!("{} cropped road(s)", cropped.len()));
        cropped
    }
}

impl Default for CurvatureEngine {
    fn default() -> Self {
        Self::new(
            FrameSpec::default(),
            DEFAULT_PATH_DISTANCE,
            crash_curve_geometry::DEFAULT_SNAP_TOLERANCE,
        )
    }
}
