//! Conversion between WGS84 longitude/latitude and distance-true planar
//! frames.
//!
//! Projections are backed by `proj4rs`. A UTM zone is picked from an anchor
//! position, so each accident can be measured in the zone it falls in.

use std::collections::BTreeMap;

use crash_curve_geometry_models::Crs;
use geo::{Coord, LineString};
use proj4rs::{proj::Proj, transform::transform};
use serde::{Deserialize, Serialize};

use crate::GeometryError;

/// Definition string of the identity frame.
pub const PLANAR: &str = "planar";

const WGS84_GEOGRAPHIC: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";

/// How to choose the metric frame for a computation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameSpec {
    /// WGS84 UTM, zone and hemisphere taken from the anchor position.
    #[default]
    Utm,
    /// A fixed PROJ.4 definition in metres (e.g. a national plane
    /// rectangular system).
    Proj {
        /// PROJ.4 definition of the metric frame.
        definition: String,
    },
    /// Coordinates are already planar and metric; no conversion happens.
    Planar,
}

impl FrameSpec {
    /// Returns the PROJ.4 definition (or [`PLANAR`]) this spec selects for
    /// the given WGS84 anchor.
    #[must_use]
    pub fn definition_for(&self, anchor: Coord<f64>) -> String {
        match self {
            Self::Utm => utm_definition(anchor),
            Self::Proj { definition } => definition.clone(),
            Self::Planar => PLANAR.to_string(),
        }
    }

    /// Builds the metric frame for the given anchor.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the anchor is non-finite or the
    /// definition cannot be parsed.
    pub fn resolve(&self, anchor: Coord<f64>) -> Result<MetricFrame, GeometryError> {
        if matches!(self, Self::Utm) {
            ensure_finite(anchor)?;
        }
        MetricFrame::from_definition(&self.definition_for(anchor))
    }
}

/// PROJ.4 definition of the WGS84 UTM zone containing `anchor`.
///
/// Zones follow the regular 6° grid; the Norway/Svalbard exceptions are not
/// applied.
#[must_use]
pub fn utm_definition(anchor: Coord<f64>) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let zone = (((anchor.x + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60);
    let south = if anchor.y < 0.0 { " +south" } else { "" };

    format!("+proj=utm +zone={zone}{south} +datum=WGS84 +units=m +no_defs +type=crs")
}

/// A distance-true planar frame and the way back to WGS84.
pub struct MetricFrame {
    definition: String,
    projections: Option<(Proj, Proj)>,
}

impl std::fmt::Debug for MetricFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricFrame")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl MetricFrame {
    /// The identity frame for coordinates that are already metric.
    #[must_use]
    pub fn planar() -> Self {
        Self {
            definition: PLANAR.to_string(),
            projections: None,
        }
    }

    /// Builds a frame from a PROJ.4 definition, or the identity frame for
    /// [`PLANAR`].
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if either definition fails to
    /// parse.
    pub fn from_definition(definition: &str) -> Result<Self, GeometryError> {
        if definition == PLANAR {
            return Ok(Self::planar());
        }

        let geographic =
            Proj::from_proj_string(WGS84_GEOGRAPHIC).map_err(|e| GeometryError::Projection {
                message: format!("failed to build geographic frame: {e:?}"),
            })?;
        let metric =
            Proj::from_proj_string(definition).map_err(|e| GeometryError::Projection {
                message: format!("failed to build metric frame '{definition}': {e:?}"),
            })?;

        Ok(Self {
            definition: definition.to_string(),
            projections: Some((geographic, metric)),
        })
    }

    /// The definition this frame was built from.
    #[must_use]
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Reference of coordinates after [`Self::to_metric`].
    #[must_use]
    pub fn crs(&self) -> Crs {
        Crs::Projected {
            definition: self.definition.clone(),
        }
    }

    /// Reference of coordinates before [`Self::to_metric`]: WGS84 for real
    /// projections, the frame itself for the identity frame.
    #[must_use]
    pub fn source_crs(&self) -> Crs {
        if self.projections.is_some() {
            Crs::Wgs84
        } else {
            self.crs()
        }
    }

    /// Converts a WGS84 coordinate into this frame.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the coordinate is non-finite or the
    /// transformation fails.
    pub fn to_metric(&self, coord: Coord<f64>) -> Result<Coord<f64>, GeometryError> {
        ensure_finite(coord)?;

        let Some((geographic, metric)) = &self.projections else {
            return Ok(coord);
        };

        let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
        transform(geographic, metric, &mut point).map_err(|e| GeometryError::Projection {
            message: format!("({}, {}) -> {}: {e:?}", coord.x, coord.y, self.definition),
        })?;

        Ok(Coord {
            x: point.0,
            y: point.1,
        })
    }

    /// Converts a coordinate in this frame back to WGS84.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the coordinate is non-finite or the
    /// transformation fails.
    pub fn to_geographic(&self, coord: Coord<f64>) -> Result<Coord<f64>, GeometryError> {
        ensure_finite(coord)?;

        let Some((geographic, metric)) = &self.projections else {
            return Ok(coord);
        };

        let mut point = (coord.x, coord.y, 0.0);
        transform(metric, geographic, &mut point).map_err(|e| GeometryError::Projection {
            message: format!("{} ({}, {}) -> WGS84: {e:?}", self.definition, coord.x, coord.y),
        })?;

        Ok(Coord {
            x: point.0.to_degrees(),
            y: point.1.to_degrees(),
        })
    }

    /// Converts every vertex of a WGS84 polyline into this frame.
    ///
    /// # Errors
    ///
    /// Returns the first vertex conversion error.
    pub fn line_to_metric(&self, line: &LineString<f64>) -> Result<LineString<f64>, GeometryError> {
        line.coords()
            .map(|c| self.to_metric(*c))
            .collect::<Result<Vec<_>, _>>()
            .map(LineString::new)
    }

    /// Converts every vertex of a metric polyline back to WGS84.
    ///
    /// # Errors
    ///
    /// Returns the first vertex conversion error.
    pub fn line_to_geographic(
        &self,
        line: &LineString<f64>,
    ) -> Result<LineString<f64>, GeometryError> {
        line.coords()
            .map(|c| self.to_geographic(*c))
            .collect::<Result<Vec<_>, _>>()
            .map(LineString::new)
    }
}

/// Lazily built frames keyed by definition.
///
/// With [`FrameSpec::Utm`] every accident may land in a different zone;
/// the cache keeps one parsed frame per zone instead of one per accident.
#[derive(Debug)]
pub struct FrameCache {
    spec: FrameSpec,
    frames: BTreeMap<String, MetricFrame>,
}

impl FrameCache {
    /// Creates an empty cache for the given spec.
    #[must_use]
    pub const fn new(spec: FrameSpec) -> Self {
        Self {
            spec,
            frames: BTreeMap::new(),
        }
    }

    /// The spec frames are resolved with.
    #[must_use]
    pub const fn spec(&self) -> &FrameSpec {
        &self.spec
    }

    /// Returns the frame for a WGS84 anchor, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the frame cannot be built.
    pub fn frame_for(&mut self, anchor: Coord<f64>) -> Result<&MetricFrame, GeometryError> {
        if matches!(self.spec, FrameSpec::Utm) {
            ensure_finite(anchor)?;
        }

        let definition = self.spec.definition_for(anchor);
        if !self.frames.contains_key(&definition) {
            log::debug!("Building metric frame: {definition}");
            let frame = MetricFrame::from_definition(&definition)?;
            self.frames.insert(definition.clone(), frame);
        }

        Ok(&self.frames[&definition])
    }
}

fn ensure_finite(coord: Coord<f64>) -> Result<(), GeometryError> {
    if coord.x.is_finite() && coord.y.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::NonFinite {
            message: format!("coordinate ({}, {})", coord.x, coord.y),
        })
    }
}
