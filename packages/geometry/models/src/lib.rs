#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Accident, road, and geometry types shared across the crash-curve
//! pipeline.
//!
//! Geometries never travel untagged: anything that can be expressed in more
//! than one coordinate reference carries an explicit [`Crs`]. Roads and
//! accident points are always stored in geographic WGS84 coordinates; the
//! metric frame used for arithmetic lives in `crash_curve_geometry`.

use geo::{Coord, LineString, Point};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Coordinate reference a geometry is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Crs {
    /// Geographic longitude/latitude on the WGS84 datum (EPSG:4326).
    Wgs84,
    /// A planar, distance-true frame.
    Projected {
        /// PROJ.4 definition of the frame (e.g. `"+proj=utm +zone=54 ..."`),
        /// or `"planar"` for coordinates that were metric to begin with.
        definition: String,
    },
}

impl Crs {
    /// Whether coordinates in this reference are longitude/latitude.
    #[must_use]
    pub const fn is_geographic(&self) -> bool {
        matches!(self, Self::Wgs84)
    }
}

/// The closed set of geometry shapes the pipeline produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Geometry {
    /// A single position (accident location, sample point).
    Point(Point<f64>),
    /// A polyline (road, cropped road segment).
    LineString(LineString<f64>),
}

/// A [`Geometry`] paired with the coordinate reference of its coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedGeometry {
    /// Coordinate reference of `geometry`.
    pub crs: Crs,
    /// The geometry itself.
    pub geometry: Geometry,
}

impl TaggedGeometry {
    /// Tags a geometry as WGS84 longitude/latitude.
    #[must_use]
    pub const fn wgs84(geometry: Geometry) -> Self {
        Self {
            crs: Crs::Wgs84,
            geometry,
        }
    }

    /// Converts to a `GeoJSON` geometry.
    ///
    /// `GeoJSON` (RFC 7946) positions are always WGS84, so projected
    /// geometries are refused rather than silently mislabelled.
    ///
    /// # Errors
    ///
    /// Returns [`NotGeographicError`] if the geometry is not tagged
    /// [`Crs::Wgs84`].
    pub fn to_geojson(&self) -> Result<geojson::Geometry, NotGeographicError> {
        if !self.crs.is_geographic() {
            return Err(NotGeographicError {
                crs: self.crs.clone(),
            });
        }

        let value = match &self.geometry {
            Geometry::Point(point) => geojson::Value::from(point),
            Geometry::LineString(line) => geojson::Value::from(line),
        };

        Ok(geojson::Geometry::new(value))
    }
}

/// Error returned when a projected geometry is written somewhere that only
/// accepts geographic coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected WGS84 geometry, found {crs} geometry")]
pub struct NotGeographicError {
    /// The reference the geometry was actually tagged with.
    pub crs: Crs,
}

/// Opaque key identifying one source accident record.
///
/// The five fields together are unique across the national accident
/// tables; none of them is meaningful on its own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccidentKey {
    /// Record document type (main record vs. supplementary record).
    pub document_type: String,
    /// Calendar year of the accident.
    pub year: u16,
    /// Two-digit prefecture code.
    pub prefecture_code: String,
    /// Police station code within the prefecture.
    pub police_code: String,
    /// Report number within the police station.
    pub report_number: String,
}

impl std::fmt::Display for AccidentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.document_type, self.year, self.prefecture_code, self.police_code, self.report_number
        )
    }
}

/// A single accident location (WGS84) with its record key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccidentPoint {
    /// Key of the source accident record.
    pub key: AccidentKey,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Latitude (WGS84).
    pub latitude: f64,
}

impl AccidentPoint {
    /// Returns the location as a [`Coord`] (`x` = longitude, `y` = latitude).
    #[must_use]
    pub const fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }

    /// Returns the location as a WGS84 [`TaggedGeometry`].
    #[must_use]
    pub fn to_tagged(&self) -> TaggedGeometry {
        TaggedGeometry::wgs84(Geometry::Point(Point::from(self.coord())))
    }
}

/// A road polyline in WGS84 as returned by the map service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Road {
    /// Identifier of the way in the source map, when known.
    pub way_id: Option<u64>,
    /// Road class (`highway=*` value), when known.
    pub highway: Option<String>,
    /// Vertices in longitude/latitude order.
    pub geometry: LineString<f64>,
}

impl Road {
    /// Creates an anonymous road from a WGS84 polyline.
    #[must_use]
    pub const fn new(geometry: LineString<f64>) -> Self {
        Self {
            way_id: None,
            highway: None,
            geometry,
        }
    }

    /// Returns a copy of this road's metadata carrying a different polyline.
    #[must_use]
    pub fn with_geometry(&self, geometry: LineString<f64>) -> Self {
        Self {
            way_id: self.way_id,
            highway: self.highway.clone(),
            geometry,
        }
    }

    /// Returns the polyline as a WGS84 [`TaggedGeometry`].
    #[must_use]
    pub fn to_tagged(&self) -> TaggedGeometry {
        TaggedGeometry::wgs84(Geometry::LineString(self.geometry.clone()))
    }
}

/// All road candidates fetched around one accident point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadCandidates {
    /// The accident the search was centred on.
    pub accident: AccidentPoint,
    /// Roads found within the search radius (possibly none).
    pub roads: Vec<Road>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AccidentKey {
        AccidentKey {
            document_type: "1".to_string(),
            year: 2021,
            prefecture_code: "10".to_string(),
            police_code: "101".to_string(),
            report_number: "0042".to_string(),
        }
    }

    #[test]
    fn accident_key_display_joins_all_fields() {
        assert_eq!(key().to_string(), "1-2021-10-101-0042");
    }

    #[test]
    fn wgs84_line_converts_to_geojson() {
        let road = Road::new(LineString::from(vec![(139.0, 35.0), (139.001, 35.001)]));
        let geometry = road.to_tagged().to_geojson().unwrap();
        match geometry.value {
            geojson::Value::LineString(positions) => {
                assert_eq!(positions.len(), 2);
                assert!((positions[0][0] - 139.0).abs() < 1e-12);
                assert!((positions[1][1] - 35.001).abs() < 1e-12);
            }
            other => panic!("unexpected geometry: {other:?}"),
        }
    }

    #[test]
    fn projected_geometry_is_refused_by_geojson() {
        let tagged = TaggedGeometry {
            crs: Crs::Projected {
                definition: "planar".to_string(),
            },
            geometry: Geometry::Point(Point::new(10.0, 20.0)),
        };
        let err = tagged.to_geojson().unwrap_err();
        assert_eq!(err.crs, tagged.crs);
        assert_eq!(
            err.to_string(),
            "expected WGS84 geometry, found projected geometry"
        );
    }

    #[test]
    fn not_geographic_error_boxes_as_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(NotGeographicError { crs: Crs::Wgs84 });
        assert!(err.source().is_none());
        assert_eq!(
            err.to_string(),
            format!("expected WGS84 geometry, found {} geometry", Crs::Wgs84)
        );
    }

    #[test]
    fn road_candidates_round_trip_through_json() {
        let candidates = RoadCandidates {
            accident: AccidentPoint {
                key: key(),
                longitude: 139.5,
                latitude: 35.5,
            },
            roads: vec![Road {
                way_id: Some(7),
                highway: Some("secondary".to_string()),
                geometry: LineString::from(vec![(139.5, 35.5), (139.6, 35.6)]),
            }],
        };
        let json = serde_json::to_string(&candidates).unwrap();
        let parsed: RoadCandidates = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, candidates);
    }
}
