//! `OpenStreetMap` Overpass API road source.
//!
//! One POST per batch. The query unions an `around` filter per point and
//! asks for full way geometry (`out geom`). Overpass deduplicates the
//! union, so returned ways are assigned back to each point by measuring
//! their distance in a metric frame.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use crash_curve_geometry::{FrameCache, FrameSpec, project};
use crash_curve_geometry_models::{AccidentPoint, Road};
use geo::{Coord, LineString};
use serde::Deserialize;

use crate::retry::{self, RetryPolicy};
use crate::{FetchError, RoadSource};

/// Extra distance allowed when assigning ways back to points, in metres.
/// Covers the difference between Overpass's great-circle `around` test and
/// planar distances.
const ASSIGN_SLACK_METRES: f64 = 1.0;

/// Settings for [`OverpassClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverpassOptions {
    /// Interpreter endpoint.
    pub base_url: String,
    /// Tag filter applied to every `around` clause (e.g. `[highway]`).
    pub way_filter: String,
    /// Server-side timeout requested in the query, and the HTTP timeout.
    pub timeout_secs: u64,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Retry behaviour for transient failures.
    pub retry: RetryPolicy,
    /// Frame used to measure way-to-point distances.
    pub frame: FrameSpec,
}

impl Default for OverpassOptions {
    fn default() -> Self {
        Self {
            base_url: "https://overpass-api.de/api/interpreter".to_string(),
            way_filter: "[highway]".to_string(),
            timeout_secs: 180,
            user_agent: concat!("crash-curve/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryPolicy::default(),
            frame: FrameSpec::Utm,
        }
    }
}

/// Fetches road ways from an Overpass interpreter.
pub struct OverpassClient {
    client: reqwest::Client,
    options: OverpassOptions,
}

impl OverpassClient {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built.
    pub fn new(options: OverpassOptions) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;

        Ok(Self { client, options })
    }

    /// The options this client was built with.
    #[must_use]
    pub const fn options(&self) -> &OverpassOptions {
        &self.options
    }
}

#[async_trait]
impl RoadSource for OverpassClient {
    fn id(&self) -> &str {
        "overpass"
    }

    async fn fetch_batch(
        &self,
        points: &[AccidentPoint],
        radius: f64,
    ) -> Result<Vec<Vec<Road>>, FetchError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let query = build_query(
            points,
            radius,
            &self.options.way_filter,
            self.options.timeout_secs,
        );
        log::debug!("Overpass query ({} point(s)): {query}", points.len());

        let body = retry::send_json(&self.options.retry, || {
            self.client
                .post(&self.options.base_url)
                .form(&[("data", query.as_str())])
        })
        .await?;

        let ways = parse_response(body)?;
        log::debug!("Overpass returned {} way(s)", ways.len());

        assign_ways(&self.options.frame, points, &ways, radius)
    }
}

/// Builds an Overpass QL query for all roads within `radius` metres of any
/// of `points`.
#[must_use]
pub fn build_query(
    points: &[AccidentPoint],
    radius: f64,
    way_filter: &str,
    timeout_secs: u64,
) -> String {
    let clauses = points
        .iter()
        .map(|p| {
            format!(
                "way(around:{radius},{lat},{lon}){way_filter};",
                lat = p.latitude,
                lon = p.longitude
            )
        })
        .collect::<String>();

    format!("[out:json][timeout:{timeout_secs}];({clauses});out geom;")
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
    #[serde(default)]
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    #[serde(default)]
    geometry: Vec<Option<LatLon>>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

/// Decodes an Overpass JSON response into roads.
///
/// Non-way elements and ways with fewer than two positions are dropped.
///
/// # Errors
///
/// Returns [`FetchError::Json`] if the body is not an Overpass response, or
/// [`FetchError::Service`] if the server reported a runtime error.
pub fn parse_response(body: serde_json::Value) -> Result<Vec<Road>, FetchError> {
    let response: OverpassResponse = serde_json::from_value(body)?;

    if let Some(remark) = response.remark {
        // Overpass reports timeouts and memory exhaustion here with a
        // partial (often empty) element list.
        return Err(FetchError::Service { message: remark });
    }

    Ok(response
        .elements
        .into_iter()
        .filter(|e| e.kind == "way")
        .filter_map(|e| {
            let coords = e
                .geometry
                .iter()
                .flatten()
                .map(|p| Coord { x: p.lon, y: p.lat })
                .collect::<Vec<_>>();
            if coords.len() < 2 {
                log::debug!("Dropping way {} with {} position(s)", e.id, coords.len());
                return None;
            }

            Some(Road {
                way_id: Some(e.id),
                highway: e.tags.get("highway").cloned(),
                geometry: LineString::new(coords),
            })
        })
        .collect())
}

/// Gives each point the ways within `radius` metres of it, measured in the
/// metric frame chosen for that point.
///
/// # Errors
///
/// Returns [`FetchError::Geometry`] if a point has no usable metric frame.
pub fn assign_ways(
    frame: &FrameSpec,
    points: &[AccidentPoint],
    ways: &[Road],
    radius: f64,
) -> Result<Vec<Vec<Road>>, FetchError> {
    let mut frames = FrameCache::new(frame.clone());
    let mut metric_ways: BTreeMap<String, Vec<Option<LineString<f64>>>> = BTreeMap::new();
    let limit = radius + ASSIGN_SLACK_METRES;

    let mut assigned = Vec::with_capacity(points.len());
    for point in points {
        let frame = frames.frame_for(point.coord())?;
        let at = frame.to_metric(point.coord())?;
        let lines = metric_ways
            .entry(frame.definition().to_string())
            .or_insert_with(|| {
                ways.iter()
                    .map(|w| frame.line_to_metric(&w.geometry).ok())
                    .collect()
            });

        let near = ways
            .iter()
            .zip(lines.iter())
            .filter_map(|(way, line)| {
                let distance = project(line.as_ref()?, at).ok()?.distance_to;
                (distance <= limit).then(|| way.clone())
            })
            .collect::<Vec<_>>();

        assigned.push(near);
    }

    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use crash_curve_geometry_models::AccidentKey;

    use super::*;

    fn point(report: &str, longitude: f64, latitude: f64) -> AccidentPoint {
        AccidentPoint {
            key: AccidentKey {
                document_type: "1".to_string(),
                year: 2023,
                prefecture_code: "13".to_string(),
                police_code: "001".to_string(),
                report_number: report.to_string(),
            },
            longitude,
            latitude,
        }
    }

    #[test]
    fn query_unions_one_clause_per_point() {
        let query = build_query(
            &[point("1", 139.7, 35.6), point("2", 139.8, 35.7)],
            20.0,
            "[highway]",
            180,
        );
        assert_eq!(
            query,
            "[out:json][timeout:180];(way(around:20,35.6,139.7)[highway];\
             way(around:20,35.7,139.8)[highway];);out geom;"
        );
    }

    #[test]
    fn parses_ways_with_geometry_and_tags() {
        let body = serde_json::json!({
            "version": 0.6,
            "elements": [
                {
                    "type": "way",
                    "id": 123,
                    "bounds": {"minlat": 35.0, "minlon": 139.0, "maxlat": 35.1, "maxlon": 139.1},
                    "geometry": [{"lat": 35.0, "lon": 139.0}, {"lat": 35.1, "lon": 139.1}],
                    "tags": {"highway": "primary", "name": "Route 1"}
                },
                {
                    "type": "way",
                    "id": 124,
                    "geometry": [{"lat": 35.0, "lon": 139.0}]
                },
                {"type": "node", "id": 5, "lat": 35.0, "lon": 139.0}
            ]
        });

        let roads = parse_response(body).unwrap();
        assert_eq!(roads.len(), 1);
        assert_eq!(roads[0].way_id, Some(123));
        assert_eq!(roads[0].highway.as_deref(), Some("primary"));
        assert_eq!(roads[0].geometry.0[1], Coord { x: 139.1, y: 35.1 });
    }

    #[test]
    fn null_positions_are_skipped() {
        let body = serde_json::json!({
            "elements": [{
                "type": "way",
                "id": 9,
                "geometry": [null, {"lat": 1.0, "lon": 2.0}, {"lat": 1.5, "lon": 2.5}]
            }]
        });
        let roads = parse_response(body).unwrap();
        assert_eq!(roads[0].geometry.0.len(), 2);
    }

    #[test]
    fn remark_is_a_service_error() {
        let body = serde_json::json!({
            "elements": [],
            "remark": "runtime error: Query timed out in \"query\" at line 1 after 181 seconds."
        });
        assert!(matches!(
            parse_response(body),
            Err(FetchError::Service { message }) if message.contains("timed out")
        ));
    }

    #[test]
    fn malformed_body_is_a_json_error() {
        let body = serde_json::json!({"elements": [{"type": "way"}]});
        assert!(matches!(parse_response(body), Err(FetchError::Json(_))));
    }

    #[test]
    fn ways_are_assigned_to_nearby_points_only() {
        // A north-south way along 139.7000; one point 10 m east of it and
        // one ~900 m east.
        let way = Road {
            way_id: Some(1),
            highway: Some("residential".to_string()),
            geometry: LineString::from(vec![(139.7, 35.67), (139.7, 35.69)]),
        };
        let points = [point("near", 139.7001, 35.68), point("far", 139.71, 35.68)];

        let assigned = assign_ways(&FrameSpec::Utm, &points, &[way], 20.0).unwrap();
        assert_eq!(assigned.len(), 2);
        assert_eq!(assigned[0].len(), 1);
        assert!(assigned[1].is_empty());
    }
}
