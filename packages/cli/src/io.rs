//! File formats at the edges of the pipeline: accident CSV in, cluster and
//! sweep CSV out, newline-delimited `GeoJSON` out.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crash_curve_cluster::{ClusteredAccident, SweepTable};
use crash_curve_curvature::CroppedRoad;
use crash_curve_geometry_models::{AccidentKey, AccidentPoint, NotGeographicError, Road};
use serde::{Deserialize, Serialize};

/// Errors reading or writing pipeline files.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A CSV file could not be opened, parsed, or written.
    #[error("CSV error at {path}: {source}")]
    Csv {
        /// File being processed.
        path: String,
        /// Underlying error.
        source: csv::Error,
    },

    /// A file could not be created or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File being processed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A feature could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A projected geometry reached a WGS84-only output.
    #[error(transparent)]
    NotGeographic(#[from] NotGeographicError),
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> DataError + '_ {
    move |source| DataError::Csv {
        path: path.display().to_string(),
        source,
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DataError + '_ {
    move |source| DataError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// One row of the accident table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccidentRow {
    document_type: String,
    year: u16,
    prefecture_code: String,
    police_code: String,
    report_number: String,
    longitude: f64,
    latitude: f64,
}

impl From<AccidentRow> for AccidentPoint {
    fn from(row: AccidentRow) -> Self {
        Self {
            key: AccidentKey {
                document_type: row.document_type,
                year: row.year,
                prefecture_code: row.prefecture_code,
                police_code: row.police_code,
                report_number: row.report_number,
            },
            longitude: row.longitude,
            latitude: row.latitude,
        }
    }
}

/// One row of the selected-clustering table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterRow {
    document_type: String,
    year: u16,
    prefecture_code: String,
    police_code: String,
    report_number: String,
    longitude: f64,
    latitude: f64,
    cluster: u32,
}

impl From<&ClusteredAccident> for ClusterRow {
    fn from(item: &ClusteredAccident) -> Self {
        let key = &item.accident.key;
        Self {
            document_type: key.document_type.clone(),
            year: key.year,
            prefecture_code: key.prefecture_code.clone(),
            police_code: key.police_code.clone(),
            report_number: key.report_number.clone(),
            longitude: item.accident.longitude,
            latitude: item.accident.latitude,
            cluster: item.cluster,
        }
    }
}

impl From<ClusterRow> for ClusteredAccident {
    fn from(row: ClusterRow) -> Self {
        Self {
            cluster: row.cluster,
            accident: AccidentRow {
                document_type: row.document_type,
                year: row.year,
                prefecture_code: row.prefecture_code,
                police_code: row.police_code,
                report_number: row.report_number,
                longitude: row.longitude,
                latitude: row.latitude,
            }
            .into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SweepRow {
    radius: f64,
    min_points: usize,
    clusters: u32,
    noise: usize,
}

/// Reads the accident table. Malformed rows and rows with non-finite
/// coordinates are skipped with a warning.
///
/// # Errors
///
/// Returns [`DataError::Csv`] if the file cannot be opened or has no
/// usable header.
pub fn read_accidents(path: &Path) -> Result<Vec<AccidentPoint>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error(path))?;

    let mut accidents = Vec::new();
    let mut skipped = 0_usize;
    for (line, result) in reader.deserialize::<AccidentRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                log::warn!("{}: skipping malformed row {}: {e}", path.display(), line + 2);
                skipped += 1;
                continue;
            }
        };
        if !(row.longitude.is_finite() && row.latitude.is_finite()) {
            log::warn!(
                "{}: skipping row {} with non-finite coordinates",
                path.display(),
                line + 2
            );
            skipped += 1;
            continue;
        }
        accidents.push(row.into());
    }

    log::info!(
        "Read {} accident(s) from {} ({skipped} skipped)",
        accidents.len(),
        path.display()
    );
    Ok(accidents)
}

/// Writes the non-noise accidents of a clustering, one row each.
///
/// # Errors
///
/// Returns [`DataError`] if the file cannot be written.
pub fn write_clusters(path: &Path, clustered: &[ClusteredAccident]) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;
    for item in clustered {
        writer
            .serialize(ClusterRow::from(item))
            .map_err(csv_error(path))?;
    }
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Reads a table written by [`write_clusters`].
///
/// # Errors
///
/// Returns [`DataError::Csv`] if the file cannot be read or a row does not
/// parse.
pub fn read_clusters(path: &Path) -> Result<Vec<ClusteredAccident>, DataError> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    reader
        .deserialize::<ClusterRow>()
        .map(|row| row.map(ClusteredAccident::from).map_err(csv_error(path)))
        .collect()
}

/// Writes one `radius,min_points,clusters,noise` row per sweep cell.
///
/// # Errors
///
/// Returns [`DataError`] if the file cannot be written.
pub fn write_sweep(path: &Path, table: &SweepTable) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;
    for cell in &table.cells {
        writer
            .serialize(SweepRow {
                radius: cell.radius.0,
                min_points: cell.min_points,
                clusters: cell.cluster_count(),
                noise: cell.noise_count(),
            })
            .map_err(csv_error(path))?;
    }
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Renders the sweep as a console table.
#[must_use]
pub fn format_sweep_table(table: &SweepTable) -> String {
    let mut out = format!(
        "{:>10} {:>10} {:>10} {:>10}\n{}\n",
        "RADIUS",
        "MIN_PTS",
        "CLUSTERS",
        "NOISE",
        "-".repeat(43)
    );
    for cell in &table.cells {
        out.push_str(&format!(
            "{:>10} {:>10} {:>10} {:>10}\n",
            cell.radius,
            cell.min_points,
            cell.cluster_count(),
            cell.noise_count()
        ));
    }
    out
}

/// Writes features as newline-delimited `GeoJSON`, one feature per line.
/// Returns the number of features written.
///
/// # Errors
///
/// Returns [`DataError`] if the file cannot be written.
pub fn write_geojsonseq(
    path: &Path,
    features: impl IntoIterator<Item = geojson::Feature>,
) -> Result<usize, DataError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);

    let mut count = 0;
    for feature in features {
        serde_json::to_writer(&mut writer, &feature)?;
        writer.write_all(b"\n").map_err(io_error(path))?;
        count += 1;
    }
    writer.flush().map_err(io_error(path))?;

    log::info!("Wrote {count} feature(s) to {}", path.display());
    Ok(count)
}

/// A road feature with the given properties.
///
/// # Errors
///
/// Returns [`NotGeographicError`] if the road is not in WGS84.
pub fn road_feature(
    road: &Road,
    mut properties: serde_json::Map<String, serde_json::Value>,
) -> Result<geojson::Feature, NotGeographicError> {
    properties.insert("way_id".to_string(), serde_json::json!(road.way_id));
    properties.insert("highway".to_string(), serde_json::json!(road.highway));

    Ok(geojson::Feature {
        bbox: None,
        geometry: Some(road.to_tagged().to_geojson()?),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Feature for a cropped road, keyed by its accident.
///
/// # Errors
///
/// Returns [`NotGeographicError`] if the road is not in WGS84.
pub fn cropped_feature(cropped: &CroppedRoad) -> Result<geojson::Feature, NotGeographicError> {
    let key = &cropped.accident.key;
    let properties = serde_json::json!({
        "document_type": key.document_type,
        "year": key.year,
        "prefecture_code": key.prefecture_code,
        "police_code": key.police_code,
        "report_number": key.report_number,
    });
    road_feature(&cropped.road, properties.as_object().cloned().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use crash_curve_cluster::sweep;
    use crash_curve_progress::NullProgress;
    use geo::LineString;

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("crash_curve_cli_io_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn accident_rows_with_bad_coordinates_are_skipped() {
        let dir = scratch("accidents");
        let path = dir.join("accidents.csv");
        std::fs::write(
            &path,
            "document_type,year,prefecture_code,police_code,report_number,longitude,latitude\n\
             1,2021,01,101,0001,141.35,43.06\n\
             1,2021,01,101,0002,NaN,43.07\n\
             1,2021,01,101,0003,,43.08\n\
             2,2022,13,009,0042,139.70,35.68\n",
        )
        .unwrap();

        let accidents = read_accidents(&path).unwrap();
        assert_eq!(accidents.len(), 2);
        // Codes are kept verbatim, leading zeros included.
        assert_eq!(accidents[0].key.prefecture_code, "01");
        assert_eq!(accidents[1].key.report_number, "0042");
        assert!((accidents[1].longitude - 139.70).abs() < f64::EPSILON);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn cluster_table_reads_back() {
        let dir = scratch("clusters");
        let path = dir.join("clusters.csv");
        let clustered = vec![ClusteredAccident {
            accident: AccidentPoint {
                key: AccidentKey {
                    document_type: "1".to_string(),
                    year: 2020,
                    prefecture_code: "27".to_string(),
                    police_code: "010".to_string(),
                    report_number: "77".to_string(),
                },
                longitude: 135.5,
                latitude: 34.7,
            },
            cluster: 3,
        }];

        write_clusters(&path, &clustered).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "document_type,year,prefecture_code,police_code,report_number,longitude,latitude,cluster\n"
        ));
        assert_eq!(read_clusters(&path).unwrap(), clustered);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sweep_table_has_one_row_per_cell() {
        let dir = scratch("sweep");
        let path = dir.join("sweep.csv");
        let points = [
            geo::Coord { x: 0.0, y: 0.0 },
            geo::Coord { x: 5.0, y: 0.0 },
            geo::Coord { x: 500.0, y: 0.0 },
        ];
        let progress: Arc<dyn crash_curve_progress::ProgressCallback> = Arc::new(NullProgress);
        let table = sweep(&points, &[10.0, 1.0], &[1], &progress).unwrap();

        write_sweep(&path, &table).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "radius,min_points,clusters,noise");
        assert_eq!(lines[1], "10.0,1,1,1");
        assert_eq!(lines[2], "1.0,1,0,3");

        let console = format_sweep_table(&table);
        assert_eq!(console.lines().count(), 4);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn geojsonseq_is_one_feature_per_line() {
        let dir = scratch("geojsonseq");
        let path = dir.join("roads.geojsonseq");
        let road = Road {
            way_id: Some(42),
            highway: Some("tertiary".to_string()),
            geometry: LineString::from(vec![(139.0, 35.0), (139.001, 35.0)]),
        };
        let mut properties = serde_json::Map::new();
        properties.insert("cluster".to_string(), serde_json::json!(5));
        let feature = road_feature(&road, properties).unwrap();

        let written = write_geojsonseq(&path, vec![feature.clone(), feature]).unwrap();
        assert_eq!(written, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        for line in text.lines() {
            let parsed: geojson::Feature = line.parse::<geojson::GeoJson>().unwrap().try_into().unwrap();
            assert_eq!(parsed.property("cluster"), Some(&serde_json::json!(5)));
            assert_eq!(parsed.property("way_id"), Some(&serde_json::json!(42)));
        }

        std::fs::remove_dir_all(&dir).ok();
    }
}
