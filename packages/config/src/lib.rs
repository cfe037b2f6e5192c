#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline configuration.
//!
//! Defaults are embedded from `config/default.toml` at compile time. A user
//! file can override any subset of keys; tables are merged recursively and
//! the result is validated once.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crash_curve_fetch::{BatchNaming, OverpassOptions, RetryPolicy};
use crash_curve_geometry::FrameSpec;
use serde::Deserialize;

pub use paths::DataPaths;

const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML is malformed or does not match the expected shape.
    #[error("invalid configuration TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// Curvature settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurvatureConfig {
    /// Arc-length offset of the outer samples, in metres.
    pub path_distance: f64,
    /// Road search radius around each accident, in metres.
    pub search_radius: f64,
    /// Snapping tolerance for cut points, in metres.
    pub snap_tolerance: f64,
}

/// DBSCAN sweep and selection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusterConfig {
    /// Radii to sweep, in metres.
    pub radius_grid: Vec<f64>,
    /// Minimum-point counts to sweep.
    pub min_points_grid: Vec<usize>,
    /// Radius of the selected configuration.
    pub selected_radius: f64,
    /// Minimum points of the selected configuration.
    pub selected_min_points: usize,
    /// Road search radius around cluster centroids, in metres.
    pub detail_search_radius: f64,
}

/// Road fetching settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchConfig {
    /// Overpass interpreter endpoint.
    pub base_url: String,
    /// Overpass tag filter for ways.
    pub way_filter: String,
    /// Points per request.
    pub batch_size: usize,
    /// Request timeout, in seconds.
    pub timeout_secs: u64,
    /// Pause between requests, in milliseconds.
    pub courtesy_delay_ms: u64,
    /// `User-Agent` header.
    pub user_agent: String,
    /// Retry behaviour.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Batch file naming.
    #[serde(default)]
    pub naming: BatchNaming,
}

impl FetchConfig {
    /// Pause between requests.
    #[must_use]
    pub const fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }

    /// Overpass client options measuring distances in `frame`.
    #[must_use]
    pub fn overpass_options(&self, frame: &FrameSpec) -> OverpassOptions {
        OverpassOptions {
            base_url: self.base_url.clone(),
            way_filter: self.way_filter.clone(),
            timeout_secs: self.timeout_secs,
            user_agent: self.user_agent.clone(),
            retry: self.retry,
            frame: frame.clone(),
        }
    }
}

/// Where pipeline files live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
    /// Root of all inputs and outputs.
    pub data_dir: PathBuf,
}

/// The full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    /// Metric frame selection.
    pub frame: FrameSpec,
    /// Curvature settings.
    pub curvature: CurvatureConfig,
    /// Clustering settings.
    pub cluster: ClusterConfig,
    /// Fetch settings.
    pub fetch: FetchConfig,
    /// File locations.
    pub paths: PathsConfig,
}

impl PipelineConfig {
    /// The embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded TOML does not parse, which
    /// the tests guard against.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::from_toml_strs(&[DEFAULT_TOML])
    }

    /// Defaults overridden by the file at `path`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse,
    /// or yields out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Self::defaults();
        };

        let user = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loading configuration overrides from {}", path.display());

        Self::from_toml_strs(&[DEFAULT_TOML, &user])
    }

    /// Merges TOML documents left to right (later keys win) and validates
    /// the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any document does not parse or the merged
    /// values are invalid.
    pub fn from_toml_strs(documents: &[&str]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for document in documents {
            let table: toml::Table = toml::from_str(document)?;
            merge_tables(&mut merged, table);
        }

        let config: Self = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Paths derived from [`PathsConfig::data_dir`].
    #[must_use]
    pub fn data_paths(&self) -> DataPaths {
        DataPaths::new(&self.paths.data_dir)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("curvature.path_distance", self.curvature.path_distance),
            ("curvature.search_radius", self.curvature.search_radius),
            ("cluster.selected_radius", self.cluster.selected_radius),
            ("cluster.detail_search_radius", self.cluster.detail_search_radius),
        ];
        for (key, value) in positive {
            ensure(value.is_finite() && value > 0.0, || {
                format!("{key} must be positive, got {value}")
            })?;
        }

        let tolerance = self.curvature.snap_tolerance;
        ensure(tolerance.is_finite() && tolerance >= 0.0, || {
            format!("curvature.snap_tolerance must not be negative, got {tolerance}")
        })?;

        ensure(!self.cluster.radius_grid.is_empty(), || {
            "cluster.radius_grid must not be empty".to_string()
        })?;
        ensure(!self.cluster.min_points_grid.is_empty(), || {
            "cluster.min_points_grid must not be empty".to_string()
        })?;
        if let Some(bad) = self
            .cluster
            .radius_grid
            .iter()
            .find(|r| !(r.is_finite() && **r > 0.0))
        {
            return Err(ConfigError::Invalid {
                message: format!("cluster.radius_grid entries must be positive, got {bad}"),
            });
        }

        ensure(self.fetch.batch_size > 0, || {
            "fetch.batch_size must be at least 1".to_string()
        })?;
        ensure(self.fetch.naming.width > 0, || {
            "fetch.naming.width must be at least 1".to_string()
        })?;
        ensure(!self.fetch.naming.prefix.is_empty() || !self.fetch.naming.suffix.is_empty(), || {
            "fetch.naming needs a prefix or a suffix".to_string()
        })?;

        if let FrameSpec::Proj { definition } = &self.frame {
            ensure(!definition.trim().is_empty(), || {
                "frame.definition must not be empty".to_string()
            })?;
        }

        Ok(())
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid { message: message() })
    }
}

/// Recursively merges `overlay` into `base`. Tables merge key by key; any
/// other value replaces the base value outright.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse_and_validate() {
        let config = PipelineConfig::defaults().unwrap();
        assert_eq!(config.frame, FrameSpec::Utm);
        assert!((config.curvature.path_distance - 50.0).abs() < f64::EPSILON);
        assert!((config.curvature.search_radius - 20.0).abs() < f64::EPSILON);
        assert_eq!(config.cluster.radius_grid, vec![50.0, 30.0, 10.0]);
        assert_eq!(config.cluster.min_points_grid, vec![3, 4, 5, 6]);
        assert!((config.cluster.detail_search_radius - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.fetch.naming, BatchNaming::default());
        assert_eq!(config.fetch.retry, RetryPolicy::default());
        assert_eq!(config.paths.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn selected_configuration_is_part_of_default_grid() {
        let config = PipelineConfig::defaults().unwrap();
        assert!(config.cluster.radius_grid.contains(&config.cluster.selected_radius));
        assert!(
            config
                .cluster
                .min_points_grid
                .contains(&config.cluster.selected_min_points)
        );
    }

    #[test]
    fn overrides_merge_key_by_key() {
        let config = PipelineConfig::from_toml_strs(&[
            DEFAULT_TOML,
            "[curvature]\npath_distance = 25.0\n\n[fetch.naming]\nwidth = 4\n",
        ])
        .unwrap();
        assert!((config.curvature.path_distance - 25.0).abs() < f64::EPSILON);
        // Untouched siblings keep their defaults.
        assert!((config.curvature.search_radius - 20.0).abs() < f64::EPSILON);
        assert_eq!(config.fetch.naming.width, 4);
        assert_eq!(config.fetch.naming.prefix, "roads_batch_");
    }

    #[test]
    fn frame_can_be_replaced_with_a_proj_definition() {
        let config = PipelineConfig::from_toml_strs(&[
            DEFAULT_TOML,
            "[frame]\ntype = \"proj\"\ndefinition = \"+proj=tmerc +lat_0=36 +lon_0=139.8333 +k=0.9999 +ellps=GRS80 +units=m\"\n",
        ])
        .unwrap();
        assert!(matches!(config.frame, FrameSpec::Proj { .. }));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = PipelineConfig::from_toml_strs(&[DEFAULT_TOML, "[curvature]\npath_distance = 0.0\n"])
            .unwrap_err();
        assert!(
            matches!(&err, ConfigError::Invalid { message } if message.contains("path_distance")),
            "{err}"
        );

        assert!(
            PipelineConfig::from_toml_strs(&[DEFAULT_TOML, "[cluster]\nradius_grid = []\n"])
                .is_err()
        );
        assert!(
            PipelineConfig::from_toml_strs(&[DEFAULT_TOML, "[fetch]\nbatch_size = 0\n"]).is_err()
        );
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            PipelineConfig::from_toml_strs(&[DEFAULT_TOML, "[curvature\n"]),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_user_file() {
        let dir = std::env::temp_dir().join("crash_curve_config_load");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("override.toml");
        std::fs::write(&path, "[paths]\ndata_dir = \"/srv/crash\"\n").unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/crash"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_user_file_is_an_io_error() {
        let path = std::env::temp_dir().join("crash_curve_config_missing/none.toml");
        assert!(matches!(
            PipelineConfig::load(Some(&path)),
            Err(ConfigError::Io { .. })
        ));
    }
}
