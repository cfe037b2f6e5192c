#![allow(clippy::module_name_repetitions)]
//! Canonical file locations under the configured data directory.

use std::path::{Path, PathBuf};

/// Inputs and outputs of every pipeline stage, rooted at one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Paths rooted at `data_dir`. A relative root resolves against the
    /// working directory.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.to_path_buf(),
        }
    }

    /// The data directory itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cleaned accident table.
    #[must_use]
    pub fn accidents(&self) -> PathBuf {
        self.root.join("accidents.csv")
    }

    /// Per-batch files of the accident road fetch.
    #[must_use]
    pub fn road_batches_dir(&self) -> PathBuf {
        self.root.join("road_batches")
    }

    /// Combined accident road candidates (JSON lines).
    #[must_use]
    pub fn roads(&self) -> PathBuf {
        self.root.join("roads.jsonl")
    }

    /// Per-accident curvature features.
    #[must_use]
    pub fn curvature(&self) -> PathBuf {
        self.root.join("curvature.geojsonseq")
    }

    /// Cropped local road segments.
    #[must_use]
    pub fn cropped_roads(&self) -> PathBuf {
        self.root.join("cropped_roads.geojsonseq")
    }

    /// DBSCAN sweep table.
    #[must_use]
    pub fn cluster_sweep(&self) -> PathBuf {
        self.root.join("cluster_sweep.csv")
    }

    /// Non-noise accidents of the selected clustering.
    #[must_use]
    pub fn clusters(&self) -> PathBuf {
        self.root.join("clusters.csv")
    }

    /// Per-batch files of the cluster centroid road fetch.
    #[must_use]
    pub fn cluster_road_batches_dir(&self) -> PathBuf {
        self.root.join("cluster_road_batches")
    }

    /// Combined centroid road candidates (JSON lines).
    #[must_use]
    pub fn cluster_roads_combined(&self) -> PathBuf {
        self.root.join("cluster_roads.jsonl")
    }

    /// Roads around cluster centroids.
    #[must_use]
    pub fn cluster_roads(&self) -> PathBuf {
        self.root.join("cluster_roads.geojsonseq")
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensures the parent directory of `file` exists.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_parent(file: &Path) -> std::io::Result<()> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}
