#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Road geometry acquisition around accident points.
//!
//! A [`RoadSource`] answers "which roads lie within `r` metres of each of
//! these points" for one small batch at a time. [`batch::ResumableFetcher`]
//! drives a source over thousands of points, persisting every successful
//! batch to its own file so an interrupted or partially failed run can be
//! resumed without refetching, then combines the persisted batches into
//! one dataset.

pub mod batch;
pub mod overpass;
pub mod retry;

pub use batch::{
    BatchFetchRecord, BatchNaming, BatchResult, BatchState, CombineSummary, FetchReport,
    PersistedBatch, ResumableFetcher, combine, delete_batch_files, read_combined,
};
pub use overpass::{OverpassClient, OverpassOptions};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use crash_curve_geometry::GeometryError;
use crash_curve_geometry_models::{AccidentPoint, Road};

/// Errors from fetching, persisting, or combining road batches.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Road geometry could not be measured.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// The map service answered with an error or an unusable response.
    #[error("Service error: {message}")]
    Service {
        /// Description of what went wrong.
        message: String,
    },

    /// The batch count does not fit the zero-padded index width, so file
    /// names would not sort in batch order.
    #[error("{batches} batch(es) do not fit an index width of {width}")]
    IndexWidth {
        /// Number of batches planned.
        batches: usize,
        /// Configured index width.
        width: usize,
    },
}

/// A service that returns road geometries near points.
#[async_trait]
pub trait RoadSource: Send + Sync {
    /// Short identifier recorded in persisted batches (e.g. `"overpass"`).
    fn id(&self) -> &str;

    /// Fetches the roads within `radius` metres of each point.
    ///
    /// The result has one entry per input point, in input order; a point
    /// with no nearby roads gets an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the whole batch could not be fetched.
    async fn fetch_batch(
        &self,
        points: &[AccidentPoint],
        radius: f64,
    ) -> Result<Vec<Vec<Road>>, FetchError>;
}
