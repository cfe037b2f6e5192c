//! Resumable batch fetching and recombination.
//!
//! Points are split into fixed-size batches numbered from 1. Each batch
//! moves `Pending -> Fetching -> Persisted | Failed` and is written to its
//! own file as soon as it succeeds. A batch whose file already exists is
//! skipped, so rerunning after a failure only fetches what is missing.
//! A crash loses at most the batch in flight.
//!
//! After the loop, [`combine`] rescans the directory, concatenates every
//! batch file in name order, and writes one newline-delimited JSON dataset.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crash_curve_geometry_models::{AccidentPoint, RoadCandidates};
use crash_curve_progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::{FetchError, RoadSource};

/// File naming for persisted batches: `{prefix}{index:0width}{suffix}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchNaming {
    /// Text before the index.
    pub prefix: String,
    /// Text after the index, including the extension.
    pub suffix: String,
    /// Minimum digits of the zero-padded index.
    pub width: usize,
}

impl Default for BatchNaming {
    fn default() -> Self {
        Self {
            prefix: "roads_batch_".to_string(),
            suffix: ".json".to_string(),
            width: 2,
        }
    }
}

impl BatchNaming {
    /// File name of batch `index`.
    #[must_use]
    pub fn file_name(&self, index: usize) -> String {
        format!(
            "{}{index:0width$}{}",
            self.prefix,
            self.suffix,
            width = self.width
        )
    }

    /// Batch index encoded in `name`, if it follows this convention.
    #[must_use]
    pub fn parse_index(&self, name: &str) -> Option<usize> {
        let digits = name.strip_prefix(&self.prefix)?.strip_suffix(&self.suffix)?;
        if digits.len() < self.width || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Checks that `batches` indices fit the width, so file names sort in
    /// batch order.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::IndexWidth`] if the largest index needs more
    /// digits than `width`.
    pub fn validate(&self, batches: usize) -> Result<(), FetchError> {
        if batches.to_string().len() > self.width {
            return Err(FetchError::IndexWidth {
                batches,
                width: self.width,
            });
        }
        Ok(())
    }
}

/// Lifecycle of one batch within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchState {
    /// Not started.
    Pending,
    /// Request in flight.
    Fetching,
    /// Fetched and written in this run.
    Persisted,
    /// Already persisted by an earlier run.
    Skipped,
    /// Fetch or write failed; no file was left behind.
    Failed,
}

/// Contents of one persisted batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFetchRecord {
    /// 1-based batch index.
    pub batch_index: usize,
    /// Identifier of the [`RoadSource`] that produced the batch.
    pub source: String,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
    /// Road candidates per point, in batch order.
    pub candidates: Vec<RoadCandidates>,
}

/// A batch that is on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedBatch {
    /// Path of the batch file.
    pub path: PathBuf,
    /// Whether this run wrote it (as opposed to finding it).
    pub fresh: bool,
}

/// Outcome of one batch.
#[derive(Debug)]
pub struct BatchResult {
    /// 1-based batch index.
    pub index: usize,
    /// The persisted file, or why the batch failed.
    pub outcome: Result<PersistedBatch, FetchError>,
}

impl BatchResult {
    /// Final state of the batch.
    #[must_use]
    pub const fn state(&self) -> BatchState {
        match &self.outcome {
            Ok(PersistedBatch { fresh: true, .. }) => BatchState::Persisted,
            Ok(PersistedBatch { fresh: false, .. }) => BatchState::Skipped,
            Err(_) => BatchState::Failed,
        }
    }
}

/// Per-batch outcomes of one run.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// One entry per batch, in batch order.
    pub results: Vec<BatchResult>,
}

impl FetchReport {
    fn count(&self, state: BatchState) -> usize {
        self.results.iter().filter(|r| r.state() == state).count()
    }

    /// Batches fetched and written in this run.
    #[must_use]
    pub fn persisted(&self) -> usize {
        self.count(BatchState::Persisted)
    }

    /// Batches found already on disk.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(BatchState::Skipped)
    }

    /// Batches that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(BatchState::Failed)
    }

    /// Indices of the failed batches.
    #[must_use]
    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_err())
            .map(|r| r.index)
            .collect()
    }
}

/// Drives a [`RoadSource`] over many points in resumable batches.
pub struct ResumableFetcher {
    source: Arc<dyn RoadSource>,
    dir: PathBuf,
    naming: BatchNaming,
    batch_size: usize,
    radius: f64,
    courtesy_delay: Duration,
}

impl ResumableFetcher {
    /// Creates a fetcher writing batch files into `dir`.
    #[must_use]
    pub fn new(source: Arc<dyn RoadSource>, dir: impl Into<PathBuf>, radius: f64) -> Self {
        Self {
            source,
            dir: dir.into(),
            naming: BatchNaming::default(),
            batch_size: 50,
            radius,
            courtesy_delay: Duration::ZERO,
        }
    }

    /// Sets the batch file naming.
    #[must_use]
    pub fn with_naming(mut self, naming: BatchNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Sets the number of points per batch (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the pause between consecutive requests.
    #[must_use]
    pub fn with_courtesy_delay(mut self, delay: Duration) -> Self {
        self.courtesy_delay = delay;
        self
    }

    /// Directory batch files are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Batch file naming in use.
    #[must_use]
    pub const fn naming(&self) -> &BatchNaming {
        &self.naming
    }

    /// Fetches every batch that is not yet on disk.
    ///
    /// Batches run one at a time, in order. A failing batch is logged and
    /// recorded in the report; it never stops the run.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] only for problems found before any batch
    /// runs: the batch count does not fit the naming width, or the output
    /// directory cannot be created.
    pub async fn run(
        &self,
        points: &[AccidentPoint],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<FetchReport, FetchError> {
        let batches = points.chunks(self.batch_size).collect::<Vec<_>>();
        self.naming.validate(batches.len())?;
        std::fs::create_dir_all(&self.dir)?;

        log::info!(
            "Fetching roads for {} point(s) in {} batch(es) of up to {} from {}",
            points.len(),
            batches.len(),
            self.batch_size,
            self.source.id()
        );
        progress.set_total(batches.len() as u64);

        let mut report = FetchReport::default();
        let mut requested = false;

        for (offset, batch) in batches.iter().enumerate() {
            let index = offset + 1;
            let path = self.dir.join(self.naming.file_name(index));

            if path.exists() {
                match read_record(&path) {
                    Ok(_) => {
                        log::debug!("Batch {index}: already persisted, skipping");
                        report.results.push(BatchResult {
                            index,
                            outcome: Ok(PersistedBatch { path, fresh: false }),
                        });
                        progress.inc(1);
                        continue;
                    }
                    Err(e) => log::warn!(
                        "Batch {index}: {} is unreadable ({e}); fetching it again",
                        path.display()
                    ),
                }
            }

            if requested && !self.courtesy_delay.is_zero() {
                tokio::time::sleep(self.courtesy_delay).await;
            }
            requested = true;

            progress.set_message(format!("batch {index}/{}", batches.len()));
            log::debug!("Batch {index}: {}", BatchState::Fetching);

            let outcome = self.fetch_and_persist(index, batch, &path).await;
            match &outcome {
                Ok(_) => log::info!("Batch {index}/{}: {}", batches.len(), BatchState::Persisted),
                Err(e) => log::warn!("Batch {index}/{} failed: {e}", batches.len()),
            }
            report.results.push(BatchResult { index, outcome });
            progress.inc(1);
        }

        progress.finish(format!(
            "{} persisted, {} skipped, {} failed",
            report.persisted(),
            report.skipped(),
            report.failed()
        ));
        log::info!(
            "Fetch finished: {} persisted, {} skipped, {} failed",
            report.persisted(),
            report.skipped(),
            report.failed()
        );
        if report.failed() > 0 {
            log::warn!(
                "Failed batches {:?}; rerun to retry them",
                report.failed_indices()
            );
        }

        Ok(report)
    }

    /// [`Self::run`], then [`combine`] into `output`. Batch files are
    /// deleted afterwards only if every batch is on disk and every file
    /// could be read.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the run cannot start or combining fails.
    pub async fn run_and_combine(
        &self,
        points: &[AccidentPoint],
        output: &Path,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<(FetchReport, CombineSummary), FetchError> {
        let report = self.run(points, progress).await?;
        let summary = combine(&self.dir, &self.naming, output)?;

        if report.failed() == 0 && summary.corrupt == 0 {
            delete_batch_files(&summary.files)?;
        } else {
            log::info!(
                "Keeping {} batch file(s) in {} for the next run",
                summary.files.len(),
                self.dir.display()
            );
        }

        Ok((report, summary))
    }

    async fn fetch_and_persist(
        &self,
        index: usize,
        points: &[AccidentPoint],
        path: &Path,
    ) -> Result<PersistedBatch, FetchError> {
        let roads = self.source.fetch_batch(points, self.radius).await?;
        if roads.len() != points.len() {
            return Err(FetchError::Service {
                message: format!(
                    "{} returned {} result(s) for {} point(s)",
                    self.source.id(),
                    roads.len(),
                    points.len()
                ),
            });
        }

        let record = BatchFetchRecord {
            batch_index: index,
            source: self.source.id().to_string(),
            fetched_at: Utc::now(),
            candidates: points
                .iter()
                .cloned()
                .zip(roads)
                .map(|(accident, roads)| RoadCandidates { accident, roads })
                .collect(),
        };

        write_atomic(path, |writer| {
            serde_json::to_writer(&mut *writer, &record)?;
            Ok(())
        })?;

        Ok(PersistedBatch {
            path: path.to_path_buf(),
            fresh: true,
        })
    }
}

/// Result of combining batch files.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CombineSummary {
    /// Batch files that were read, in name order.
    pub files: Vec<PathBuf>,
    /// Records written to the combined output.
    pub records: usize,
    /// Records dropped because they had no road candidates.
    pub dropped_empty: usize,
    /// Matching files that could not be read or decoded.
    pub corrupt: usize,
}

/// Concatenates every batch file in `dir` (in file name order) into a
/// newline-delimited JSON file of [`RoadCandidates`], dropping points with
/// no roads.
///
/// The output is always rebuilt from scratch, so repeated calls never
/// duplicate records. Files that cannot be decoded are skipped with a
/// warning and counted.
///
/// # Errors
///
/// Returns [`FetchError::Io`] if the directory cannot be listed or the
/// output cannot be written.
pub fn combine(
    dir: &Path,
    naming: &BatchNaming,
    output: &Path,
) -> Result<CombineSummary, FetchError> {
    let mut names = Vec::new();
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_file() && naming.parse_index(&name).is_some() {
                names.push(name);
            }
        }
    }
    names.sort();

    let mut summary = CombineSummary::default();
    let mut kept = Vec::new();

    for name in names {
        let path = dir.join(&name);
        let record = match read_record(&path) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping unreadable batch file {}: {e}", path.display());
                summary.corrupt += 1;
                continue;
            }
        };

        for candidates in record.candidates {
            if candidates.roads.is_empty() {
                summary.dropped_empty += 1;
            } else {
                kept.push(candidates);
            }
        }
        summary.files.push(path);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(output, |writer| {
        for candidates in &kept {
            serde_json::to_writer(&mut *writer, candidates)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    })?;
    summary.records = kept.len();

    log::info!(
        "Combined {} batch file(s) into {} ({} record(s), {} without roads, {} unreadable)",
        summary.files.len(),
        output.display(),
        summary.records,
        summary.dropped_empty,
        summary.corrupt
    );

    Ok(summary)
}

/// Deletes combined batch files.
///
/// # Errors
///
/// Returns [`FetchError::Io`] if a file cannot be removed.
pub fn delete_batch_files(files: &[PathBuf]) -> Result<(), FetchError> {
    for path in files {
        std::fs::remove_file(path)?;
    }
    if !files.is_empty() {
        log::info!("Removed {} batch file(s)", files.len());
    }
    Ok(())
}

/// Reads a combined dataset written by [`combine`].
///
/// # Errors
///
/// Returns [`FetchError`] if the file cannot be read or a line does not
/// decode.
pub fn read_combined(path: &Path) -> Result<Vec<RoadCandidates>, FetchError> {
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str(&line)?);
    }
    Ok(items)
}

fn read_record(path: &Path) -> Result<BatchFetchRecord, FetchError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Writes through a `.tmp` sibling and renames it into place, so a crash
/// never leaves a truncated file under the final name. The sibling is
/// removed if writing fails.
fn write_atomic<F>(path: &Path, write: F) -> Result<(), FetchError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), FetchError>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = File::create(&tmp)
        .map_err(FetchError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            Ok(())
        })
        .and_then(|()| std::fs::rename(&tmp, path).map_err(FetchError::from));

    if written.is_err() {
        match std::fs::remove_file(&tmp) {
            Ok(()) => log::debug!("Removed partial file {}", tmp.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove partial file {}: {e}", tmp.display()),
        }
    }

    written
}
