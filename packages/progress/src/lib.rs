#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Progress reporting for batch fetches, curvature passes, and cluster
//! sweeps.
//!
//! Library crates only see [`ProgressCallback`]; the CLI decides how it is
//! rendered (see `crash_curve_cli_utils`).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress updates from a long-running stage.
///
/// Must be `Send + Sync` so one callback can be shared across tokio tasks.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of work units (batches, accidents, grid cells).
    fn set_total(&self, total: u64);

    /// Sets the absolute position, e.g. when resuming past finished work.
    fn set_position(&self, pos: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the status text.
    fn set_message(&self, msg: String);

    /// Marks the stage done, leaving `msg` visible.
    fn finish(&self, msg: String);

    /// Marks the stage done and removes the indicator.
    fn finish_and_clear(&self);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Shared [`NullProgress`] for callers that do not render progress.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Counts updates without rendering them. Used by tests to assert on how
/// much work a stage reported.
#[derive(Debug, Default)]
pub struct CountingProgress {
    total: AtomicU64,
    position: AtomicU64,
}

impl CountingProgress {
    /// Last total reported.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }
}

impl ProgressCallback for CountingProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.position.store(0, Ordering::Relaxed);
    }

    fn set_position(&self, pos: u64) {
        self.position.store(pos, Ordering::Relaxed);
    }

    fn inc(&self, delta: u64) {
        self.position.fetch_add(delta, Ordering::Relaxed);
    }

    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_progress_tracks_position() {
        let progress = CountingProgress::default();
        progress.set_total(5);
        progress.inc(2);
        progress.inc(1);
        assert_eq!(progress.total(), 5);
        assert_eq!(progress.position(), 3);

        progress.set_position(4);
        assert_eq!(progress.position(), 4);

        progress.set_total(10);
        assert_eq!(progress.position(), 0);
    }
}
