#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing shared by the crash-curve binaries.
//!
//! [`IndicatifProgress`] renders a [`ProgressCallback`] as an `indicatif`
//! bar. [`init_logger`] routes `log` output through the same
//! [`MultiProgress`] so log lines are printed above the bars instead of
//! through them.

use std::sync::Arc;
use std::time::Duration;

use crash_curve_progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

const TICK: Duration = Duration::from_millis(100);

/// An `indicatif` [`ProgressBar`] behind [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style applied once `set_total()` makes the length known.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Bar for the batch fetch loop. Spins until the fetcher knows how
    /// many batches it planned.
    #[must_use]
    pub fn batches_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Self::spinner_until_total(multi, message, "yellow")
    }

    /// Bar for per-accident passes (curvature, cropping).
    #[must_use]
    pub fn records_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Self::spinner_until_total(multi, message, "cyan")
    }

    /// Bar for a fixed number of steps known up front, such as the cells
    /// of a DBSCAN sweep.
    #[must_use]
    pub fn steps_bar(multi: &MultiProgress, message: &str, total: u64) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template("{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.set_message(message.to_string());
        let bar_style = bar.style();

        Arc::new(Self { bar, bar_style })
    }

    fn spinner_until_total(
        multi: &MultiProgress,
        message: &str,
        color: &str,
    ) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(TICK);
        bar.set_style(
            ProgressStyle::with_template(&format!("{{spinner:.{color}}} {{msg}}"))
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(&format!(
            "  {{msg}} {{wide_bar:.{color}/dim}} {{pos}}/{{len}} {{percent}}% [{{eta}}]"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self { bar, bar_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`, default `info`)
/// behind `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] every progress bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let logger = builder.build();
    let level = logger.filter();

    // Already set in tests.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
