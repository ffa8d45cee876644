#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the canvass map tools.
//!
//! Provides an `indicatif`-backed [`ProgressCallback`] plus [`init_logger`],
//! which routes `log` output through `indicatif-log-bridge` so log lines
//! are suspended while progress bars redraw.

use std::sync::Arc;
use std::time::Duration;

use canvass_map_street::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `set_total()` provides a known length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Creates a bar for district-level import progress.
    ///
    /// Starts as a spinner, since the district list is resolved inside the
    /// importer, and becomes a bar with elapsed time once
    /// [`ProgressCallback::set_total()`] is called.
    #[must_use]
    pub fn districts_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::districts(multi, message))
    }

    fn districts(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(
            "{msg:<16} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
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
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set when called twice (e.g. in tests).
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn spinner_until_total_is_known() {
        let progress = IndicatifProgress::districts(&hidden(), "Preparing");
        assert_eq!(progress.bar.length(), None);
        assert_eq!(progress.bar.message(), "Preparing");
    }

    #[test]
    fn bar_tracks_districts() {
        let progress = IndicatifProgress::districts(&hidden(), "Preparing");

        progress.set_total(3);
        assert_eq!(progress.bar.length(), Some(3));
        assert_eq!(progress.bar.position(), 0);

        progress.inc(1);
        progress.set_message("District 2e".to_string());
        assert_eq!(progress.bar.position(), 1);
        assert_eq!(progress.bar.message(), "District 2e");

        progress.inc(2);
        progress.finish("Imported 12 street(s)".to_string());
        assert_eq!(progress.bar.position(), 3);
        assert!(progress.bar.is_finished());
        assert_eq!(progress.bar.message(), "Imported 12 street(s)");
    }

    #[test]
    fn set_total_restarts_position() {
        let progress = IndicatifProgress::districts(&hidden(), "Preparing");
        progress.set_total(5);
        progress.inc(4);
        progress.set_total(2);
        assert_eq!(progress.bar.position(), 0);
        assert_eq!(progress.bar.length(), Some(2));
    }

    #[test]
    fn init_logger_is_idempotent() {
        let _first = init_logger();
        let level = log::max_level();
        let second = init_logger();
        assert_eq!(log::max_level(), level);

        let bar = second.add(ProgressBar::hidden());
        bar.inc(1);
        assert_eq!(bar.position(), 1);
    }
}
