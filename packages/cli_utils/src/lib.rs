#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `lisa_map` binary: batch progress through
//! [`ProgressCallback`] and logger setup through [`init_logger`].

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// Receives progress updates from a batch run.
pub trait ProgressCallback: Send + Sync {
    /// Number of analyses in the batch.
    fn set_total(&self, total: u64);

    /// Marks `delta` more analyses as written.
    fn inc(&self, delta: u64);

    /// Names the analysis currently running.
    fn set_message(&self, msg: String);

    /// Ends the batch with a summary line.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Progress over a batch of analyses, rendered with `indicatif`.
pub struct IndicatifProgress {
    bar: ProgressBar,
    counting_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Spinner shown while the input loads. Becomes a counting bar once
    /// `set_total()` reports how many analyses the batch holds.
    #[must_use]
    pub fn batch_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let counting_style =
            ProgressStyle::with_template("  [{bar:30.cyan/blue}] {pos}/{len} analyses: {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");

        Arc::new(Self {
            bar,
            counting_style,
        })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.counting_style.clone());
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

/// Installs the `lisa_map` logger and returns the [`MultiProgress`] that
/// progress bars must be added to.
///
/// Log lines go through `indicatif-log-bridge` so they print above any
/// active bar. The `lisa_map` crates log at `info` unless `RUST_LOG` says
/// otherwise; everything else logs at `warn`.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("lisa_map", log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // A second call (tests, embedding) keeps the first logger.
    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    #[test]
    fn init_logger_can_run_twice() {
        let _first = init_logger();
        let _second = init_logger();
        log::info!("logger still usable");
    }

    #[test]
    fn batch_bar_counts_analyses() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::batch_bar(&multi, "loading");

        progress.set_total(3);
        progress.set_message("local_moran_rate".to_string());
        progress.inc(1);
        progress.inc(2);
        progress.finish("done".to_string());
    }
}
