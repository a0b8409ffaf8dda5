#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `envhealth` binary.
//!
//! [`IndicatifProgress`] renders the pipeline's loading and scoring stages
//! as `indicatif` bars. [`init_logger`] routes `log` output through the same
//! [`MultiProgress`] so log lines print above the bars instead of through
//! them.

use std::sync::Arc;
use std::time::Duration;

use envhealth_pipeline::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// Pipeline stage a bar reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading postcodes, grids, noise layers and greenspace.
    Loading,
    /// Per-district scoring.
    Scoring,
}

impl Stage {
    const fn spinner_template(self) -> &'static str {
        match self {
            Self::Loading => "{spinner:.green} {msg}",
            Self::Scoring => "{spinner:.yellow} {msg}",
        }
    }

    const fn bar_template(self) -> &'static str {
        match self {
            Self::Loading => "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            Self::Scoring => "  {msg} {wide_bar:.yellow/dim} {pos}/{len} {percent}% [{eta}]",
        }
    }
}

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
///
/// Spins until the stage announces its size, then becomes a bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
    sized_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds a bar for `stage` to `multi`.
    #[must_use]
    pub fn stage_bar(
        multi: &MultiProgress,
        stage: Stage,
        message: &str,
    ) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(stage.spinner_template())
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let sized_style = ProgressStyle::with_template(stage.bar_template())
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Arc::new(Self { bar, sized_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.sized_style.clone());
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

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge` and returns the [`MultiProgress`] every stage bar
/// must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // A second call (tests) keeps the first logger.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_bar_switches_to_sized_style() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::stage_bar(&multi, Stage::Scoring, "Scoring districts");

        progress.set_total(3);
        progress.inc(2);
        progress.finish("Scored 3 districts".to_string());
    }

    #[test]
    fn templates_parse() {
        for stage in [Stage::Loading, Stage::Scoring] {
            assert!(ProgressStyle::with_template(stage.spinner_template()).is_ok());
            assert!(ProgressStyle::with_template(stage.bar_template()).is_ok());
        }
    }
}
