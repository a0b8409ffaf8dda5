#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for the district environmental-health scoring pipeline.
//!
//! ```text
//! envhealth run --config pipeline.toml [--output data/birmingham_baseline.json]
//! envhealth validate --config pipeline.toml
//! envhealth preview --baseline data/birmingham_baseline.json --district B14 --air 5
//! ```
//!
//! Uses `indicatif-log-bridge` (via [`envhealth_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use envhealth_cli_utils::{IndicatifProgress, Stage};
use envhealth_pipeline::{ComponentDeltas, PipelineConfig, emit, preview};

#[derive(Parser)]
#[command(
    name = "envhealth",
    about = "Score postal districts on air quality, noise, and greenspace"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the baseline
    Run {
        /// Pipeline configuration file
        #[arg(long)]
        config: PathBuf,
        /// Write the baseline here instead of the configured path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check a configuration file without reading any input
    Validate {
        /// Pipeline configuration file
        #[arg(long)]
        config: PathBuf,
    },
    /// Project a district's overall score under component adjustments
    Preview {
        /// Baseline JSON produced by `run`
        #[arg(long)]
        baseline: PathBuf,
        /// District code, e.g. B14
        #[arg(long)]
        district: String,
        /// Change to the air score
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        air: f64,
        /// Change to the noise score
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        noise: f64,
        /// Change to the greenspace score
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        greenspace: f64,
        /// Configuration supplying weights and bands (defaults otherwise)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = envhealth_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            let mut config = PipelineConfig::load(&config)?;
            if let Some(output) = output {
                config.output.baseline = absolute(&output)?;
            }

            let loading = IndicatifProgress::stage_bar(&multi, Stage::Loading, "Loading inputs");
            let scoring =
                IndicatifProgress::stage_bar(&multi, Stage::Scoring, "Scoring districts");
            let summary = envhealth_pipeline::run(&config, loading.as_ref(), scoring.as_ref())?;

            let coverage = &summary.metadata.coverage;
            println!(
                "Wrote {} districts to {}",
                summary.records.len(),
                summary.baseline_path.display()
            );
            println!(
                "  without overall score: {} (air {}, noise {}, greenspace {})",
                coverage.overall_null,
                coverage.air_uncovered,
                coverage.noise_uncovered,
                coverage.greenspace_uncovered
            );
            println!("  metadata: {}", summary.metadata_path.display());
        }
        Commands::Validate { config } => {
            let loaded = PipelineConfig::load(&config)?;
            loaded.validate()?;
            println!("{} is valid", config.display());
        }
        Commands::Preview {
            baseline,
            district,
            air,
            noise,
            greenspace,
            config,
        } => {
            let config = match config {
                Some(path) => {
                    let config = PipelineConfig::load(&path)?;
                    config.validate()?;
                    config
                }
                None => PipelineConfig::default(),
            };

            let records = emit::read_baseline(&baseline)?;
            let Some(record) = records
                .iter()
                .find(|r| r.district.eq_ignore_ascii_case(district.trim()))
            else {
                eprintln!("District not found: {district}");
                std::process::exit(1);
            };

            let projected = preview(
                record,
                ComponentDeltas {
                    air,
                    noise,
                    greenspace,
                },
                &config.composite,
                &config.bands.overall,
            );

            log::debug!(
                "Baseline {} overall score {:?}",
                record.district,
                record.score_overall
            );
            println!("{}", serde_json::to_string_pretty(&projected)?);
        }
    }

    Ok(())
}

/// Resolves a command-line path against the working directory rather than
/// the config file's directory.
fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
