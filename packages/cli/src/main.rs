#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line runner for monthly taxi demand forecasting.
//!
//! Each subcommand runs one pipeline stage (or all of them) for the month
//! in the run configuration. Without a subcommand, an interactive prompt
//! asks for the month and the stages to run.
//!
//! Log output goes through `indicatif-log-bridge` (see
//! [`progress::init_logger`]) so that log lines and the stage bar never
//! fight for the terminal.

mod interactive;
mod progress;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use indicatif::MultiProgress;
use taxi_demand_pipeline::{RunConfig, Stage, available_months, run_stages};

use crate::progress::IndicatifProgress;

#[derive(Parser)]
#[command(name = "taxi_demand", about = "Monthly taxi demand forecasting")]
struct Cli {
    /// Run configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Month to process, as YYYY-MM. Overrides the configuration file.
    #[arg(long, global = true)]
    month: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the zone-by-hour demand grid from the month's trip file
    Grid,
    /// Derive lag, rolling, and calendar features from the demand grid
    Features,
    /// Fit and score the hour-of-week baseline
    Baseline,
    /// Fit and score the gradient-boosted model
    Train,
    /// Break the model's errors down by zone and by hour of week
    Evaluate,
    /// Run every stage in order
    Run,
    /// List months that have model predictions
    Months,
}

impl Commands {
    /// Stages the command runs; `None` for commands that run no stage.
    const fn stages(&self) -> Option<&'static [Stage]> {
        match self {
            Self::Grid => Some(&[Stage::Grid]),
            Self::Features => Some(&[Stage::Features]),
            Self::Baseline => Some(&[Stage::Baseline]),
            Self::Train => Some(&[Stage::Train]),
            Self::Evaluate => Some(&[Stage::Evaluate]),
            Self::Run => Some(Stage::ALL),
            Self::Months => None,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = progress::init_logger();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(month) = &cli.month {
        config = config.with_month(month.parse()?);
    }

    let Some(command) = cli.command else {
        return interactive::run(&multi, config);
    };

    match command.stages() {
        Some(stages) => run(&multi, &config, stages),
        None => list_months(&config),
    }
}

fn list_months(config: &RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let months = available_months(config)?;
    if months.is_empty() {
        println!(
            "No model predictions under {}",
            config.paths.processed_dir.display()
        );
    }
    for month in months {
        println!("{month}");
    }
    Ok(())
}

/// Runs `stages` for the configured month behind a stage progress bar and
/// prints one summary line per stage.
fn run(
    multi: &MultiProgress,
    config: &RunConfig,
    stages: &[Stage],
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let progress = IndicatifProgress::steps_bar(multi, "Stages", stages.len() as u64);

    let outcomes = run_stages(config, stages, progress.as_ref())?;

    for outcome in &outcomes {
        println!("{outcome}");
    }
    log::info!(
        "Finished {} stage(s) for {} in {:.1?}",
        outcomes.len(),
        config.month,
        start.elapsed()
    );
    Ok(())
}
