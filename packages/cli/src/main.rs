#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line entry point for the crash-weather pipeline.
//!
//! `crash_weather import` loads the raw weather and crash exports into the
//! working `DuckDB` store, `crash_weather run` computes every pending
//! stage, `crash_weather status` shows which stages are done, and
//! `crash_weather export` copies the dashboard tables out. Without a
//! subcommand an interactive menu is shown.
//!
//! Log output goes through `indicatif-log-bridge` so log lines and
//! progress bars never fight for the terminal.

mod commands;
mod export;
mod import;
mod interactive;
mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::export::ExportFormat;

#[derive(Parser)]
#[command(name = "crash_weather", about = "Crash and weather data pipeline")]
struct Cli {
    /// Pipeline config file (TOML). Defaults to `crash_weather.toml` if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// `DuckDB` file holding the pipeline tables
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import raw CSV files into the store
    Import {
        /// Weather observations (`;`-separated)
        #[arg(long)]
        weather: Option<PathBuf>,

        /// Crash file for one year as `YEAR=PATH` (repeatable)
        #[arg(long = "crash", value_parser = commands::parse_year_path)]
        crashes: Vec<(u16, PathBuf)>,

        /// Replace tables that already exist
        #[arg(long)]
        force: bool,
    },
    /// Run every pending stage
    Run {
        /// Maximum crash-to-weather-point distance in meters
        #[arg(long)]
        threshold: Option<f64>,

        /// Crash years to process (comma-separated)
        #[arg(long, value_delimiter = ',')]
        years: Vec<u16>,

        /// Keep only this fraction (0-1] of the raw rows, for trial runs
        #[arg(long, value_name = "FRACTION")]
        sample: Option<f64>,

        /// Seed for `--sample`, for a reproducible subset
        #[arg(long, requires = "sample")]
        seed: Option<u64>,

        /// Recompute stages whose output already exists
        #[arg(long)]
        force: bool,
    },
    /// Show which stages are done
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Export the dashboard tables
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Duckdb)]
        format: ExportFormat,

        /// Output file (`DuckDB`) or directory (CSV)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Table to export (repeatable). Defaults to the dashboard tables
        #[arg(long = "table")]
        tables: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = progress::init_logger();
    let cli = Cli::parse();

    let mut config = commands::load_config(cli.config.as_deref(), cli.store.as_deref())?;

    let Some(command) = cli.command else {
        return interactive::run(&multi, config);
    };

    match command {
        Commands::Import {
            weather,
            crashes,
            force,
        } => {
            let written = commands::import(&config, weather.as_deref(), &crashes, force)?;
            log::info!("{written} table(s) imported");
        }
        Commands::Run {
            threshold,
            years,
            sample,
            seed,
            force,
        } => {
            if let Some(threshold) = threshold {
                config.threshold_m = threshold;
            }
            if sample.is_some() {
                config.sample_fraction = sample;
                config.sample_seed = seed;
            }
            if !years.is_empty() {
                config.years = years;
            }
            config.force |= force;

            let report = commands::run(&multi, config)?;
            for stage in &report.stages {
                log::debug!("{}: {:?} in {:?}", stage.stage, stage.outcome, stage.elapsed);
            }
        }
        Commands::Status { json } => {
            let states = commands::status(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&states)?);
            } else {
                print!("{}", commands::format_status(&states));
            }
        }
        Commands::Export {
            format,
            output,
            tables,
        } => {
            let rows = commands::export(&config, format, output.as_deref(), &tables)?;
            log::info!("{rows} row(s) exported");
        }
    }

    Ok(())
}
