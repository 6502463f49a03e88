//! Menu shown when the binary is started without a subcommand.

use std::path::PathBuf;

use crash_weather_pipeline::PipelineConfig;
use dialoguer::{Confirm, Input, Select};
use indicatif::MultiProgress;

use crate::commands;
use crate::export::ExportFormat;

enum Action {
    Run,
    Status,
    Import,
    Export,
    Rerun,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Run,
        Self::Status,
        Self::Import,
        Self::Export,
        Self::Rerun,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Run pipeline (skip finished stages)",
            Self::Status => "Show stage status",
            Self::Import => "Import raw CSV files",
            Self::Export => "Export dashboard tables",
            Self::Rerun => "Rerun every stage",
        }
    }
}

fn prompt_path(prompt: &str) -> Result<Option<PathBuf>, dialoguer::Error> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let trimmed = input.trim();
    Ok((!trimmed.is_empty()).then(|| PathBuf::from(trimmed)))
}

/// Lets the user pick an action and runs it with `config`.
///
/// # Errors
///
/// Returns an error if a prompt fails or the chosen action fails.
pub fn run(
    multi: &MultiProgress,
    mut config: PipelineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Crash / Weather Pipeline");
    println!("store: {}", config.store_path.display());
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::Run => {
            let report = commands::run(multi, config)?;
            println!(
                "{} stage(s) run, {} already up to date",
                report.completed(),
                report.skipped()
            );
        }
        Action::Rerun => {
            let confirmed = Confirm::new()
                .with_prompt("Recompute every stage, replacing existing tables?")
                .default(false)
                .interact()?;
            if confirmed {
                config.force = true;
                let report = commands::run(multi, config)?;
                println!("{} stage(s) run", report.completed());
            }
        }
        Action::Status => {
            print!("{}", commands::format_status(&commands::status(&config)?));
        }
        Action::Import => {
            let weather = prompt_path("Weather CSV (empty to skip)")?;

            let mut crashes = Vec::new();
            for &year in &config.years {
                if let Some(path) = prompt_path(&format!("Crash file for {year} (empty to skip)"))? {
                    crashes.push((year, path));
                }
            }

            let force = Confirm::new()
                .with_prompt("Replace tables that were already imported?")
                .default(false)
                .interact()?;

            let written = commands::import(&config, weather.as_deref(), &crashes, force)?;
            println!("{written} table(s) imported");
        }
        Action::Export => {
            let formats = [ExportFormat::Duckdb, ExportFormat::Csv];
            let format_idx = Select::new()
                .with_prompt("Export format")
                .items(&["DuckDB file", "CSV directory"])
                .default(0)
                .interact()?;
            let output = prompt_path("Output path (empty for default)")?;

            let rows = commands::export(&config, formats[format_idx], output.as_deref(), &[])?;
            println!("{rows} row(s) exported");
        }
    }

    Ok(())
}
