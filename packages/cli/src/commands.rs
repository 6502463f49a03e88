//! The operations behind each subcommand, shared with the interactive menu.

use std::path::{Path, PathBuf};

use crash_weather_models::tables;
use crash_weather_pipeline::orchestrator::{self, RunReport, StageState, StageStatus};
use crash_weather_pipeline::{PipelineConfig, PipelineContext, stages};
use crash_weather_store::DuckDbStore;
use indicatif::MultiProgress;

use crate::export::{self, ExportFormat};
use crate::import::{self, CsvFormat};
use crate::progress::BarProgress;

/// Config file picked up from the working directory when `--config` is
/// not given.
pub const DEFAULT_CONFIG_FILE: &str = "crash_weather.toml";

/// Loads the pipeline config from `path`, or from [`DEFAULT_CONFIG_FILE`]
/// if it exists, or falls back to defaults. `store` overrides the store
/// location.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or is invalid.
pub fn load_config(
    path: Option<&Path>,
    store: Option<&Path>,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            PipelineConfig::load(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(store) = store {
        config.store_path = store.to_path_buf();
    }

    log::debug!("Using store {}", config.store_path.display());
    Ok(config)
}

/// Parses a `YEAR=PATH` crash file argument.
///
/// # Errors
///
/// Returns a message if the argument is not of that form.
pub fn parse_year_path(arg: &str) -> Result<(u16, PathBuf), String> {
    let (year, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected YEAR=PATH, got '{arg}'"))?;
    let year = year
        .trim()
        .parse::<u16>()
        .map_err(|e| format!("invalid year '{year}': {e}"))?;
    if path.trim().is_empty() {
        return Err(format!("missing path for year {year}"));
    }
    Ok((year, PathBuf::from(path.trim())))
}

/// Imports the raw weather file and any crash files into the store.
/// Returns the number of tables written.
///
/// # Errors
///
/// Returns an error if a file cannot be imported.
pub fn import(
    config: &PipelineConfig,
    weather: Option<&Path>,
    crashes: &[(u16, PathBuf)],
    force: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut store = DuckDbStore::open(&config.store_path)?;
    let mut written = 0;

    if let Some(path) = weather {
        if import::import_file(&mut store, tables::WEATHER_RAW, path, CsvFormat::WEATHER, force)? {
            written += 1;
        }
    }

    for (year, path) in crashes {
        if !config.years.contains(year) {
            log::warn!("{year} is not one of the configured years; it will not be processed");
        }
        let name = tables::crash_raw(*year);
        if import::import_file(&mut store, &name, path, CsvFormat::CRASH, force)? {
            written += 1;
        }
    }

    Ok(written)
}

/// Runs the stage graph against the configured `DuckDB` store with
/// progress bars on `multi`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or a stage fails.
pub fn run(
    multi: &MultiProgress,
    config: PipelineConfig,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    config.validate()?;
    let graph = stages::build_graph(&config)?;
    let mut store = DuckDbStore::open(&config.store_path)?;

    let ctx = PipelineContext::new(config).with_progress(BarProgress::new(multi));

    Ok(orchestrator::run(&mut store, &graph, &ctx)?)
}

/// Per-stage status of the configured store.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or queried.
pub fn status(config: &PipelineConfig) -> Result<Vec<StageState>, Box<dyn std::error::Error>> {
    let graph = stages::build_graph(config)?;
    let store = DuckDbStore::open(&config.store_path)?;
    Ok(orchestrator::status(&store, &graph)?)
}

/// Renders stage states as an aligned text table.
#[must_use]
pub fn format_status(states: &[StageState]) -> String {
    let width = states.iter().map(|s| s.stage.len()).max().unwrap_or(0);
    let mut out = String::new();

    for state in states {
        let status = match state.status {
            StageStatus::Done => "done",
            StageStatus::Pending => "pending",
        };
        let rows = state
            .rows
            .map(|n| format!("{n} rows"))
            .unwrap_or_default();
        let written = state
            .last_written
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        let line = format!(
            "{:<width$}  {status:<7}  {:<28}  {rows:>14}  {written}",
            state.stage, state.output
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

/// Exports `names` (or the dashboard defaults) from the working store.
/// Returns the number of rows exported.
///
/// # Errors
///
/// Returns an error if a table is missing or the output cannot be written.
pub fn export(
    config: &PipelineConfig,
    format: ExportFormat,
    output: Option<&Path>,
    names: &[String],
) -> Result<usize, Box<dyn std::error::Error>> {
    let names: Vec<&str> = if names.is_empty() {
        export::DEFAULT_TABLES.to_vec()
    } else {
        names.iter().map(String::as_str).collect()
    };

    let source = DuckDbStore::open(&config.store_path)?;

    let rows = match format {
        ExportFormat::Duckdb => {
            let output = output.map_or_else(
                crash_weather_store::paths::default_export_path,
                Path::to_path_buf,
            );
            if output == config.store_path {
                return Err("export target must differ from the working store".into());
            }
            let mut target = DuckDbStore::open(&output)?;
            let rows = export::copy_tables(&source, &mut target, &names)?;
            log::info!("Exported {} table(s) to {}", names.len(), output.display());
            rows
        }
        ExportFormat::Csv => {
            let dir = output.map_or_else(
                || crash_weather_store::paths::data_dir().join("export"),
                Path::to_path_buf,
            );
            export::export_csv_dir(&source, &names, &dir)?
        }
    };

    Ok(rows)
}
