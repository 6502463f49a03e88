//! Pipeline configuration.
//!
//! Every knob has a default, so an empty TOML file (or none at all) runs
//! the standard three-year pipeline against `data/crash_weather.duckdb`.

use std::path::{Path, PathBuf};

use crash_weather_spatial::DEFAULT_THRESHOLD_M;
use crash_weather_store::paths;
use crash_weather_transform::normalize::DegenerateRangePolicy;
use crash_weather_transform::registry::registered_years;
use crash_weather_transform::smooth::DEFAULT_WINDOW;
use crash_weather_transform::weather::WeatherColumns;
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Weather severity measures scaled per route alongside the crash columns.
pub const DEFAULT_SEVERITY_COLUMNS: &[&str] = &[
    "Nebel",
    "Black Ice",
    "Neuschnee",
    "Gesamtschnee",
    "Niederschlag",
    "Wind",
    "Windböen",
    "Gesamt",
];

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `DuckDB` file holding every pipeline table.
    pub store_path: PathBuf,
    /// Maximum crash-to-weather-point distance, in meters.
    pub threshold_m: f64,
    /// Crash years to process. Each needs a registered schema.
    pub years: Vec<u16>,
    /// Column names of the raw weather table.
    pub weather: WeatherColumns,
    /// Prefix stripped from raw route names.
    pub route_prefix: String,
    /// Optional numeric column ordering weather points within a route.
    /// Without it, the raw row order defines the sequence.
    pub weather_order_by: Option<String>,
    /// Weather measures scaled per route.
    pub severity_columns: Vec<String>,
    /// Road-surface condition column of the crash data.
    pub condition_column: String,
    /// Rolling-mean window, in points.
    pub smoothing_window: usize,
    /// What min-max scaling does with a zero-width range.
    pub degenerate_range: DegenerateRangePolicy,
    /// Crashes per matching batch; progress is reported once per batch.
    pub batch_size: usize,
    /// Keep only this fraction of the raw weather and crash rows, for quick
    /// trial runs. `None` processes everything.
    pub sample_fraction: Option<f64>,
    /// Seed for [`Self::sample_fraction`]; `None` draws a fresh sample.
    pub sample_seed: Option<u64>,
    /// Rerun every stage even if its output already exists.
    pub force: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_path: paths::default_store_path(),
            threshold_m: DEFAULT_THRESHOLD_M,
            years: registered_years(),
            weather: WeatherColumns::default(),
            route_prefix: "Route_".to_string(),
            weather_order_by: None,
            severity_columns: DEFAULT_SEVERITY_COLUMNS
                .iter()
                .map(ToString::to_string)
                .collect(),
            condition_column: "STRZUSTAND".to_string(),
            smoothing_window: DEFAULT_WINDOW,
            degenerate_range: DegenerateRangePolicy::default(),
            batch_size: 10_000,
            sample_fraction: None,
            sample_seed: None,
            force: false,
        }
    }
}

impl PipelineConfig {
    /// Parses a config from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the TOML is malformed or the
    /// resulting config is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::de::from_str(toml_str).map_err(|e| PipelineError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path)?;
        log::debug!("Loaded pipeline config from {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// Checks the values that cannot be expressed in the type.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] describing the first problem.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |message: String| Err(PipelineError::Config { message });

        if !(self.threshold_m.is_finite() && self.threshold_m >= 0.0) {
            return fail(format!(
                "threshold_m must be a finite, non-negative distance, got {}",
                self.threshold_m
            ));
        }
        if self.smoothing_window == 0 {
            return fail("smoothing_window must be at least 1".to_string());
        }
        if let Some(fraction) = self.sample_fraction
            && !(fraction > 0.0 && fraction <= 1.0)
        {
            return fail(format!(
                "sample_fraction must be in (0, 1], got {fraction}"
            ));
        }
        if self.years.is_empty() {
            return fail("at least one crash year is required".to_string());
        }

        let known = registered_years();
        if let Some(year) = self.years.iter().find(|y| !known.contains(y)) {
            return fail(format!("no crash schema registered for year {year}"));
        }

        let mut years = self.years.clone();
        years.sort_unstable();
        years.dedup();
        if years.len() != self.years.len() {
            return fail("crash years must not repeat".to_string());
        }

        Ok(())
    }
}
