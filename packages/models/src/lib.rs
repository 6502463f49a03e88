#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Shared vocabulary for the crash-weather pipeline.
//!
//! Every stage reads and writes named tables through a tabular store. The
//! names of those tables and of the key columns that flow between stages
//! live here so the stage graph, the CLI, and the tests agree on them.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Names of the tables produced and consumed by the pipeline.
pub mod tables {
    /// Raw weather observations as imported from the source CSV.
    pub const WEATHER_RAW: &str = "weather_raw";
    /// Weather observations with `route_id` and `sequence_in_route`.
    pub const WEATHER_INDEXED: &str = "weather_indexed";
    /// All harmonized crashes labeled with their nearest weather point.
    pub const CRASH_ASSIGNED: &str = "crash_assigned";
    /// Weather points with per-route crash counts.
    pub const WEATHER_CRASH_COUNTS: &str = "weather_crash_counts";
    /// Counts plus globally normalized (0-100) count columns.
    pub const WEATHER_CRASH: &str = "weather_crash";
    /// Globally normalized table plus per-route scaled columns.
    pub const WEATHER_CRASH_SCALED: &str = "weather_crash_scaled";
    /// Final dashboard table with smoothed series.
    pub const WEATHER_CRASH_NORMALIZED: &str = "weather_crash_normalized";

    /// Raw crash records for a given year.
    #[must_use]
    pub fn crash_raw(year: u16) -> String {
        format!("crash_raw_{year}")
    }

    /// Harmonized crash records of a given year that lie near a weather point.
    #[must_use]
    pub fn crash_nearby(year: u16) -> String {
        format!("crash_nearby_{year}")
    }
}

/// Names of the key columns shared between stages.
pub mod columns {
    pub const ROUTE: &str = "route";
    pub const ROUTE_ID: &str = "route_id";
    pub const SEQUENCE_IN_ROUTE: &str = "sequence_in_route";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
}

/// Road-surface condition recorded on a crash (`STRZUSTAND`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoadCondition {
    /// Dry surface.
    Dry = 0,
    /// Wet, damp, or slippery surface.
    Wet = 1,
    /// Winter smoothness: snow or ice.
    Snow = 2,
}

impl RoadCondition {
    /// Returns the numeric code used in the raw crash data.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Creates a road condition from its numeric code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not 0, 1 or 2.
    pub const fn from_code(code: i64) -> Result<Self, InvalidRoadConditionError> {
        match code {
            0 => Ok(Self::Dry),
            1 => Ok(Self::Wet),
            2 => Ok(Self::Snow),
            _ => Err(InvalidRoadConditionError { code }),
        }
    }
}

/// Error returned when a numeric road-condition code is not recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid road condition code {code}: expected 0, 1 or 2")]
pub struct InvalidRoadConditionError {
    /// The code that was provided.
    pub code: i64,
}

/// A row-filtered view of the assigned crash table.
///
/// Each view yields one count column in the aggregate table, one globally
/// normalized column, one per-route scaled column and one smoothed column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CrashView {
    /// Every assigned crash.
    All,
    /// Crashes on a wet surface.
    Wet,
    /// Crashes on snow or ice.
    Snow,
    /// Crashes on any non-dry surface.
    WetSnow,
}

impl CrashView {
    /// Every view, in output column order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::All, Self::Wet, Self::Snow, Self::WetSnow]
    }

    /// The views that are materialized as their own filtered table.
    #[must_use]
    pub const fn filtered() -> &'static [Self] {
        &[Self::Wet, Self::Snow, Self::WetSnow]
    }

    /// Whether a crash with the given road condition belongs to this view.
    /// `None` (missing or unrecognized code) counts as "not dry".
    #[must_use]
    pub const fn admits(self, condition: Option<RoadCondition>) -> bool {
        match self {
            Self::All => true,
            Self::Wet => matches!(condition, Some(RoadCondition::Wet)),
            Self::Snow => matches!(condition, Some(RoadCondition::Snow)),
            Self::WetSnow => !matches!(condition, Some(RoadCondition::Dry)),
        }
    }

    /// Table holding the crashes of this view.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::All => tables::CRASH_ASSIGNED,
            Self::Wet => "crash_wet",
            Self::Snow => "crash_snow",
            Self::WetSnow => "crash_wet_snow",
        }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Self::All => "",
            Self::Wet => "_wet",
            Self::Snow => "_snow",
            Self::WetSnow => "_wet_snow",
        }
    }

    /// Count column in the aggregate table (`crash_count_wet`, ...).
    #[must_use]
    pub fn count_column(self) -> String {
        format!("crash_count{}", self.suffix())
    }

    /// Globally normalized column (`normalized_crash_wet`, ...).
    #[must_use]
    pub fn normalized_column(self) -> String {
        format!("normalized_crash{}", self.suffix())
    }

    /// Per-route scaled version of [`Self::normalized_column`].
    #[must_use]
    pub fn scaled_column(self) -> String {
        scaled_column(&self.normalized_column())
    }

    /// Smoothed column in the final table (`smoothed_crash_wet`, ...).
    #[must_use]
    pub fn smoothed_column(self) -> String {
        format!("smoothed_crash{}", self.suffix())
    }
}

/// Name of the per-route scaled column derived from `column`.
#[must_use]
pub fn scaled_column(column: &str) -> String {
    format!("{column}_scaled")
}

/// A per-route crash count, one per observed `(route, route_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCount {
    pub route: String,
    pub route_id: String,
    pub count: u64,
}
