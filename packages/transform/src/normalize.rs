//! Min-max scaling: once over the whole table, then within each route.

use crash_weather_models::scaled_column;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{TransformError, is_numeric, require};

/// What to do when every value being scaled is the same.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DegenerateRangePolicy {
    /// Every value in the zero-width range scales to 0.
    #[default]
    Zero,
    /// Fail with [`TransformError::DegenerateRange`].
    Error,
}

/// Rounds to `decimals` places, halves to even.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

fn numeric_column<'a>(table: &'a DataFrame, name: &str) -> Result<&'a Column, TransformError> {
    let column = require(table, name)?;
    if is_numeric(column.dtype()) {
        Ok(column)
    } else {
        Err(TransformError::invalid(format!(
            "column '{name}' is {} and cannot be normalized",
            column.dtype()
        )))
    }
}

/// Global pass: for each `(source, target)` pair adds
/// `target = round((source - min) / (max - min) * 100, 1)` computed over
/// the whole table. Nulls stay null.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if a source column is missing or
/// not numeric, or [`TransformError::DegenerateRange`] under
/// [`DegenerateRangePolicy::Error`].
pub fn normalize_global(
    table: &DataFrame,
    pairs: &[(&str, &str)],
    policy: DegenerateRangePolicy,
) -> Result<DataFrame, TransformError> {
    let mut out = table.clone();

    for &(source, target) in pairs {
        let values = numeric_column(table, source)?.cast(&DataType::Float64)?;
        let values = values.f64()?;

        let normalized = match (values.min(), values.max()) {
            (Some(lo), Some(hi)) if hi > lo => {
                ((values - lo) / (hi - lo) * 100.0).apply_values(|v| round_to(v, 1))
            }
            (Some(_), Some(_)) => match policy {
                DegenerateRangePolicy::Zero => values.apply_values(|_| 0.0),
                DegenerateRangePolicy::Error => {
                    return Err(TransformError::DegenerateRange {
                        column: source.to_string(),
                    });
                }
            },
            _ => values.clone(),
        };

        log::debug!(
            "Normalized {source} -> {target} (range {:?}..{:?})",
            values.min(),
            values.max()
        );
        out.with_column(normalized.with_name(target.into()).into_series())?;
    }

    Ok(out)
}

/// Per-route pass: for each numeric column adds `"{column}_scaled"`, the
/// column min-max scaled into `[0, 1]` within each group of
/// `group_column`. Non-numeric columns are passed through without a
/// scaled column. Nulls stay null.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if a column is missing, or
/// [`TransformError::DegenerateRange`] under
/// [`DegenerateRangePolicy::Error`].
pub fn normalize_per_group(
    table: &DataFrame,
    group_column: &str,
    columns: &[&str],
    policy: DegenerateRangePolicy,
) -> Result<DataFrame, TransformError> {
    require(table, group_column)?;
    let group = [col(group_column)];

    let mut scaled = Vec::new();
    for &name in columns {
        if !is_numeric(require(table, name)?.dtype()) {
            log::debug!("Skipping non-numeric column '{name}' in per-route scaling");
            continue;
        }

        let x = col(name).cast(DataType::Float64);
        let lo = x.clone().min().over(group.clone());
        let width = x.clone().max().over(group.clone()) - lo.clone();

        if policy == DegenerateRangePolicy::Error {
            let degenerate = table
                .clone()
                .lazy()
                .group_by(group.clone())
                .agg([(x.clone().max() - x.clone().min()).alias("width")])
                .filter(col("width").eq(lit(0.0)))
                .collect()?;
            if degenerate.height() > 0 {
                return Err(TransformError::DegenerateRange {
                    column: name.to_string(),
                });
            }
        }

        scaled.push(
            when(x.clone().is_null())
                .then(x.clone())
                .when(width.clone().gt(lit(0.0)))
                .then((x - lo) / width)
                .otherwise(lit(0.0))
                .alias(scaled_column(name)),
        );
    }

    if scaled.is_empty() {
        return Ok(table.clone());
    }
    Ok(table.clone().lazy().with_columns(scaled).collect()?)
}
