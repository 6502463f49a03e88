#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Table transformations behind each pipeline stage.
//!
//! Every function here takes whole tables and returns a new table. None of
//! them touch storage; the pipeline crate wires them to the table store.

pub mod aggregate;
pub mod harmonize;
pub mod normalize;
pub mod registry;
pub mod route_index;
pub mod smooth;
pub mod spatial_join;
pub mod weather;

use crash_weather_spatial::{Coordinate, SpatialError};
use polars::prelude::*;

/// Errors that can occur while transforming tables.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Input data violates a precondition of the transformation.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },

    /// No crash schema is registered for the year.
    #[error("No crash schema registered for year {year}")]
    UnknownYear {
        /// The requested year.
        year: u16,
    },

    /// Min-max scaling hit a column (or route group) whose values are all
    /// equal while the degenerate-range policy is `error`.
    #[error("Zero-width value range in column '{column}'")]
    DegenerateRange {
        /// The column being scaled.
        column: String,
    },

    /// An embedded schema definition could not be parsed.
    #[error("Schema config error: {message}")]
    Config {
        /// Parser message.
        message: String,
    },

    /// Frame manipulation error.
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    /// Distance or matching error.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

impl TransformError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Looks up a column, reporting a missing one as invalid input.
pub(crate) fn require<'a>(table: &'a DataFrame, name: &str) -> Result<&'a Column, TransformError> {
    table
        .column(name)
        .map_err(|_| TransformError::invalid(format!("missing column '{name}'")))
}

pub(crate) fn is_numeric(dtype: &DataType) -> bool {
    dtype.is_integer() || dtype.is_float()
}

/// Values of a numeric column as floats.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if the column is missing or not
/// numeric.
pub fn float_values(table: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, TransformError> {
    let column = require(table, name)?;
    if !is_numeric(column.dtype()) {
        return Err(TransformError::invalid(format!(
            "column '{name}' is {}, expected numbers",
            column.dtype()
        )));
    }
    Ok(column.cast(&DataType::Float64)?.f64()?.into_iter().collect())
}

/// Values of a column rendered as text. Numbers are formatted the way
/// polars casts them.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if the column is missing.
pub fn text_values(table: &DataFrame, name: &str) -> Result<Vec<Option<String>>, TransformError> {
    let column = require(table, name)?;
    Ok(column
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Column names of `table`, in order.
#[must_use]
pub fn column_names(table: &DataFrame) -> Vec<String> {
    table
        .get_column_names()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

/// Reads the latitude/longitude columns of `table` as coordinates.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if a column is missing or a
/// row has no numeric coordinate.
pub fn coordinates(
    table: &DataFrame,
    latitude: &str,
    longitude: &str,
) -> Result<Vec<Coordinate>, TransformError> {
    let lat = float_values(table, latitude)?;
    let lon = float_values(table, longitude)?;

    lat.into_iter()
        .zip(lon)
        .enumerate()
        .map(|(row, pair)| match pair {
            (Some(latitude), Some(longitude)) => Ok(Coordinate::new(latitude, longitude)),
            (lat, lon) => Err(TransformError::invalid(format!(
                "row {row} has no numeric coordinate ({latitude}={lat:?}, {longitude}={lon:?})"
            ))),
        })
        .collect()
}

/// Stacks frames with the same columns on top of each other, widening
/// column types where they differ (e.g. integer and float).
///
/// # Errors
///
/// Returns [`TransformError::Polars`] if the column names differ.
pub fn concat_frames(frames: &[DataFrame]) -> Result<DataFrame, TransformError> {
    if frames.is_empty() {
        return Ok(DataFrame::empty());
    }
    let lazy: Vec<LazyFrame> = frames.iter().map(|f| f.clone().lazy()).collect();
    Ok(concat(
        lazy,
        UnionArgs {
            to_supertypes: true,
            ..Default::default()
        },
    )?
    .collect()?)
}

const SAMPLE_ROW: &str = "__sample_row";

/// Keeps a random `fraction` of the rows, in their original order.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] unless `0 < fraction <= 1`.
pub fn sample_rows(
    table: &DataFrame,
    fraction: f64,
    seed: Option<u64>,
) -> Result<DataFrame, TransformError> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(TransformError::invalid(format!(
            "sample fraction must be in (0, 1], got {fraction}"
        )));
    }

    let indexed = table.with_row_index(SAMPLE_ROW.into(), None)?;
    let frac = Series::new("frac".into(), [fraction]);
    let mut sampled = indexed
        .sample_frac(&frac, false, false, seed)?
        .sort([SAMPLE_ROW], SortMultipleOptions::default())?;
    sampled.drop_in_place(SAMPLE_ROW)?;

    log::debug!("Sampled {}/{} rows", sampled.height(), table.height());
    Ok(sampled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_reject_missing_values() {
        let table = df!(
            "latitude" => [Some(1.0), None],
            "longitude" => [2.0, 3.0]
        )
        .unwrap();

        assert!(matches!(
            coordinates(&table, "latitude", "longitude"),
            Err(TransformError::InvalidInput { .. })
        ));
    }

    #[test]
    fn coordinates_accept_integer_columns() {
        let table = df!("latitude" => [48i64], "longitude" => [11.5]).unwrap();

        assert_eq!(
            coordinates(&table, "latitude", "longitude").unwrap(),
            vec![Coordinate::new(48.0, 11.5)]
        );
    }

    #[test]
    fn coordinates_reject_text_columns() {
        let table = df!("latitude" => ["48"], "longitude" => [11.5]).unwrap();

        assert!(matches!(
            coordinates(&table, "latitude", "longitude"),
            Err(TransformError::InvalidInput { .. })
        ));
    }

    #[test]
    fn concat_widens_integer_and_float() {
        let a = df!("x" => [1i64], "r" => ["A"]).unwrap();
        let b = df!("x" => [2.5], "r" => ["B"]).unwrap();

        let both = concat_frames(&[a, b]).unwrap();

        assert_eq!(float_values(&both, "x").unwrap(), vec![Some(1.0), Some(2.5)]);
        assert_eq!(
            text_values(&both, "r").unwrap(),
            vec![Some("A".to_string()), Some("B".to_string())]
        );
    }

    #[test]
    fn sampling_keeps_a_fraction_in_order() {
        let table = df!("x" => (0..200i64).collect::<Vec<_>>()).unwrap();

        let sampled = sample_rows(&table, 0.1, Some(7)).unwrap();
        let values = float_values(&sampled, "x").unwrap();

        assert_eq!(sampled.height(), 20);
        assert_eq!(column_names(&sampled), vec!["x"]);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert!(sample_rows(&table, 0.1, Some(7)).unwrap().equals(&sampled));
    }

    #[test]
    fn sampling_everything_is_identity() {
        let table = df!("x" => [3i64, 1, 2]).unwrap();
        assert!(sample_rows(&table, 1.0, None).unwrap().equals(&table));
    }

    #[test]
    fn sample_fraction_out_of_range_is_rejected() {
        let table = df!("x" => [1i64]).unwrap();
        assert!(sample_rows(&table, 0.0, None).is_err());
        assert!(sample_rows(&table, 1.5, None).is_err());
        assert!(sample_rows(&table, f64::NAN, None).is_err());
    }
}
