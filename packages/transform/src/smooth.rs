//! Centered rolling means within each route.

use polars::prelude::*;

use crate::{TransformError, is_numeric, require};

/// Default rolling window, in points.
pub const DEFAULT_WINDOW: usize = 3;

/// Centered window with a minimum of one observation.
///
/// For row `i` the window covers rows `i - w / 2` through
/// `i - w / 2 + w - 1`, clipped to the series; an even window leans
/// backwards. Nulls are skipped and a window without any value yields null.
fn centered(window: usize) -> RollingOptionsFixedWindow {
    RollingOptionsFixedWindow {
        window_size: window,
        min_periods: 1,
        center: true,
        ..Default::default()
    }
}

/// Adds one smoothed column per `(source, target)` pair, computed
/// independently for each group of `group_column` in the table's row order.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if `window` is zero or a column
/// is missing or not numeric.
pub fn smooth_per_group(
    table: &DataFrame,
    group_column: &str,
    pairs: &[(&str, &str)],
    window: usize,
) -> Result<DataFrame, TransformError> {
    if window == 0 {
        return Err(TransformError::invalid("rolling window must be at least 1"));
    }
    require(table, group_column)?;

    let mut smoothed = Vec::with_capacity(pairs.len());
    for &(source, target) in pairs {
        let column = require(table, source)?;
        if !is_numeric(column.dtype()) {
            return Err(TransformError::invalid(format!(
                "column '{source}' is {} and cannot be smoothed",
                column.dtype()
            )));
        }
        smoothed.push(
            col(source)
                .cast(DataType::Float64)
                .rolling_mean(centered(window))
                .over([col(group_column)])
                .alias(target),
        );
    }

    log::debug!(
        "Smoothing {} column(s) per '{group_column}' with window {window}",
        pairs.len()
    );

    if smoothed.is_empty() {
        return Ok(table.clone());
    }
    Ok(table.clone().lazy().with_columns(smoothed).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::float_values;

    fn approx(a: &[Option<f64>], b: &[Option<f64>]) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => (x - y).abs() < 1e-12,
                (None, None) => true,
                _ => false,
            })
    }

    /// Smooths `values` as one route.
    fn rolling(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
        let table = df!(
            "route" => vec!["A"; values.len()],
            "x" => values
        )
        .unwrap();
        let out = smooth_per_group(&table, "route", &[("x", "smoothed")], window).unwrap();
        float_values(&out, "smoothed").unwrap()
    }

    #[test]
    fn window_three_is_centered() {
        let out = rolling(&[Some(0.0), Some(3.0), Some(0.0), Some(6.0)], 3);
        assert!(approx(
            &out,
            &[Some(1.5), Some(1.0), Some(3.0), Some(3.0)]
        ));
    }

    #[test]
    fn even_window_leans_backwards() {
        // w = 4 covers i-2 ..= i+1
        let out = rolling(&[Some(1.0), Some(2.0), Some(3.0), Some(4.0)], 4);
        assert!(approx(
            &out,
            &[Some(1.5), Some(2.0), Some(2.5), Some(3.0)]
        ));
    }

    #[test]
    fn nulls_are_skipped() {
        let out = rolling(&[None, Some(2.0), None, None, None], 3);
        assert!(approx(&out, &[Some(2.0), Some(2.0), Some(2.0), None, None]));
    }

    #[test]
    fn zero_window_is_invalid() {
        let table = df!("route" => ["A"], "x" => [1.0]).unwrap();
        assert!(matches!(
            smooth_per_group(&table, "route", &[("x", "s")], 0),
            Err(TransformError::InvalidInput { .. })
        ));
    }

    #[test]
    fn text_column_is_invalid() {
        let table = df!("route" => ["A"], "x" => ["1"]).unwrap();
        assert!(matches!(
            smooth_per_group(&table, "route", &[("x", "s")], 3),
            Err(TransformError::InvalidInput { .. })
        ));
    }

    #[test]
    fn groups_do_not_bleed_into_each_other() {
        let table = df!(
            "route" => ["A", "B", "A"],
            "x" => [0.0, 0.7, 1.0]
        )
        .unwrap();

        let out = smooth_per_group(&table, "route", &[("x", "smoothed")], 3).unwrap();

        assert!(approx(
            &float_values(&out, "smoothed").unwrap(),
            &[Some(0.5), Some(0.7), Some(0.5)]
        ));
    }
}
