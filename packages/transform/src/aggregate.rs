//! Per-route crash counts joined back onto the weather points.

use crash_weather_models::{AggregateCount, CrashView, RoadCondition, columns};
use polars::prelude::*;

use crate::{TransformError, is_numeric, require, text_values};

/// Temporary column keeping the weather row order across the join.
const WEATHER_ROW: &str = "__weather_row";

/// Rows of `crashes` that belong to `view`, judged by the road-condition
/// column. [`CrashView::All`] returns every row and does not need the
/// column. Codes outside [`RoadCondition`] are treated like a missing
/// code.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if the condition column is
/// missing or not numeric.
pub fn crash_view(
    crashes: &DataFrame,
    view: CrashView,
    condition_column: &str,
) -> Result<DataFrame, TransformError> {
    if view == CrashView::All {
        return Ok(crashes.clone());
    }

    let codes = require(crashes, condition_column)?;
    if !is_numeric(codes.dtype()) {
        return Err(TransformError::invalid(format!(
            "road-condition column '{condition_column}' is {}, expected codes",
            codes.dtype()
        )));
    }

    let mask: BooleanChunked = codes
        .cast(&DataType::Int64)?
        .i64()?
        .into_iter()
        .map(|code| view.admits(code.and_then(|c| RoadCondition::from_code(c).ok())))
        .collect();

    Ok(crashes.filter(&mask)?)
}

/// Counts crashes per `(route, route_id)`. Rows without a route are
/// ignored. Pairs appear in order of first occurrence.
///
/// # Errors
///
/// Returns [`TransformError`] if the route columns are missing.
pub fn count_by_route(crashes: &DataFrame) -> Result<Vec<AggregateCount>, TransformError> {
    require(crashes, columns::ROUTE)?;
    require(crashes, columns::ROUTE_ID)?;

    let counted = crashes
        .clone()
        .lazy()
        .filter(
            col(columns::ROUTE)
                .is_not_null()
                .and(col(columns::ROUTE_ID).is_not_null()),
        )
        .group_by_stable([col(columns::ROUTE), col(columns::ROUTE_ID)])
        .agg([len().alias("count")])
        .collect()?;

    let routes = text_values(&counted, columns::ROUTE)?;
    let route_ids = text_values(&counted, columns::ROUTE_ID)?;
    let counts = counted.column("count")?.cast(&DataType::UInt64)?;

    Ok(routes
        .into_iter()
        .zip(route_ids)
        .zip(counts.u64()?)
        .filter_map(|((route, route_id), count)| {
            Some(AggregateCount {
                route: route?,
                route_id: route_id?,
                count: count?,
            })
        })
        .collect())
}

/// Left-joins `counts` onto `weather` on `(route, route_id)` as a new
/// integer column. Weather row order is preserved and missing pairs get 0.
///
/// # Errors
///
/// Returns [`TransformError`] if the route columns are missing or the
/// column name is already taken.
pub fn join_counts(
    weather: &DataFrame,
    counts: &[AggregateCount],
    column: &str,
) -> Result<DataFrame, TransformError> {
    require(weather, columns::ROUTE)?;
    require(weather, columns::ROUTE_ID)?;
    if weather.get_column_index(column).is_some() {
        return Err(TransformError::invalid(format!(
            "weather table already has a '{column}' column"
        )));
    }

    let counts_frame = df!(
        columns::ROUTE => counts.iter().map(|c| c.route.as_str()).collect::<Vec<_>>(),
        columns::ROUTE_ID => counts.iter().map(|c| c.route_id.as_str()).collect::<Vec<_>>(),
        column => counts
            .iter()
            .map(|c| i64::try_from(c.count).unwrap_or(i64::MAX))
            .collect::<Vec<_>>()
    )?;

    let keys = [col(columns::ROUTE), col(columns::ROUTE_ID)];
    let mut joined = weather
        .clone()
        .lazy()
        .with_row_index(WEATHER_ROW, None)
        .join(
            counts_frame.lazy(),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Left),
        )
        .with_column(col(column).fill_null(lit(0)).cast(DataType::Int64))
        .sort([WEATHER_ROW], SortMultipleOptions::default())
        .collect()?;
    joined.drop_in_place(WEATHER_ROW)?;

    let matched = joined.column(column)?.i64()?.sum().unwrap_or(0).unsigned_abs();
    let total: u64 = counts.iter().map(|c| c.count).sum();
    if matched != total {
        log::warn!(
            "{column}: {} of {total} counted crashes have no matching weather point",
            total - matched.min(total)
        );
    }

    Ok(joined)
}

/// Builds the weather-point table with one count column per view.
///
/// # Errors
///
/// Returns [`TransformError`] if any view table lacks the route columns.
pub fn aggregate_views(
    weather: &DataFrame,
    views: &[(CrashView, &DataFrame)],
) -> Result<DataFrame, TransformError> {
    let mut table = weather.clone();
    for (view, crashes) in views {
        let counts = count_by_route(crashes)?;
        log::debug!(
            "{view}: {} crashes on {} weather points",
            counts.iter().map(|c| c.count).sum::<u64>(),
            counts.len()
        );
        table = join_counts(&table, &counts, &view.count_column())?;
    }
    Ok(table)
}
