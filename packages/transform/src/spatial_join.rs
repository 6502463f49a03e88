//! Joining crash records to weather points by distance.

use crash_weather_models::columns;
use crash_weather_spatial::{Coordinate, assign_labels, within_threshold};
use polars::prelude::*;

use crate::route_index::{RouteLabel, route_labels};
use crate::{TransformError, coordinates};

/// Splits `points` into batches of `batch_size` (0 means a single batch).
fn batches(points: &[Coordinate], batch_size: usize) -> std::slice::Chunks<'_, Coordinate> {
    let batch_size = if batch_size == 0 {
        points.len().max(1)
    } else {
        batch_size
    };
    points.chunks(batch_size)
}

/// Keeps the crashes that lie within `threshold_m` of any weather point.
///
/// Crashes are checked in batches of `batch_size` rows (0 means a single
/// batch); `on_batch` receives the size of each finished batch.
///
/// # Errors
///
/// Returns [`TransformError`] if coordinates are missing or invalid, the
/// threshold is invalid, or there are crashes but no weather points.
pub fn filter_nearby(
    crashes: &DataFrame,
    weather: &DataFrame,
    threshold_m: f64,
    batch_size: usize,
    mut on_batch: impl FnMut(usize),
) -> Result<DataFrame, TransformError> {
    let points = coordinates(crashes, columns::LATITUDE, columns::LONGITUDE)?;
    let reference = coordinates(weather, columns::LATITUDE, columns::LONGITUDE)?;

    let mut mask: Vec<bool> = Vec::with_capacity(points.len());
    for batch in batches(&points, batch_size) {
        mask.extend(within_threshold(batch, &reference, threshold_m)?);
        on_batch(batch.len());
    }

    let mask: BooleanChunked = mask.into_iter().collect();
    let nearby = crashes.filter(&mask)?;

    log::info!(
        "{} of {} crashes lie within {threshold_m} m of a weather point",
        nearby.height(),
        crashes.height()
    );

    Ok(nearby)
}

/// Labels every crash with the `route` and `route_id` of its nearest
/// weather point, or nulls when that point is farther than `threshold_m`.
///
/// Crashes are processed in batches of `batch_size` rows (0 means a single
/// batch); `on_batch` receives the size of each finished batch.
///
/// # Errors
///
/// Returns [`TransformError`] if coordinates or route labels are missing
/// or invalid, the threshold is invalid, there are crashes but no weather
/// points, or the crash table already has route columns.
pub fn assign_routes(
    crashes: &DataFrame,
    weather: &DataFrame,
    threshold_m: f64,
    batch_size: usize,
    mut on_batch: impl FnMut(usize),
) -> Result<DataFrame, TransformError> {
    for name in [columns::ROUTE, columns::ROUTE_ID] {
        if crashes.get_column_index(name).is_some() {
            return Err(TransformError::invalid(format!(
                "crash table already has a '{name}' column"
            )));
        }
    }

    let points = coordinates(crashes, columns::LATITUDE, columns::LONGITUDE)?;
    let reference = coordinates(weather, columns::LATITUDE, columns::LONGITUDE)?;
    let labels = route_labels(weather)?;

    let mut assigned: Vec<Option<RouteLabel>> = Vec::with_capacity(points.len());
    for batch in batches(&points, batch_size) {
        assigned.extend(assign_labels(batch, &reference, &labels, threshold_m)?);
        on_batch(batch.len());
    }

    let labeled = assigned.iter().filter(|l| l.is_some()).count();
    log::info!(
        "Assigned {labeled} of {} crashes to a weather point within {threshold_m} m",
        assigned.len()
    );

    let routes: StringChunked = assigned
        .iter()
        .map(|l| l.as_ref().map(|l| l.route.as_str()))
        .collect();
    let route_ids: StringChunked = assigned
        .iter()
        .map(|l| l.as_ref().map(|l| l.route_id.as_str()))
        .collect();

    let mut table = crashes.clone();
    table.with_column(routes.with_name(columns::ROUTE.into()).into_series())?;
    table.with_column(route_ids.with_name(columns::ROUTE_ID.into()).into_series())?;
    Ok(table)
}
