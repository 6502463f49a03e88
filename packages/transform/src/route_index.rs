//! Per-route sequence numbers and composite route identifiers.
//!
//! Weather points carry no identifier of their own. Each point gets a
//! 1-based `sequence_in_route` (its position among the points of the same
//! route) and a `route_id` of the form `"{route}_{sequence_in_route}"`.
//! Sequence numbers follow the table's row order unless an explicit
//! ordering column is given.
//!
//! The part after the last `_` of an identifier is always the sequence
//! number, so identifiers are unique even when route names contain `_`.

use std::collections::BTreeMap;

use crash_weather_models::columns;
use polars::prelude::*;

use crate::{TransformError, is_numeric, require, text_values};

/// The route a weather point belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteLabel {
    pub route: String,
    pub route_id: String,
}

/// Temporary column holding each route's rank of first appearance.
const ROUTE_ORDER: &str = "__route_order";

fn route_names(table: &DataFrame) -> Result<Vec<String>, TransformError> {
    text_values(table, columns::ROUTE)?
        .into_iter()
        .enumerate()
        .map(|(row, route)| {
            route.ok_or_else(|| TransformError::invalid(format!("row {row} has no route name")))
        })
        .collect()
}

/// Reorders rows so that routes appear in order of first appearance and,
/// within a route, by `order_by` (stable, nulls last).
fn sorted_by_route(table: &DataFrame, order_by: &str) -> Result<DataFrame, TransformError> {
    if !is_numeric(require(table, order_by)?.dtype()) {
        return Err(TransformError::invalid(format!(
            "ordering column '{order_by}' is not numeric"
        )));
    }

    let routes = route_names(table)?;
    let mut first_seen: BTreeMap<&str, u32> = BTreeMap::new();
    let ranks: Vec<u32> = routes
        .iter()
        .map(|route| {
            let next = u32::try_from(first_seen.len()).unwrap_or(u32::MAX);
            *first_seen.entry(route.as_str()).or_insert(next)
        })
        .collect();

    let mut ranked = table.clone();
    ranked.with_column(Column::new(ROUTE_ORDER.into(), ranks))?;
    let mut sorted = ranked.sort(
        [ROUTE_ORDER, order_by],
        SortMultipleOptions::default()
            .with_nulls_last(true)
            .with_maintain_order(true),
    )?;
    sorted.drop_in_place(ROUTE_ORDER)?;
    Ok(sorted)
}

/// Adds `route_id` (at position 1) and `sequence_in_route` (at position 2).
///
/// With `order_by` set, rows are first reordered so that each route's
/// points are contiguous and sorted by that column.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if a route name is missing or
/// the ordering column is not numeric.
pub fn index_routes(table: &DataFrame, order_by: Option<&str>) -> Result<DataFrame, TransformError> {
    let mut indexed = match order_by {
        Some(column) => sorted_by_route(table, column)?,
        None => table.clone(),
    };

    let routes = route_names(&indexed)?;

    let mut counters: BTreeMap<&str, i64> = BTreeMap::new();
    let mut sequences = Vec::with_capacity(routes.len());
    let mut route_ids = Vec::with_capacity(routes.len());

    for route in &routes {
        let counter = counters.entry(route.as_str()).or_insert(0);
        *counter += 1;

        sequences.push(*counter);
        route_ids.push(format!("{route}_{counter}"));
    }

    log::info!(
        "Indexed {} weather points across {} routes",
        routes.len(),
        counters.len()
    );

    indexed.insert_column(1, Column::new(columns::ROUTE_ID.into(), route_ids))?;
    indexed.insert_column(2, Column::new(columns::SEQUENCE_IN_ROUTE.into(), sequences))?;
    Ok(indexed)
}

/// Reads the `route`/`route_id` pair of every row of an indexed table.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if either value is missing.
pub fn route_labels(table: &DataFrame) -> Result<Vec<RouteLabel>, TransformError> {
    let routes = route_names(table)?;
    let ids = text_values(table, columns::ROUTE_ID)?;

    routes
        .into_iter()
        .zip(ids)
        .enumerate()
        .map(|(row, (route, id))| {
            let route_id = id.ok_or_else(|| {
                TransformError::invalid(format!("row {row} has no route identifier"))
            })?;
            Ok(RouteLabel { route, route_id })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{column_names, float_values};

    fn weather(routes: &[&str]) -> DataFrame {
        df!(
            "route" => routes,
            "latitude" => vec![48.0; routes.len()],
            "longitude" => vec![11.0; routes.len()]
        )
        .unwrap()
    }

    fn ids(table: &DataFrame) -> Vec<String> {
        text_values(table, "route_id").unwrap().into_iter().flatten().collect()
    }

    #[test]
    fn sequences_are_contiguous_per_route() {
        let out = index_routes(&weather(&["A", "B", "A", "A", "B"]), None).unwrap();

        assert_eq!(
            column_names(&out),
            vec!["route", "route_id", "sequence_in_route", "latitude", "longitude"]
        );
        assert_eq!(
            out.column("sequence_in_route").unwrap().i64().unwrap().into_iter().collect::<Vec<_>>(),
            vec![Some(1), Some(1), Some(2), Some(3), Some(2)]
        );
        assert_eq!(ids(&out), vec!["A_1", "B_1", "A_2", "A_3", "B_2"]);
    }

    #[test]
    fn explicit_ordering_sorts_within_route() {
        let mut table = weather(&["A", "B", "A"]);
        table
            .with_column(Column::new("km".into(), [Some(5.0), Some(1.0), Some(2.0)]))
            .unwrap();

        let out = index_routes(&table, Some("km")).unwrap();

        assert_eq!(ids(&out), vec!["A_1", "A_2", "B_1"]);
        assert_eq!(
            float_values(&out, "km").unwrap(),
            vec![Some(2.0), Some(5.0), Some(1.0)]
        );
        assert_eq!(column_names(&out).len(), 6);
    }

    #[test]
    fn ordering_puts_nulls_last_and_keeps_ties_stable() {
        let mut table = weather(&["B", "A", "B", "B", "A"]);
        table
            .with_column(Column::new(
                "km".into(),
                [None, Some(3.0), Some(1.0), Some(1.0), Some(2.0)],
            ))
            .unwrap();
        table
            .with_column(Column::new("tag".into(), ["b0", "a1", "b2", "b3", "a4"]))
            .unwrap();

        let out = index_routes(&table, Some("km")).unwrap();

        assert_eq!(
            text_values(&out, "tag").unwrap().into_iter().flatten().collect::<Vec<_>>(),
            vec!["b2", "b3", "b0", "a4", "a1"]
        );
    }

    #[test]
    fn text_ordering_column_is_rejected() {
        let mut table = weather(&["A"]);
        table.with_column(Column::new("km".into(), ["x"])).unwrap();

        assert!(matches!(
            index_routes(&table, Some("km")),
            Err(TransformError::InvalidInput { .. })
        ));
    }

    #[test]
    fn identifiers_stay_unique_with_underscored_routes() {
        let out = index_routes(&weather(&["A", "A", "A_1", "A_2", "A_1"]), None).unwrap();
        let mut ids = ids(&out);
        let n = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), n);
    }

    #[test]
    fn null_route_is_rejected() {
        let table = df!("route" => [Some("A"), None]).unwrap();
        assert!(matches!(
            index_routes(&table, None),
            Err(TransformError::InvalidInput { .. })
        ));
    }

    #[test]
    fn labels_follow_rows() {
        let out = index_routes(&weather(&["A", "B"]), None).unwrap();
        assert_eq!(
            route_labels(&out).unwrap(),
            vec![
                RouteLabel {
                    route: "A".to_string(),
                    route_id: "A_1".to_string()
                },
                RouteLabel {
                    route: "B".to_string(),
                    route_id: "B_1".to_string()
                },
            ]
        );
    }
}
