//! Weather observation preprocessing.

use crash_weather_models::columns;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{TransformError, text_values};

/// Column names used by the raw weather source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherColumns {
    pub route: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for WeatherColumns {
    fn default() -> Self {
        Self {
            route: "Strecke".to_string(),
            latitude: "Lat [°]".to_string(),
            longitude: "Lon [°]".to_string(),
        }
    }
}

fn rename_to(table: &mut DataFrame, from: &str, to: &str) -> Result<(), TransformError> {
    if table.get_column_index(from).is_some() {
        table.rename(from, to.into())?;
        Ok(())
    } else if table.get_column_index(to).is_some() {
        Ok(())
    } else {
        Err(TransformError::invalid(format!(
            "weather data has neither '{from}' nor '{to}'"
        )))
    }
}

/// Renames the raw weather columns to `route`, `latitude` and `longitude`
/// and strips `route_prefix` from every route name. Row order is kept.
///
/// Route values that were read as numbers are turned into text.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if a required column is missing.
pub fn preprocess_weather(
    raw: &DataFrame,
    source: &WeatherColumns,
    route_prefix: &str,
) -> Result<DataFrame, TransformError> {
    let mut table = raw.clone();

    rename_to(&mut table, &source.route, columns::ROUTE)?;
    rename_to(&mut table, &source.latitude, columns::LATITUDE)?;
    rename_to(&mut table, &source.longitude, columns::LONGITUDE)?;

    let stripped: StringChunked = text_values(&table, columns::ROUTE)?
        .iter()
        .map(|route| {
            route
                .as_deref()
                .map(|name| name.strip_prefix(route_prefix).unwrap_or(name))
        })
        .collect();

    table.with_column(stripped.with_name(columns::ROUTE.into()).into_series())?;

    log::debug!(
        "Preprocessed {} weather points (prefix {route_prefix:?} removed)",
        table.height()
    );

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_names;

    #[test]
    fn renames_and_strips_prefix() {
        let raw = df!(
            "Strecke" => [Some("Route_A9"), Some("B12"), None],
            "Lat [°]" => [48.0, 48.1, 48.2],
            "Lon [°]" => [11.0, 11.1, 11.2],
            "Nebel" => [0.5, 0.1, 0.0]
        )
        .unwrap();

        let out = preprocess_weather(&raw, &WeatherColumns::default(), "Route_").unwrap();

        assert_eq!(
            column_names(&out),
            vec!["route", "latitude", "longitude", "Nebel"]
        );
        assert_eq!(
            text_values(&out, "route").unwrap(),
            vec![Some("A9".to_string()), Some("B12".to_string()), None]
        );
    }

    #[test]
    fn numeric_routes_become_text() {
        let raw = df!(
            "route" => [7i64],
            "latitude" => [48.0],
            "longitude" => [11.0]
        )
        .unwrap();

        let out = preprocess_weather(&raw, &WeatherColumns::default(), "Route_").unwrap();

        assert_eq!(out.column("route").unwrap().dtype(), &DataType::String);
        assert_eq!(text_values(&out, "route").unwrap(), vec![Some("7".to_string())]);
    }

    #[test]
    fn missing_coordinates_are_rejected() {
        let raw = df!("Strecke" => ["A"]).unwrap();
        assert!(matches!(
            preprocess_weather(&raw, &WeatherColumns::default(), "Route_"),
            Err(TransformError::InvalidInput { .. })
        ));
    }
}
