//! Crash schema registry, loaded from embedded TOML configs.
//!
//! Each `.toml` file in `packages/transform/years/` is baked into the
//! binary at compile time via [`include_str!`]. Supporting a new crash year
//! means adding a TOML file and listing it below.

use crate::TransformError;
use crate::harmonize::{CommonSchema, YearSchema, parse_common_toml, parse_year_toml};

/// Rules shared by every year.
const COMMON_TOML: &str = include_str!("../years/common.toml");

/// Per-year rules embedded at compile time.
const YEAR_TOMLS: &[(u16, &str)] = &[
    (2017, include_str!("../years/2017.toml")),
    (2018, include_str!("../years/2018.toml")),
    (2019, include_str!("../years/2019.toml")),
];

/// Years with a registered crash schema, ascending.
#[must_use]
pub fn registered_years() -> Vec<u16> {
    YEAR_TOMLS.iter().map(|(year, _)| *year).collect()
}

/// Returns the schema for `year`.
///
/// # Errors
///
/// Returns [`TransformError::UnknownYear`] if the year is not registered,
/// or [`TransformError::Config`] if its TOML is malformed.
pub fn year_schema(year: u16) -> Result<YearSchema, TransformError> {
    let (_, toml) = YEAR_TOMLS
        .iter()
        .find(|(y, _)| *y == year)
        .ok_or(TransformError::UnknownYear { year })?;

    let schema = parse_year_toml(toml)?;
    if schema.year != year {
        return Err(TransformError::Config {
            message: format!("{year}.toml declares year {}", schema.year),
        });
    }
    Ok(schema)
}

/// Returns the rules shared by every year.
///
/// # Errors
///
/// Returns [`TransformError::Config`] if the embedded TOML is malformed.
pub fn common_schema() -> Result<CommonSchema, TransformError> {
    parse_common_toml(COMMON_TOML)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_all_years() {
        assert_eq!(registered_years(), vec![2017, 2018, 2019]);
        for year in registered_years() {
            let schema = year_schema(year).unwrap();
            assert_eq!(schema.year, year);
        }
    }

    #[test]
    fn common_schema_has_coordinates_last() {
        let common = common_schema().unwrap();
        let n = common.columns.len();
        assert_eq!(common.columns[n - 2], "longitude");
        assert_eq!(common.columns[n - 1], "latitude");
        assert_eq!(common.rules.exclude.len(), 4);
    }

    #[test]
    fn year_rules_differ_where_expected() {
        let y2017 = year_schema(2017).unwrap();
        assert_eq!(y2017.rules.include.len(), 1);
        assert!(y2017.rules.drop.iter().any(|c| c == "UIDENTSTLA"));

        let y2018 = year_schema(2018).unwrap();
        assert_eq!(y2018.rules.flags[0].any_of, vec!["IstSonstig", "IstGkfz"]);

        let y2019 = year_schema(2019).unwrap();
        assert_eq!(y2019.rules.exclude[0].column, "UMONAT");
        assert_eq!(y2019.rules.flags[0].target, "IstSonstig");
    }

    #[test]
    fn unknown_year() {
        assert!(matches!(
            year_schema(2020),
            Err(TransformError::UnknownYear { year: 2020 })
        ));
    }
}
