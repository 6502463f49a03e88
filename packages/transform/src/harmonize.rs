//! Per-year crash schema harmonization.
//!
//! Each crash year ships with a slightly different column set: renamed
//! fields, extra object ids, flags that were split or merged. The
//! differences are described declaratively in TOML (see `years/`) and
//! applied here in a fixed order:
//!
//! 1. renames
//! 2. derived flags (`target = OR(any_of)`)
//! 3. include filters (a row is kept only if every predicate matches)
//! 4. exclude filters (a row is dropped if any predicate matches)
//! 5. column drops
//! 6. projection onto the shared column order
//!
//! After step 6 every year has identical column names in identical
//! positions, so the yearly tables concatenate by position.

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::Deserialize;

use crate::{TransformError, column_names, is_numeric};

/// Row predicate: the column's numeric value equals `equals`. Nulls and
/// non-numeric columns never match.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub equals: f64,
}

impl Predicate {
    /// Boolean expression that is `true` exactly on matching rows.
    fn expr(&self, table: &DataFrame) -> Result<Expr, TransformError> {
        let column = table.column(&self.column).map_err(|_| {
            TransformError::invalid(format!("filter column '{}' is missing", self.column))
        })?;
        if !is_numeric(column.dtype()) {
            return Ok(lit(false));
        }
        Ok(col(self.column.as_str())
            .cast(DataType::Float64)
            .eq(lit(self.equals))
            .fill_null(lit(false)))
    }
}

/// A flag column computed as the logical OR of other flag columns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DerivedFlag {
    pub target: String,
    pub any_of: Vec<String>,
}

/// The transformation rules shared by the common and per-year schemas.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchemaRules {
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub flags: Vec<DerivedFlag>,
    #[serde(default)]
    pub include: Vec<Predicate>,
    #[serde(default)]
    pub exclude: Vec<Predicate>,
    #[serde(default)]
    pub drop: Vec<String>,
}

/// Year-specific crash schema rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YearSchema {
    pub year: u16,
    #[serde(flatten)]
    pub rules: SchemaRules,
}

/// Rules applied to every year, plus the harmonized column order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommonSchema {
    pub columns: Vec<String>,
    #[serde(flatten)]
    pub rules: SchemaRules,
}

/// Parses a [`YearSchema`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_year_toml(toml_str: &str) -> Result<YearSchema, TransformError> {
    toml::de::from_str(toml_str).map_err(|e| TransformError::Config {
        message: e.to_string(),
    })
}

/// Parses a [`CommonSchema`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_common_toml(toml_str: &str) -> Result<CommonSchema, TransformError> {
    toml::de::from_str(toml_str).map_err(|e| TransformError::Config {
        message: e.to_string(),
    })
}

/// Harmonizes one year of raw crash records using the embedded schemas.
///
/// # Errors
///
/// Returns [`TransformError::UnknownYear`] if no schema is registered for
/// `year`, or [`TransformError::InvalidInput`] if the raw table lacks a
/// column the rules need.
pub fn harmonize(raw: &DataFrame, year: u16) -> Result<DataFrame, TransformError> {
    let schema = crate::registry::year_schema(year)?;
    let common = crate::registry::common_schema()?;
    harmonize_with(raw, &common, &schema)
}

/// Harmonizes a raw crash table with explicit schemas.
///
/// # Errors
///
/// Returns [`TransformError::InvalidInput`] if the raw table lacks a column
/// the rules need or a harmonized column.
pub fn harmonize_with(
    raw: &DataFrame,
    common: &CommonSchema,
    schema: &YearSchema,
) -> Result<DataFrame, TransformError> {
    let year_rules = &schema.rules;
    let common_rules = &common.rules;
    let mut table = raw.clone();

    for (from, to) in year_rules.rename.iter().chain(&common_rules.rename) {
        if table.get_column_index(from).is_some() {
            table.rename(from, to.as_str().into())?;
        } else {
            log::debug!("{}: rename source '{from}' not present", schema.year);
        }
    }

    for flag in year_rules.flags.iter().chain(&common_rules.flags) {
        table = apply_flag(table, flag)?;
    }

    let rows_before = table.height();

    let mut conditions = Vec::new();
    for predicate in year_rules.include.iter().chain(&common_rules.include) {
        conditions.push(predicate.expr(&table)?);
    }
    for predicate in year_rules.exclude.iter().chain(&common_rules.exclude) {
        conditions.push(predicate.expr(&table)?.not());
    }
    let mut table = match conditions.into_iter().reduce(Expr::and) {
        Some(keep) => table.lazy().filter(keep).collect()?,
        None => table,
    };

    for name in year_rules.drop.iter().chain(&common_rules.drop) {
        if table.get_column_index(name).is_some() {
            table.drop_in_place(name)?;
        } else {
            log::debug!("{}: drop target '{name}' not present", schema.year);
        }
    }

    let missing: Vec<&str> = common
        .columns
        .iter()
        .map(String::as_str)
        .filter(|c| table.get_column_index(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(TransformError::invalid(format!(
            "crash data for {} is missing harmonized column(s): {}",
            schema.year,
            missing.join(", ")
        )));
    }

    let extra: Vec<String> = column_names(&table)
        .into_iter()
        .filter(|c| !common.columns.contains(c))
        .collect();
    if !extra.is_empty() {
        log::warn!(
            "{}: dropping unexpected column(s): {}",
            schema.year,
            extra.join(", ")
        );
    }

    let harmonized = table.select(common.columns.iter().map(String::as_str))?;

    log::info!(
        "Harmonized {} crash records: {rows_before} -> {} rows",
        schema.year,
        harmonized.height()
    );

    Ok(harmonized)
}

/// Sets `flag.target` to 1 where any source column is non-zero and 0
/// elsewhere. Nulls and text columns count as unset.
fn apply_flag(table: DataFrame, flag: &DerivedFlag) -> Result<DataFrame, TransformError> {
    let mut any = lit(false);
    for name in &flag.any_of {
        let column = table.column(name).map_err(|_| {
            TransformError::invalid(format!(
                "flag '{}' needs missing column '{name}'",
                flag.target
            ))
        })?;
        if is_numeric(column.dtype()) {
            any = any.or(col(name.as_str())
                .cast(DataType::Float64)
                .neq(lit(0.0))
                .fill_null(lit(false)));
        }
    }

    Ok(table
        .lazy()
        .with_column(any.cast(DataType::Int64).alias(flag.target.as_str()))
        .collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common() -> CommonSchema {
        parse_common_toml(
            r#"
            columns = ["UMONAT", "IstSonstig", "longitude", "latitude"]
            drop = ["IstRad"]

            [rename]
            XGCSWGS84 = "longitude"
            YGCSWGS84 = "latitude"

            [[exclude]]
            column = "IstRad"
            equals = 1
            "#,
        )
        .unwrap()
    }

    fn raw(month: &[i64], sonstige: &[i64], gkfz: &[i64], rad: &[i64]) -> DataFrame {
        let n = month.len();
        df!(
            "OBJECTID" => (0..n).map(|i| i64::try_from(i).unwrap()).collect::<Vec<_>>(),
            "UMONAT" => month,
            "IstSonstige" => sonstige,
            "IstGkfz" => gkfz,
            "IstRad" => rad,
            "XGCSWGS84" => vec![11.0; n],
            "YGCSWGS84" => vec![48.0; n]
        )
        .unwrap()
    }

    fn ints(table: &DataFrame, name: &str) -> Vec<Option<i64>> {
        table.column(name).unwrap().i64().unwrap().into_iter().collect()
    }

    #[test]
    fn flags_filters_and_projection() {
        let schema = parse_year_toml(
            r#"
            year = 2019
            drop = ["OBJECTID", "IstGkfz", "IstSonstige"]

            [[flags]]
            target = "IstSonstig"
            any_of = ["IstSonstige", "IstGkfz"]

            [[exclude]]
            column = "UMONAT"
            equals = 12
            "#,
        )
        .unwrap();

        let table = raw(&[1, 12, 3, 4], &[0, 0, 1, 0], &[1, 1, 0, 0], &[0, 0, 0, 1]);
        let out = harmonize_with(&table, &common(), &schema).unwrap();

        assert_eq!(
            column_names(&out),
            vec!["UMONAT", "IstSonstig", "longitude", "latitude"]
        );
        // month 12 and the bicycle crash are removed
        assert_eq!(out.height(), 2);
        assert_eq!(ints(&out, "UMONAT"), vec![Some(1), Some(3)]);
        assert_eq!(ints(&out, "IstSonstig"), vec![Some(1), Some(1)]);
    }

    #[test]
    fn include_keeps_only_matching_rows() {
        let schema = parse_year_toml(
            r#"
            year = 2017
            drop = ["OBJECTID", "IstGkfz"]

            [rename]
            IstSonstige = "IstSonstig"

            [[include]]
            column = "UMONAT"
            equals = 12
            "#,
        )
        .unwrap();

        let table = raw(&[11, 12, 12], &[0, 1, 0], &[0, 0, 0], &[0, 0, 0]);
        let out = harmonize_with(&table, &common(), &schema).unwrap();

        assert_eq!(ints(&out, "UMONAT"), vec![Some(12), Some(12)]);
        assert_eq!(ints(&out, "IstSonstig"), vec![Some(1), Some(0)]);
    }

    #[test]
    fn null_flags_count_as_unset() {
        let table = df!(
            "a" => [None, Some(0i64), Some(1)],
            "b" => [None::<i64>, None, None]
        )
        .unwrap();

        let table = apply_flag(
            table,
            &DerivedFlag {
                target: "a".to_string(),
                any_of: vec!["a".to_string(), "b".to_string()],
            },
        )
        .unwrap();

        assert_eq!(ints(&table, "a"), vec![Some(0), Some(0), Some(1)]);
        assert_eq!(column_names(&table), vec!["a", "b"]);
    }

    #[test]
    fn missing_harmonized_column_is_invalid_input() {
        let schema = parse_year_toml("year = 2018").unwrap();
        let table = raw(&[1], &[0], &[0], &[0]);

        let err = harmonize_with(&table, &common(), &schema).unwrap_err();
        assert!(matches!(err, TransformError::InvalidInput { message } if message.contains("IstSonstig")));
    }

    #[test]
    fn nulls_and_text_never_match_a_predicate() {
        let table = df!(
            "x" => [None, Some(0.0), Some(1.0)],
            "t" => ["0", "0", "0"]
        )
        .unwrap();
        let equals_zero = |column: &str| Predicate {
            column: column.to_string(),
            equals: 0.0,
        };

        let kept = table
            .clone()
            .lazy()
            .filter(equals_zero("x").expr(&table).unwrap())
            .collect()
            .unwrap();
        assert_eq!(kept.height(), 1);

        let dropped = table
            .clone()
            .lazy()
            .filter(equals_zero("x").expr(&table).unwrap().not())
            .collect()
            .unwrap();
        assert_eq!(dropped.height(), 2);

        let text = table
            .clone()
            .lazy()
            .filter(equals_zero("t").expr(&table).unwrap())
            .collect()
            .unwrap();
        assert_eq!(text.height(), 0);
    }

    #[test]
    fn missing_filter_column_is_invalid_input() {
        let schema = parse_year_toml(
            r#"
            year = 2018

            [[exclude]]
            column = "NOPE"
            equals = 1
            "#,
        )
        .unwrap();
        let table = raw(&[1], &[0], &[0], &[0]);

        assert!(matches!(
            harmonize_with(&table, &common(), &schema),
            Err(TransformError::InvalidInput { message }) if message.contains("NOPE")
        ));
    }

    #[test]
    fn unknown_year_is_rejected() {
        let table = raw(&[1], &[0], &[0], &[0]);
        assert!(matches!(
            harmonize(&table, 2016),
            Err(TransformError::UnknownYear { year: 2016 })
        ));
    }
}
