//! The concrete crash/weather stage chain.
//!
//! ```text
//! weather_raw ──► preprocess_weather ──► weather_indexed ─────────────┐
//! crash_raw_<y> ─► match_crashes_<y> ──► crash_nearby_<y> ─► assign_routes ─► crash_assigned
//! crash_assigned ─► filter_{wet,snow,wet_snow} ─► crash_{wet,snow,wet_snow}
//! weather_indexed + crash views ─► aggregate_counts ─► normalize_global
//!                                ─► normalize_per_route ─► smooth
//! ```

use crash_weather_models::{CrashView, columns, tables};
use crash_weather_transform::aggregate::{aggregate_views, crash_view};
use crash_weather_transform::harmonize::harmonize;
use crash_weather_transform::normalize::{normalize_global, normalize_per_group};
use crash_weather_transform::route_index::index_routes;
use crash_weather_transform::smooth::smooth_per_group;
use crash_weather_transform::spatial_join::{assign_routes, filter_nearby};
use crash_weather_transform::weather::preprocess_weather;
use crash_weather_transform::{concat_frames, sample_rows};
use polars::prelude::DataFrame;

use crate::graph::{Stage, StageGraph};
use crate::progress::RowTask;
use crate::{PipelineConfig, PipelineContext, PipelineError};

fn names<S: AsRef<str>>(tables: &[S]) -> Vec<String> {
    tables.iter().map(|t| t.as_ref().to_string()).collect()
}

/// Applies the configured raw-row sampling, if any.
fn sampled(ctx: &PipelineContext, raw: &DataFrame) -> Result<DataFrame, PipelineError> {
    match ctx.config.sample_fraction {
        Some(fraction) if fraction < 1.0 => {
            Ok(sample_rows(raw, fraction, ctx.config.sample_seed)?)
        }
        _ => Ok(raw.clone()),
    }
}

/// Declares every stage for the configured crash years.
///
/// # Errors
///
/// Returns [`PipelineError::Graph`] if the declared stages do not form a
/// valid graph (e.g. a year is listed twice).
pub fn build_graph(config: &PipelineConfig) -> Result<StageGraph, PipelineError> {
    let mut stages = vec![Stage::new(
        "preprocess_weather",
        names(&[tables::WEATHER_RAW]),
        tables::WEATHER_INDEXED,
        |ctx, inputs| {
            let config = &ctx.config;
            let raw = sampled(ctx, &inputs[0])?;
            let weather = preprocess_weather(&raw, &config.weather, &config.route_prefix)?;
            Ok(index_routes(&weather, config.weather_order_by.as_deref())?)
        },
    )];

    for &year in &config.years {
        stages.push(Stage::new(
            format!("match_crashes_{year}"),
            vec![tables::crash_raw(year), tables::WEATHER_INDEXED.to_string()],
            tables::crash_nearby(year),
            move |ctx, inputs| {
                let crashes = harmonize(&sampled(ctx, &inputs[0])?, year)?;

                let task = RowTask::start(
                    ctx.progress.as_ref(),
                    &format!("matching {year}"),
                    crashes.height(),
                );
                Ok(filter_nearby(
                    &crashes,
                    &inputs[1],
                    ctx.config.threshold_m,
                    ctx.config.batch_size,
                    |n| task.matched(n),
                )?)
            },
        ));
    }

    let mut assign_inputs: Vec<String> =
        config.years.iter().map(|&y| tables::crash_nearby(y)).collect();
    assign_inputs.push(tables::WEATHER_INDEXED.to_string());
    stages.push(Stage::new(
        "assign_routes",
        assign_inputs,
        tables::CRASH_ASSIGNED,
        |ctx, inputs| {
            let (weather, crashes) = inputs
                .split_last()
                .ok_or_else(|| PipelineError::Graph {
                    message: "assign_routes needs at least the weather table".to_string(),
                })?;
            let crashes = concat_frames(crashes)?;

            let task = RowTask::start(ctx.progress.as_ref(), "assigning routes", crashes.height());
            Ok(assign_routes(
                &crashes,
                weather,
                ctx.config.threshold_m,
                ctx.config.batch_size,
                |n| task.matched(n),
            )?)
        },
    ));

    for &view in CrashView::filtered() {
        stages.push(Stage::new(
            format!("filter_{view}"),
            names(&[tables::CRASH_ASSIGNED]),
            view.table_name(),
            move |ctx, inputs| Ok(crash_view(&inputs[0], view, &ctx.config.condition_column)?),
        ));
    }

    let mut aggregate_inputs = names(&[tables::WEATHER_INDEXED]);
    aggregate_inputs.extend(CrashView::all().iter().map(|v| v.table_name().to_string()));
    stages.push(Stage::new(
        "aggregate_counts",
        aggregate_inputs,
        tables::WEATHER_CRASH_COUNTS,
        |_, inputs| {
            let views: Vec<(CrashView, &DataFrame)> =
                CrashView::all().iter().copied().zip(&inputs[1..]).collect();
            Ok(aggregate_views(&inputs[0], &views)?)
        },
    ));

    stages.push(Stage::new(
        "normalize_global",
        names(&[tables::WEATHER_CRASH_COUNTS]),
        tables::WEATHER_CRASH,
        |ctx, inputs| {
            let pairs: Vec<(String, String)> = CrashView::all()
                .iter()
                .map(|v| (v.count_column(), v.normalized_column()))
                .collect();
            let pairs: Vec<(&str, &str)> =
                pairs.iter().map(|(s, t)| (s.as_str(), t.as_str())).collect();
            Ok(normalize_global(&inputs[0], &pairs, ctx.config.degenerate_range)?)
        },
    ));

    stages.push(Stage::new(
        "normalize_per_route",
        names(&[tables::WEATHER_CRASH]),
        tables::WEATHER_CRASH_SCALED,
        |ctx, inputs| {
            let normalized: Vec<String> =
                CrashView::all().iter().map(|v| v.normalized_column()).collect();
            let scaled: Vec<&str> = ctx
                .config
                .severity_columns
                .iter()
                .chain(&normalized)
                .map(String::as_str)
                .collect();
            Ok(normalize_per_group(
                &inputs[0],
                columns::ROUTE,
                &scaled,
                ctx.config.degenerate_range,
            )?)
        },
    ));

    stages.push(Stage::new(
        "smooth",
        names(&[tables::WEATHER_CRASH_SCALED]),
        tables::WEATHER_CRASH_NORMALIZED,
        |ctx, inputs| {
            let pairs: Vec<(String, String)> = CrashView::all()
                .iter()
                .map(|v| (v.scaled_column(), v.smoothed_column()))
                .collect();
            let pairs: Vec<(&str, &str)> =
                pairs.iter().map(|(s, t)| (s.as_str(), t.as_str())).collect();
            Ok(smooth_per_group(
                &inputs[0],
                columns::ROUTE,
                &pairs,
                ctx.config.smoothing_window,
            )?)
        },
    ));

    StageGraph::new(stages)
}
