//! Runs a [`StageGraph`] against a [`TableStore`].
//!
//! Stages run strictly one after another. Before a stage runs, the store
//! is asked whether its output table exists; if it does (and the run is
//! not forced) the stage is skipped. Otherwise its inputs are read fresh
//! from the store, the transformation runs, and the result is persisted
//! with a single all-or-nothing write. A failing stage leaves no output
//! behind and stops the run.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crash_weather_store::TableStore;
use serde::Serialize;

use crate::graph::StageGraph;
use crate::{PipelineContext, PipelineError};

/// Whether a stage's output exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Done,
}

/// What happened to a stage during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The output already existed.
    Skipped,
    /// The stage ran and wrote `rows` rows.
    Completed { rows: usize },
}

/// Per-stage entry of a [`RunReport`].
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: String,
    pub output: String,
    pub outcome: StageOutcome,
    pub elapsed: Duration,
}

/// Summary of one orchestrator run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Number of stages that actually ran.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| matches!(s.outcome, StageOutcome::Completed { .. }))
            .count()
    }

    /// Number of stages skipped because their output existed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.outcome == StageOutcome::Skipped)
            .count()
    }
}

/// Status of one stage as seen in the store, without running anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageState {
    pub stage: String,
    pub output: String,
    pub status: StageStatus,
    pub last_written: Option<DateTime<Utc>>,
    /// Rows in the output table, when the store records it.
    pub rows: Option<u64>,
}

/// Runs every stage of `graph` in order.
///
/// `ctx.progress` sees every stage start and finish, and the end of the
/// run even when a stage fails.
///
/// # Errors
///
/// Returns [`PipelineError::Stage`] wrapping the cause for the first stage
/// that fails, or a store error if existence checks fail.
pub fn run(
    store: &mut dyn TableStore,
    graph: &StageGraph,
    ctx: &PipelineContext,
) -> Result<RunReport, PipelineError> {
    let run_start = Instant::now();
    let mut report = RunReport::default();

    ctx.progress.run_started(graph.stages().len());
    let result = run_stages(store, graph, ctx, &mut report);
    ctx.progress
        .run_finished(report.completed(), report.skipped());
    result?;

    log::info!(
        "Pipeline finished in {:.1}s ({} run, {} skipped)",
        run_start.elapsed().as_secs_f64(),
        report.completed(),
        report.skipped()
    );

    Ok(report)
}

fn run_stages(
    store: &mut dyn TableStore,
    graph: &StageGraph,
    ctx: &PipelineContext,
    report: &mut RunReport,
) -> Result<(), PipelineError> {
    for stage in graph.stages() {
        let start = Instant::now();
        ctx.progress.stage_started(stage.name());

        if !ctx.config.force && store.table_exists(stage.output())? {
            log::info!("{}: {} up-to-date, skipping", stage.name(), stage.output());
            report.stages.push(StageReport {
                stage: stage.name().to_string(),
                output: stage.output().to_string(),
                outcome: StageOutcome::Skipped,
                elapsed: start.elapsed(),
            });
            ctx.progress.stage_finished(stage.name(), false);
            continue;
        }

        log::info!("{}: running", stage.name());

        let rows = execute(store, stage, ctx).map_err(|e| {
            log::error!("{}: failed: {e}", stage.name());
            PipelineError::Stage {
                stage: stage.name().to_string(),
                source: Box::new(e),
            }
        })?;

        let elapsed = start.elapsed();
        log::info!(
            "{}: wrote {rows} rows to {} in {:.1}s",
            stage.name(),
            stage.output(),
            elapsed.as_secs_f64()
        );

        report.stages.push(StageReport {
            stage: stage.name().to_string(),
            output: stage.output().to_string(),
            outcome: StageOutcome::Completed { rows },
            elapsed,
        });
        ctx.progress.stage_finished(stage.name(), true);
    }

    Ok(())
}

fn execute(
    store: &mut dyn TableStore,
    stage: &crate::graph::Stage,
    ctx: &PipelineContext,
) -> Result<usize, PipelineError> {
    let inputs = stage
        .inputs()
        .iter()
        .map(|name| store.read_table(name))
        .collect::<Result<Vec<_>, _>>()?;

    let output = stage.run(ctx, &inputs)?;
    store.write_table(stage.output(), &output)?;
    Ok(output.height())
}

/// Reports pending/done for every stage without running anything.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if the store cannot be queried.
pub fn status(
    store: &dyn TableStore,
    graph: &StageGraph,
) -> Result<Vec<StageState>, PipelineError> {
    graph
        .stages()
        .iter()
        .map(|stage| {
            let output = stage.output();
            let done = store.table_exists(output)?;
            let (last_written, rows) = if done {
                (store.last_written(output)?, store.row_count(output)?)
            } else {
                (None, None)
            };

            Ok(StageState {
                stage: stage.name().to_string(),
                output: output.to_string(),
                status: if done {
                    StageStatus::Done
                } else {
                    StageStatus::Pending
                },
                last_written,
                rows,
            })
        })
        .collect()
}
