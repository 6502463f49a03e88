#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Idempotent stage orchestration for the crash-weather pipeline.
//!
//! The pipeline is a [`StageGraph`](graph::StageGraph) of named stages,
//! each reading whole tables from a [`TableStore`] and writing exactly one
//! output table. A stage whose output already exists is skipped, so an
//! interrupted run resumes where it stopped and a repeated run does no
//! work. The concrete crash/weather stages are declared in [`stages`].

pub mod config;
pub mod graph;
pub mod orchestrator;
pub mod progress;
pub mod stages;

use std::sync::Arc;

use crash_weather_store::{StoreError, TableStore};
use crash_weather_transform::TransformError;
use polars::prelude::PolarsError;
use serde::{Deserialize, Serialize};

pub use config::PipelineConfig;
pub use progress::{NullProgress, PipelineProgress, null_progress};

/// Errors that can occur while building or running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reading or writing a stored table failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stage transformation failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The stage graph is malformed.
    #[error("Invalid stage graph: {message}")]
    Graph {
        /// Description of what is wrong.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of what is wrong.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage failed; no output was written for it.
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// What went wrong.
        source: Box<Self>,
    },
}

impl From<PolarsError> for PipelineError {
    fn from(e: PolarsError) -> Self {
        Self::Transform(TransformError::Polars(e))
    }
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnknownYear,
    TableNotFound,
    DegenerateRange,
    Config,
    Storage,
}

impl PipelineError {
    /// Classifies the error, looking through stage wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Stage { source, .. } => source.kind(),
            Self::Store(StoreError::TableNotFound { .. }) => ErrorKind::TableNotFound,
            Self::Store(StoreError::EmptySchema { .. }) => ErrorKind::InvalidInput,
            Self::Store(StoreError::DuckDb(_) | StoreError::Io(_) | StoreError::Polars(_))
            | Self::Io(_) => ErrorKind::Storage,
            Self::Transform(TransformError::UnknownYear { .. }) => ErrorKind::UnknownYear,
            Self::Transform(TransformError::DegenerateRange { .. }) => ErrorKind::DegenerateRange,
            Self::Transform(TransformError::Config { .. }) | Self::Config { .. } | Self::Graph { .. } => {
                ErrorKind::Config
            }
            Self::Transform(
                TransformError::InvalidInput { .. }
                | TransformError::Polars(_)
                | TransformError::Spatial(_),
            ) => ErrorKind::InvalidInput,
        }
    }
}

/// Everything a stage needs besides its input tables.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    /// Receives stage and row progress.
    pub progress: Arc<dyn PipelineProgress>,
}

impl PipelineContext {
    /// Creates a context that reports no progress.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            progress: null_progress(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn PipelineProgress>) -> Self {
        self.progress = progress;
        self
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds the standard stage graph for `ctx` and runs it against `store`.
///
/// # Errors
///
/// Returns [`PipelineError`] if the graph is invalid or any stage fails.
pub fn run_pipeline(
    store: &mut dyn TableStore,
    ctx: &PipelineContext,
) -> Result<orchestrator::RunReport, PipelineError> {
    ctx.config.validate()?;
    let graph = stages::build_graph(&ctx.config)?;
    orchestrator::run(store, &graph, ctx)
}
