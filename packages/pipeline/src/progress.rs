//! Progress events emitted while the pipeline runs.
//!
//! The orchestrator reports stage boundaries and the row-heavy stages
//! (crash matching and route assignment) report rows as they are matched.
//! The CLI renders these events as progress bars; library callers and
//! tests use [`NullProgress`].

use std::sync::Arc;

/// Receives pipeline progress. Every method defaults to doing nothing, so
/// an implementation only overrides the events it renders.
pub trait PipelineProgress: Send + Sync {
    /// A run over `stages` stages is starting.
    fn run_started(&self, _stages: usize) {}

    /// `stage` is about to be checked and, unless its output exists, run.
    fn stage_started(&self, _stage: &str) {}

    /// `stage` is done; `ran` is false when it was skipped.
    fn stage_finished(&self, _stage: &str, _ran: bool) {}

    /// A stage started matching `total` rows described by `task`.
    fn rows_started(&self, _task: &str, _total: u64) {}

    /// `rows` more rows of the current task are matched.
    fn rows_matched(&self, _rows: u64) {}

    /// The current row task is done.
    fn rows_finished(&self) {}

    /// The run is over, successfully or not.
    fn run_finished(&self, _completed: usize, _skipped: usize) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl PipelineProgress for NullProgress {}

/// A shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn PipelineProgress> {
    Arc::new(NullProgress)
}

/// Reports one row task, finishing it when dropped so an error inside the
/// stage still clears the row display.
pub struct RowTask<'a> {
    progress: &'a dyn PipelineProgress,
}

impl<'a> RowTask<'a> {
    #[must_use]
    pub fn start(progress: &'a dyn PipelineProgress, task: &str, total: usize) -> Self {
        progress.rows_started(task, u64::try_from(total).unwrap_or(u64::MAX));
        Self { progress }
    }

    pub fn matched(&self, rows: usize) {
        self.progress
            .rows_matched(u64::try_from(rows).unwrap_or(u64::MAX));
    }
}

impl Drop for RowTask<'_> {
    fn drop(&mut self) {
        self.progress.rows_finished();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Recorder;
    use super::*;

    #[test]
    fn row_task_finishes_on_drop() {
        let recorder = Recorder::default();
        {
            let task = RowTask::start(&recorder, "2018", 5);
            task.matched(3);
            task.matched(2);
        }
        assert_eq!(
            recorder.events(),
            vec!["rows 2018 5", "+3", "+2", "rows done"]
        );
    }

    #[test]
    fn null_progress_accepts_everything() {
        let progress = null_progress();
        progress.run_started(3);
        progress.rows_matched(10);
        progress.run_finished(3, 0);
    }
}
