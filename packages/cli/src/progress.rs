//! `indicatif`-backed progress bars and the terminal logger.
//!
//! [`BarProgress`] renders [`PipelineProgress`] events as one bar counting
//! stages plus a transient bar for the row-heavy stages, and
//! `indicatif-log-bridge` suspends `log::info!` output while bars redraw.

use std::sync::{Arc, Mutex, PoisonError};

use crash_weather_pipeline::PipelineProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Stage and row bars drawn on a shared [`MultiProgress`].
pub struct BarProgress {
    multi: MultiProgress,
    stages: ProgressBar,
    rows: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    #[must_use]
    pub fn new(multi: &MultiProgress) -> Arc<Self> {
        let stages = multi.add(ProgressBar::new(0));
        stages.set_style(
            ProgressStyle::with_template(
                "{msg:>20} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );

        Arc::new(Self {
            multi: multi.clone(),
            stages,
            rows: Mutex::new(None),
        })
    }

    fn with_rows(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rows);
    }
}

impl PipelineProgress for BarProgress {
    fn run_started(&self, stages: usize) {
        self.stages
            .set_length(u64::try_from(stages).unwrap_or(u64::MAX));
        self.stages.set_position(0);
    }

    fn stage_started(&self, stage: &str) {
        self.stages.set_message(stage.to_string());
    }

    fn stage_finished(&self, _stage: &str, _ran: bool) {
        self.stages.inc(1);
    }

    fn rows_started(&self, task: &str, total: u64) {
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(
                "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_message(task.to_string());

        self.with_rows(|rows| {
            if let Some(previous) = rows.replace(bar) {
                previous.finish_and_clear();
            }
        });
    }

    fn rows_matched(&self, rows: u64) {
        self.with_rows(|bar| {
            if let Some(bar) = bar {
                bar.inc(rows);
            }
        });
    }

    fn rows_finished(&self) {
        self.with_rows(|rows| {
            if let Some(bar) = rows.take() {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
        });
    }

    fn run_finished(&self, completed: usize, skipped: usize) {
        self.rows_finished();
        self.stages
            .finish_with_message(format!("{completed} stage(s) run, {skipped} skipped"));
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already set in tests

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn stage_bar_counts_finished_stages() {
        let progress = BarProgress::new(&hidden());
        progress.run_started(3);
        progress.stage_started("preprocess_weather");
        progress.stage_finished("preprocess_weather", true);
        progress.stage_started("match_crashes_2018");
        progress.stage_finished("match_crashes_2018", false);

        assert_eq!(progress.stages.length(), Some(3));
        assert_eq!(progress.stages.position(), 2);
        assert_eq!(progress.stages.message(), "match_crashes_2018");
    }

    #[test]
    fn row_bar_exists_only_during_a_task() {
        let progress = BarProgress::new(&hidden());
        progress.rows_started("matching 2018", 10);
        progress.rows_matched(4);

        {
            let rows = progress.rows.lock().unwrap();
            let bar = rows.as_ref().unwrap();
            assert_eq!(bar.position(), 4);
            assert_eq!(bar.length(), Some(10));
        }

        progress.rows_finished();
        assert!(progress.rows.lock().unwrap().is_none());

        progress.rows_matched(1);
        progress.run_finished(1, 0);
        assert!(progress.stages.is_finished());
    }
}
