//! # Completion Signal
//!
//! [`Pipeline::run`](crate::pipeline::Pipeline::run) returns immediately with
//! a [`Completion`]: a one-shot, read-many signal tied to that run. The run
//! moves through three states, each entered exactly once:
//!
//! - [`RunState::Pending`]: streams are wired and workers started.
//! - [`RunState::Draining`]: the caller closed the input, or the first stage
//!   stopped reading it; stages are closing their outputs from the first to
//!   the last.
//! - [`RunState::Done`]: the drain consumed the last stage's output.
//!
//! `Completion` is cheap to clone; every clone observes the same run.
//!
//! ## Example
//!
//! ```rust
//! use streamweave_pipeline::pipeline::Pipeline;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), streamweave_pipeline::error::PipelineError> {
//! let mut pipeline = Pipeline::new();
//! pipeline.add_stage(|x: i32| Some(x + 1));
//!
//! let (tx, rx) = mpsc::channel(8);
//! let completion = pipeline.run(rx);
//! tx.send(1).await.ok();
//! drop(tx);
//!
//! let report = completion.wait().await?;
//! assert_eq!(report.items_drained, 1);
//! # Ok(())
//! # }
//! ```

use crate::error::PipelineError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
  /// Streams are wired and the input is still open.
  Pending,
  /// The intake stopped forwarding; stages are finishing.
  ///
  /// Usually this means the caller closed the input. It is also entered when
  /// the first stage stops reading (fan-out 0, or a raw stage that drops its
  /// receiver). The intake then drops the caller's input, so the run can
  /// reach `Done` while the producer still holds its sender; its next send
  /// fails.
  Draining,
  /// The drain finished. Terminal.
  Done(RunReport),
}

impl RunState {
  /// Returns `true` once the run has finished.
  pub fn is_done(&self) -> bool {
    matches!(self, RunState::Done(_))
  }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
  /// Identifier of the run, unique per pipeline.
  pub run_id: u64,
  /// Number of items the drain pulled from the last stage and discarded.
  pub items_drained: u64,
  /// Labels of run tasks that panicked, empty on a clean run.
  pub panicked_tasks: Vec<String>,
  /// When the run was started.
  pub started_at: DateTime<Utc>,
  /// When the drain finished.
  pub finished_at: DateTime<Utc>,
}

impl RunReport {
  /// Wall-clock time between starting the run and finishing the drain.
  pub fn elapsed(&self) -> TimeDelta {
    self.finished_at - self.started_at
  }

  fn into_result(self) -> Result<RunReport, PipelineError> {
    if self.panicked_tasks.is_empty() {
      Ok(self)
    } else {
      Err(PipelineError::TaskPanicked {
        run_id: self.run_id,
        tasks: self.panicked_tasks,
      })
    }
  }
}

/// Read side of a run's completion signal.
#[derive(Debug, Clone)]
pub struct Completion {
  run_id: u64,
  state: watch::Receiver<RunState>,
}

impl Completion {
  /// Identifier of the run this signal belongs to.
  pub fn run_id(&self) -> u64 {
    self.run_id
  }

  /// Snapshot of the run's current state.
  pub fn state(&self) -> RunState {
    self.state.borrow().clone()
  }

  /// Returns `true` if the run has already finished.
  pub fn is_done(&self) -> bool {
    self.state.borrow().is_done()
  }

  /// Waits until the run has finished.
  ///
  /// # Errors
  ///
  /// - [`PipelineError::TaskPanicked`] if any task of the run panicked; the
  ///   run still completed but items may be missing.
  /// - [`PipelineError::Abandoned`] if the run's tasks were dropped before
  ///   the drain finished.
  pub async fn wait(&self) -> Result<RunReport, PipelineError> {
    let mut state = self.state.clone();
    let report = match state.wait_for(RunState::is_done).await {
      Ok(done) => match &*done {
        RunState::Done(report) => Some(report.clone()),
        _ => None,
      },
      Err(_) => None,
    };
    match report {
      Some(report) => report.into_result(),
      None => Err(PipelineError::Abandoned {
        run_id: self.run_id,
      }),
    }
  }
}

/// Write side of a run's completion signal, shared by the intake and drain.
#[derive(Debug, Clone)]
pub(crate) struct CompletionHandle {
  state: Arc<watch::Sender<RunState>>,
}

impl CompletionHandle {
  /// Moves the run from `Pending` to `Draining`. Later calls are ignored.
  pub(crate) fn mark_draining(&self) {
    self.state.send_if_modified(|state| {
      if *state == RunState::Pending {
        *state = RunState::Draining;
        true
      } else {
        false
      }
    });
  }

  /// Moves the run to `Done`. Only the first call takes effect.
  pub(crate) fn finish(&self, report: RunReport) {
    self.state.send_if_modified(|state| {
      if state.is_done() {
        false
      } else {
        *state = RunState::Done(report);
        true
      }
    });
  }
}

/// Creates the two halves of a completion signal for run `run_id`.
pub(crate) fn completion_pair(run_id: u64) -> (CompletionHandle, Completion) {
  let (tx, rx) = watch::channel(RunState::Pending);
  (
    CompletionHandle {
      state: Arc::new(tx),
    },
    Completion { run_id, state: rx },
  )
}
