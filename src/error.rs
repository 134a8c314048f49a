//! # Error Types
//!
//! The engine keeps no error taxonomy for transformations: a transform that
//! cannot handle an item returns `None` and the item is dropped like any other
//! filtered item. The errors below describe what can go wrong with a *run*
//! itself and are only ever reported through
//! [`Completion::wait`](crate::completion::Completion::wait).

use thiserror::Error;

/// An error reported when waiting on a pipeline run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
  /// One or more tasks of the run panicked.
  ///
  /// The panicking task closed its output early, so items it had not yet
  /// forwarded are lost. The rest of the run still unwound and drained.
  #[error("run {run_id}: {} task(s) panicked: {}", .tasks.len(), .tasks.join(", "))]
  TaskPanicked {
    /// Identifier of the affected run.
    run_id: u64,
    /// Labels of the tasks that panicked, in the order they were recorded.
    tasks: Vec<String>,
  },
  /// The run was torn down before its drain finished, typically because the
  /// tokio runtime driving it shut down.
  #[error("run {run_id} was abandoned before completing")]
  Abandoned {
    /// Identifier of the affected run.
    run_id: u64,
  },
}

impl PipelineError {
  /// Returns the identifier of the run this error belongs to.
  pub fn run_id(&self) -> u64 {
    match self {
      PipelineError::TaskPanicked { run_id, .. } => *run_id,
      PipelineError::Abandoned { run_id } => *run_id,
    }
  }
}
