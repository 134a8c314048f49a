//! # Error Test Suite

use crate::error::PipelineError;
use std::error::Error;

#[test]
fn test_task_panicked_display_lists_tasks() {
  let error = PipelineError::TaskPanicked {
    run_id: 3,
    tasks: vec!["stage-0/worker-1".to_string(), "drain".to_string()],
  };
  assert_eq!(
    error.to_string(),
    "run 3: 2 task(s) panicked: stage-0/worker-1, drain"
  );
  assert_eq!(error.run_id(), 3);
}

#[test]
fn test_abandoned_display() {
  let error = PipelineError::Abandoned { run_id: 12 };
  assert_eq!(error.to_string(), "run 12 was abandoned before completing");
  assert_eq!(error.run_id(), 12);
}

#[test]
fn test_error_is_std_error() {
  let error: Box<dyn Error + Send + Sync> =
    Box::new(PipelineError::Abandoned { run_id: 1 });
  assert!(error.source().is_none());
}
