//! Per-run task bookkeeping.
//!
//! Every task spawned for a run (intake, workers, merge relays and
//! coordinators, drain) goes through [`RunContext::spawn`], which attaches the
//! run's tracing span, captures panics and counts the task as settled once it
//! has returned or its panic has been recorded.

use futures::FutureExt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, error, info_span};

/// Run id used for tasks spawned outside of a pipeline run.
pub(crate) const DETACHED_RUN_ID: u64 = 0;

#[derive(Clone)]
pub(crate) struct RunContext {
  run_id: u64,
  capacity: NonZeroUsize,
  span: Span,
  panicked: Arc<Mutex<Vec<String>>>,
  spawned: Arc<AtomicUsize>,
  settled: Arc<watch::Sender<usize>>,
}

impl RunContext {
  pub(crate) fn new(pipeline: &str, run_id: u64, capacity: NonZeroUsize) -> Self {
    Self::with_span(
      run_id,
      capacity,
      info_span!("pipeline_run", pipeline = %pipeline, run_id),
    )
  }

  /// Context for standalone utilities such as `merge_streams`, inheriting
  /// whatever span the caller is in.
  pub(crate) fn detached(capacity: NonZeroUsize) -> Self {
    Self::with_span(DETACHED_RUN_ID, capacity, Span::current())
  }

  fn with_span(run_id: u64, capacity: NonZeroUsize, span: Span) -> Self {
    Self {
      run_id,
      capacity,
      span,
      panicked: Arc::new(Mutex::new(Vec::new())),
      spawned: Arc::new(AtomicUsize::new(0)),
      settled: Arc::new(watch::channel(0).0),
    }
  }

  pub(crate) fn run_id(&self) -> u64 {
    self.run_id
  }

  pub(crate) fn capacity(&self) -> NonZeroUsize {
    self.capacity
  }

  pub(crate) fn span(&self) -> &Span {
    &self.span
  }

  /// Spawns a task belonging to this run.
  ///
  /// Unwinding out of `task` drops the state it owns, senders included, so
  /// downstream may see its stream close before the panic is recorded here.
  /// Readers of [`panicked_tasks`](Self::panicked_tasks) must first wait for
  /// the task to [settle](Self::settled).
  pub(crate) fn spawn<F>(&self, label: String, task: F) -> JoinHandle<()>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let panicked = Arc::clone(&self.panicked);
    let settled = Arc::clone(&self.settled);
    let run_id = self.run_id;
    self.spawned.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(
      async move {
        if AssertUnwindSafe(task).catch_unwind().await.is_err() {
          error!(run_id, task = %label, "pipeline task panicked");
          panicked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(label);
        }
        settled.send_modify(|count| *count += 1);
      }
      .instrument(self.span.clone()),
    )
  }

  /// Number of tasks spawned through this context so far.
  pub(crate) fn spawned_tasks(&self) -> usize {
    self.spawned.load(Ordering::SeqCst)
  }

  /// Waits until at least `tasks` spawned tasks have settled.
  pub(crate) async fn settled(&self, tasks: usize) {
    let mut settled = self.settled.subscribe();
    // The sender lives in `self`, so this cannot observe a closed channel.
    let _ = settled.wait_for(|count| *count >= tasks).await;
  }

  /// Labels of every task that has panicked so far.
  pub(crate) fn panicked_tasks(&self) -> Vec<String> {
    self
      .panicked
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}
