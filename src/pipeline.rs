//! # Pipeline
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Building it (adding
//! stages) and running it are separate steps: [`Pipeline::run`] wires a fresh
//! set of streams and workers from the given input through every stage, in
//! the order they were added, starts a drain on the last stage's output and
//! returns a [`Completion`] right away.
//!
//! A run ends when the caller closes the input. Stages then finish one after
//! the other from first to last, the drain consumes whatever is left, and
//! the completion signal fires. There is no other way to stop a run.
//!
//! The same pipeline can be run any number of times, concurrently. Runs
//! share only the stage descriptors (and through them the transforms); every
//! stream and worker belongs to exactly one run.
//!
//! Running requires a tokio runtime: every worker, relay, intake and drain is
//! a tokio task.
//!
//! ## Example
//!
//! ```rust
//! use streamweave_pipeline::pipeline::Pipeline;
//! use streamweave_pipeline::stream::feed;
//! use std::num::NonZeroUsize;
//!
//! # async fn example() -> Result<(), streamweave_pipeline::error::PipelineError> {
//! let mut pipeline = Pipeline::new();
//! pipeline
//!   .add_stage(|x: i64| Some(x + 1))
//!   .add_stage_with_fan_out(|x: i64| Some(x * x), 4);
//!
//! let input = feed(1..=9, NonZeroUsize::new(16).unwrap());
//! let report = pipeline.run(input).wait().await?;
//! assert_eq!(report.items_drained, 9);
//! # Ok(())
//! # }
//! ```

use crate::completion::{Completion, CompletionHandle, RunReport, completion_pair};
use crate::config::PipelineConfig;
use crate::run::RunContext;
use crate::stage::Stage;
use crate::stream;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// An ordered sequence of stages that can be run against input streams.
pub struct Pipeline<T> {
  config: PipelineConfig,
  stages: Vec<Stage<T>>,
  /// Shared with clones so run ids stay unique per pipeline family.
  next_run_id: Arc<AtomicU64>,
}

impl<T> Pipeline<T>
where
  T: Send + 'static,
{
  /// Creates an empty pipeline with the default configuration.
  pub fn new() -> Self {
    Self::with_config(PipelineConfig::default())
  }

  /// Creates an empty pipeline with the given configuration.
  pub fn with_config(config: PipelineConfig) -> Self {
    Self {
      config,
      stages: Vec::new(),
      next_run_id: Arc::new(AtomicU64::new(1)),
    }
  }

  /// Appends a stage with fan-out 1.
  pub fn add_stage<F>(&mut self, f: F) -> &mut Self
  where
    F: Fn(T) -> Option<T> + Send + Sync + 'static,
  {
    self.push_stage(Stage::new(f))
  }

  /// Appends a stage processed by `fan_size` concurrent workers.
  ///
  /// Items passing through a stage with `fan_size > 1` may leave it in a
  /// different order than they entered. A `fan_size` of 0 yields a stage
  /// that discards its input; see the [`stage`](crate::stage) module.
  pub fn add_stage_with_fan_out<F>(&mut self, f: F, fan_size: usize) -> &mut Self
  where
    F: Fn(T) -> Option<T> + Send + Sync + 'static,
  {
    self.push_stage(Stage::new(f).with_fan_out(fan_size))
  }

  /// Appends a stage with fan-out 1 backed by an async closure.
  pub fn add_async_stage<F, Fut>(&mut self, f: F) -> &mut Self
  where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
  {
    self.push_stage(Stage::new_async(f))
  }

  /// Appends an async stage processed by `fan_size` concurrent workers.
  pub fn add_async_stage_with_fan_out<F, Fut>(&mut self, f: F, fan_size: usize) -> &mut Self
  where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
  {
    self.push_stage(Stage::new_async(f).with_fan_out(fan_size))
  }

  /// Appends a raw stream-to-stream stage.
  ///
  /// `f` is called once per run with the upstream receiver and must return
  /// the receiver the next stage reads from. It is responsible for closing
  /// that stream once it is done with its input.
  pub fn add_raw_stage<F>(&mut self, f: F) -> &mut Self
  where
    F: Fn(mpsc::Receiver<T>) -> mpsc::Receiver<T> + Send + Sync + 'static,
  {
    self.push_stage(Stage::raw(f))
  }

  /// Appends a fully configured stage.
  pub fn push_stage(&mut self, stage: Stage<T>) -> &mut Self {
    self.stages.push(stage);
    self
  }

  /// Starts a run over `input` and returns its completion signal.
  ///
  /// Does not block. The signal fires once `input` has been closed by its
  /// producer, every stage has closed its output, every task of the run has
  /// returned and the drain has discarded everything the last stage
  /// produced. If the first stage stops reading early (fan-out 0, or a raw
  /// stage that drops its input) the intake drops `input` and the run
  /// finishes without waiting for the producer.
  pub fn run(&self, input: mpsc::Receiver<T>) -> Completion {
    let ctx = self.start_run();
    let started_at = Utc::now();
    let (handle, completion) = completion_pair(ctx.run_id());

    let intake = Self::spawn_intake(&ctx, input, handle.clone());
    let mut output = self.wire_stages(&ctx, intake);
    let wired_tasks = ctx.spawned_tasks();

    let drain_ctx = ctx.clone();
    ctx.spawn("drain".to_string(), async move {
      let mut items_drained = 0u64;
      while output.recv().await.is_some() {
        items_drained += 1;
      }
      // A panicking task closes its output before its panic is recorded.
      drain_ctx.settled(wired_tasks).await;
      let panicked_tasks = drain_ctx.panicked_tasks();
      debug!(items_drained, panicked = panicked_tasks.len(), "run drained");
      handle.finish(RunReport {
        run_id: drain_ctx.run_id(),
        items_drained,
        panicked_tasks,
        started_at,
        finished_at: Utc::now(),
      });
    });
    completion
  }

  /// Wires a run over `input` without a drain and returns the last stage's
  /// output.
  ///
  /// The caller consumes the returned stream; it closes once `input` has
  /// closed and every stage has finished. For an empty pipeline `input` is
  /// returned unchanged. Panics in run tasks are logged but, lacking a
  /// completion signal, not reported otherwise.
  pub fn connect(&self, input: mpsc::Receiver<T>) -> mpsc::Receiver<T> {
    let ctx = self.start_run();
    self.wire_stages(&ctx, input)
  }

  fn start_run(&self) -> RunContext {
    let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
    let ctx = RunContext::new(
      self.config.display_name(),
      run_id,
      self.config.channel_capacity(),
    );
    ctx.span().in_scope(|| {
      debug!(stages = self.stages.len(), "starting pipeline run");
    });
    ctx
  }

  /// Forwards the caller's input into the first stage and marks the run as
  /// draining once the input closes or the first stage stops reading.
  fn spawn_intake(
    ctx: &RunContext,
    mut input: mpsc::Receiver<T>,
    handle: CompletionHandle,
  ) -> mpsc::Receiver<T> {
    let (tx, rx) = stream::channel(ctx.capacity());
    ctx.spawn("intake".to_string(), async move {
      let mut received = 0u64;
      loop {
        let item = tokio::select! {
          item = input.recv() => item,
          () = tx.closed() => {
            debug!(received, "first stage closed its input, intake stopping");
            break;
          }
        };
        let Some(item) = item else {
          break;
        };
        if tx.send(item).await.is_err() {
          debug!(received, "first stage closed its input, intake stopping");
          break;
        }
        received += 1;
      }
      debug!(received, "intake finished, run draining");
      handle.mark_draining();
    });
    rx
  }

  fn wire_stages(&self, ctx: &RunContext, input: mpsc::Receiver<T>) -> mpsc::Receiver<T> {
    self
      .stages
      .iter()
      .enumerate()
      .fold(input, |upstream, (index, stage)| {
        let label = stage.label(index);
        ctx.span().in_scope(|| {
          debug!(stage = %label, fan_out = ?stage.fan_out(), "wiring stage");
        });
        stage.wire(ctx, &label, upstream)
      })
  }
}

impl<T> Pipeline<T> {
  /// Returns the pipeline configuration.
  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// Returns the configured stages in run order.
  pub fn stages(&self) -> &[Stage<T>] {
    &self.stages
  }

  /// Number of configured stages.
  pub fn len(&self) -> usize {
    self.stages.len()
  }

  /// Returns `true` if no stage has been added.
  pub fn is_empty(&self) -> bool {
    self.stages.is_empty()
  }
}

impl<T> Default for Pipeline<T>
where
  T: Send + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Clone for Pipeline<T> {
  fn clone(&self) -> Self {
    Self {
      config: self.config.clone(),
      stages: self.stages.clone(),
      next_run_id: Arc::clone(&self.next_run_id),
    }
  }
}

impl<T> std::fmt::Debug for Pipeline<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("config", &self.config)
      .field("stages", &self.stages)
      .finish()
  }
}
