//! # Stages
//!
//! A stage is one step of a pipeline. There are two kinds:
//!
//! - **Fanned stages** pair a [`Transform`] with a fan-out size `F`. Each run
//!   starts `F` workers that all read the upstream stream, first ready first
//!   served, and merges their outputs into one downstream stream. With
//!   `F = 1` the single worker's output is used directly. Whenever `F > 1`
//!   the relative order of items is not preserved.
//! - **Raw stages** hand the upstream receiver to a user function and use
//!   whatever receiver it returns. They are the extension point for steps the
//!   per-item model cannot express, such as batching.
//!
//! ## Fan-out of zero
//!
//! A fan-out of zero is accepted but almost certainly a mistake, so it is
//! logged when configured. At run time such a stage drops its upstream
//! receiver and yields an already-closed stream: upstream producers see their
//! sends fail and stop, nothing reaches later stages, and the run still
//! completes.
//!
//! ## Example
//!
//! ```rust
//! use streamweave_pipeline::stage::Stage;
//!
//! let square = Stage::new(|x: u64| Some(x * x))
//!   .with_name("square".to_string())
//!   .with_fan_out(4);
//! assert_eq!(square.fan_out(), Some(4));
//! ```

use crate::merge;
use crate::run::RunContext;
use crate::stream::{self, SharedReceiver};
use crate::transform::{Transform, async_transform_fn, transform_fn};
use crate::worker;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A stream-to-stream function used by raw stages.
pub type RawStageFn<T> = Arc<dyn Fn(mpsc::Receiver<T>) -> mpsc::Receiver<T> + Send + Sync>;

enum StageKind<T> {
  Fanned {
    transform: Arc<dyn Transform<T>>,
    fan_out: usize,
  },
  Raw(RawStageFn<T>),
}

/// One configured pipeline step.
pub struct Stage<T> {
  name: Option<String>,
  kind: StageKind<T>,
}

impl<T> Stage<T>
where
  T: Send + 'static,
{
  /// Creates a stage with fan-out 1 from a synchronous closure.
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(T) -> Option<T> + Send + Sync + 'static,
  {
    Self::from_transform(transform_fn::<T, F>(f))
  }

  /// Creates a stage with fan-out 1 from an async closure.
  pub fn new_async<F, Fut>(f: F) -> Self
  where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
  {
    Self::from_transform(async_transform_fn::<T, F, Fut>(f))
  }

  /// Creates a stage with fan-out 1 from any [`Transform`].
  pub fn from_transform<X>(transform: X) -> Self
  where
    X: Transform<T> + 'static,
  {
    Self::from_shared_transform(Arc::new(transform))
  }

  /// Creates a stage with fan-out 1 from a transform that is already shared.
  pub fn from_shared_transform(transform: Arc<dyn Transform<T>>) -> Self {
    Self {
      name: None,
      kind: StageKind::Fanned {
        transform,
        fan_out: 1,
      },
    }
  }

  /// Creates a raw stage from a stream-to-stream function.
  ///
  /// The function is called once per run with that run's upstream receiver.
  /// It owns the closing of the stream it returns.
  pub fn raw<F>(f: F) -> Self
  where
    F: Fn(mpsc::Receiver<T>) -> mpsc::Receiver<T> + Send + Sync + 'static,
  {
    Self {
      name: None,
      kind: StageKind::Raw(Arc::new(f)),
    }
  }

  /// Sets how many workers each run starts for this stage.
  ///
  /// Has no effect on raw stages.
  ///
  /// # Arguments
  ///
  /// * `fan_out` - Number of concurrent workers. Should be at least 1.
  pub fn with_fan_out(mut self, fan_out: usize) -> Self {
    match &mut self.kind {
      StageKind::Fanned { fan_out: current, .. } => {
        if fan_out == 0 {
          warn!(
            stage = self.name.as_deref().unwrap_or("<unnamed>"),
            "stage configured with fan-out 0; it will discard all input"
          );
        }
        *current = fan_out;
      }
      StageKind::Raw(_) => {
        debug!(fan_out, "fan-out ignored for raw stage");
      }
    }
    self
  }

  /// Sets the name used for this stage in logs and task labels.
  pub fn with_name(mut self, name: String) -> Self {
    self.name = Some(name);
    self
  }
}

impl<T> Stage<T> {
  /// Returns the name, if set.
  pub fn name(&self) -> Option<String> {
    self.name.clone()
  }

  /// Returns the fan-out size, or `None` for raw stages.
  pub fn fan_out(&self) -> Option<usize> {
    match &self.kind {
      StageKind::Fanned { fan_out, .. } => Some(*fan_out),
      StageKind::Raw(_) => None,
    }
  }

  /// Returns `true` for raw stages.
  pub fn is_raw(&self) -> bool {
    matches!(self.kind, StageKind::Raw(_))
  }

  /// Label used for this stage's tasks: its name, or its position.
  pub(crate) fn label(&self, index: usize) -> String {
    self
      .name
      .clone()
      .unwrap_or_else(|| format!("stage-{}", index))
  }
}

impl<T> Stage<T>
where
  T: Send + 'static,
{
  /// Wires this stage for one run and returns its downstream stream.
  pub(crate) fn wire(
    &self,
    ctx: &RunContext,
    label: &str,
    input: mpsc::Receiver<T>,
  ) -> mpsc::Receiver<T> {
    match &self.kind {
      StageKind::Fanned { fan_out: 0, .. } => {
        debug!(stage = %label, "fan-out 0, dropping stage input");
        drop(input);
        let (_tx, rx) = stream::channel(ctx.capacity());
        rx
      }
      StageKind::Fanned {
        transform,
        fan_out: 1,
      } => worker::spawn_in(
        ctx,
        format!("{}/worker-0", label),
        SharedReceiver::new(input),
        Arc::clone(transform),
      ),
      StageKind::Fanned { transform, fan_out } => {
        let shared = SharedReceiver::new(input);
        let outputs = (0..*fan_out)
          .map(|index| {
            worker::spawn_in(
              ctx,
              format!("{}/worker-{}", label, index),
              shared.clone(),
              Arc::clone(transform),
            )
          })
          .collect();
        merge::merge_in(ctx, label, outputs)
      }
      StageKind::Raw(stage_fn) => stage_fn(input),
    }
  }
}

impl<T> Clone for Stage<T> {
  fn clone(&self) -> Self {
    let kind = match &self.kind {
      StageKind::Fanned { transform, fan_out } => StageKind::Fanned {
        transform: Arc::clone(transform),
        fan_out: *fan_out,
      },
      StageKind::Raw(stage_fn) => StageKind::Raw(Arc::clone(stage_fn)),
    };
    Self {
      name: self.name.clone(),
      kind,
    }
  }
}

impl<T> fmt::Debug for Stage<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      StageKind::Fanned { fan_out, .. } => f
        .debug_struct("Stage")
        .field("name", &self.name)
        .field("fan_out", fan_out)
        .finish(),
      StageKind::Raw(_) => f
        .debug_struct("Stage")
        .field("name", &self.name)
        .field("raw", &true)
        .finish(),
    }
  }
}
