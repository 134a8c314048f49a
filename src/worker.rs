//! # Worker
//!
//! A worker is one task applying a [`Transform`] to every item of its input
//! stream, in the order it reads them, forwarding `Some` results and dropping
//! `None` results. Its output stream closes once the input is closed and
//! drained, never earlier.
//!
//! Several workers can read the same [`SharedReceiver`]; that is how a stage
//! fans out. A slow or stuck transform only holds up its own worker.
//!
//! If the consumer of the output goes away, the worker stops reading and
//! exits, dropping its handle on the input.

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::run::RunContext;
use crate::stream::{self, SharedReceiver};
use crate::transform::Transform;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Starts a standalone worker and returns its output stream.
///
/// Must be called from inside a tokio runtime.
///
/// # Arguments
///
/// * `input` - The stream to read from; a plain receiver or a shared one.
/// * `transform` - The transform applied to every item.
/// * `capacity` - Capacity of the output stream.
pub fn spawn_worker<T>(
  input: impl Into<SharedReceiver<T>>,
  transform: Arc<dyn Transform<T>>,
  capacity: NonZeroUsize,
) -> mpsc::Receiver<T>
where
  T: Send + 'static,
{
  let ctx = RunContext::detached(capacity);
  spawn_in(&ctx, "worker".to_string(), input.into(), transform)
}

/// Starts a worker with the default channel capacity.
pub fn spawn_default_worker<T>(
  input: impl Into<SharedReceiver<T>>,
  transform: Arc<dyn Transform<T>>,
) -> mpsc::Receiver<T>
where
  T: Send + 'static,
{
  spawn_worker(input, transform, DEFAULT_CHANNEL_CAPACITY)
}

pub(crate) fn spawn_in<T>(
  ctx: &RunContext,
  label: String,
  input: SharedReceiver<T>,
  transform: Arc<dyn Transform<T>>,
) -> mpsc::Receiver<T>
where
  T: Send + 'static,
{
  let (tx, rx) = stream::channel(ctx.capacity());
  ctx.spawn(label.clone(), async move {
    let mut forwarded = 0u64;
    let mut filtered = 0u64;
    loop {
      let item = tokio::select! {
        item = input.recv() => item,
        () = tx.closed() => {
          debug!(worker = %label, "output dropped, worker stopping");
          break;
        }
      };
      let Some(item) = item else {
        break;
      };
      match transform.apply(item).await {
        Some(output) => {
          if tx.send(output).await.is_err() {
            debug!(worker = %label, "output dropped, worker stopping");
            break;
          }
          forwarded += 1;
        }
        None => filtered += 1,
      }
    }
    trace!(worker = %label, forwarded, filtered, "worker finished");
  });
  rx
}
