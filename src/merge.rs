//! # Merge
//!
//! Fan-in of several streams into one. Every item of every input reaches the
//! merged output in whatever order items arrive; there is no ordering across
//! inputs.
//!
//! Each input gets its own relay task. A coordinator task owns the original
//! output sender, waits for every relay to finish and only then drops it, so
//! the merged stream closes exactly once, after all inputs have closed and
//! been drained, however many inputs there are and in whatever order they
//! finish. With no inputs the merged stream is closed on return.
//!
//! ## Example
//!
//! ```rust
//! use streamweave_pipeline::merge::merge_streams;
//! use tokio::sync::mpsc;
//!
//! # async fn example() {
//! let (odd_tx, odd_rx) = mpsc::channel(8);
//! let (even_tx, even_rx) = mpsc::channel(8);
//! for n in [1, 3, 5] { odd_tx.send(n).await.ok(); }
//! for n in [2, 4, 6] { even_tx.send(n).await.ok(); }
//! drop((odd_tx, even_tx));
//!
//! let mut merged = merge_streams(vec![odd_rx, even_rx]);
//! let mut items = Vec::new();
//! while let Some(n) = merged.recv().await {
//!   items.push(n);
//! }
//! items.sort();
//! assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
//! # }
//! ```

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::run::RunContext;
use crate::stream;
use futures::future::join_all;
use std::num::NonZeroUsize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Merges `inputs` into a single stream using the default channel capacity.
///
/// Must be called from inside a tokio runtime.
pub fn merge_streams<T>(inputs: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T>
where
  T: Send + 'static,
{
  merge_streams_with_capacity(inputs, DEFAULT_CHANNEL_CAPACITY)
}

/// Like [`merge_streams`] but with a configurable output capacity.
///
/// # Arguments
///
/// * `inputs` - The streams to merge. May be empty.
/// * `capacity` - Capacity of the merged stream.
pub fn merge_streams_with_capacity<T>(
  inputs: Vec<mpsc::Receiver<T>>,
  capacity: NonZeroUsize,
) -> mpsc::Receiver<T>
where
  T: Send + 'static,
{
  let ctx = RunContext::detached(capacity);
  merge_in(&ctx, "merge", inputs)
}

pub(crate) fn merge_in<T>(
  ctx: &RunContext,
  label: &str,
  inputs: Vec<mpsc::Receiver<T>>,
) -> mpsc::Receiver<T>
where
  T: Send + 'static,
{
  let (tx, rx) = stream::channel(ctx.capacity());
  if inputs.is_empty() {
    trace!(merge = %label, "no inputs, merged stream closed");
    return rx;
  }

  let relays: Vec<_> = inputs
    .into_iter()
    .enumerate()
    .map(|(index, mut input)| {
      let tx = tx.clone();
      let relay = format!("{}/relay-{}", label, index);
      ctx.spawn(relay.clone(), async move {
        let mut relayed = 0u64;
        while let Some(item) = input.recv().await {
          if tx.send(item).await.is_err() {
            debug!(relay = %relay, "merged output dropped, relay stopping");
            break;
          }
          relayed += 1;
        }
        trace!(relay = %relay, relayed, "relay finished");
      })
    })
    .collect();

  let coordinator = format!("{}/coordinator", label);
  let merge = label.to_string();
  ctx.spawn(coordinator, async move {
    let inputs = relays.len();
    // Relay panics are already recorded by the run context.
    join_all(relays).await;
    trace!(merge = %merge, inputs, "all inputs drained, closing merged stream");
    drop(tx);
  });
  rx
}
