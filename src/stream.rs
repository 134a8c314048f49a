//! # Streams
//!
//! Streams are bounded tokio `mpsc` channels. The producer side is an
//! [`mpsc::Sender`], the consumer side an [`mpsc::Receiver`]. A stream is
//! closed once every sender clone has been dropped; consumers then receive
//! the remaining buffered items followed by `None`.
//!
//! A plain receiver has exactly one consumer. Fanned-out stages need several
//! workers pulling from the same upstream, which is what [`SharedReceiver`]
//! provides: whichever worker asks first gets the next item.
//!
//! The feeding helpers spawn a task that owns the sender and closes the
//! stream when the source is exhausted, so they must be called from inside a
//! tokio runtime.

use futures::{Stream, StreamExt};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

/// Creates a bounded stream with the given capacity.
pub fn channel<T>(capacity: NonZeroUsize) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
  mpsc::channel(capacity.get())
}

/// A receiver that several consumers can pull from concurrently.
///
/// Each call to [`recv`](Self::recv) hands out one item to exactly one
/// caller. Waiting callers are served in the order they started waiting.
pub struct SharedReceiver<T> {
  inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> SharedReceiver<T> {
  /// Wraps a receiver so it can be shared between consumers.
  pub fn new(receiver: mpsc::Receiver<T>) -> Self {
    Self {
      inner: Arc::new(Mutex::new(receiver)),
    }
  }

  /// Receives the next item, or `None` once the stream is closed and drained.
  pub async fn recv(&self) -> Option<T> {
    let mut receiver = self.inner.lock().await;
    receiver.recv().await
  }

  /// Number of consumers currently holding a handle to this receiver.
  pub fn consumer_count(&self) -> usize {
    Arc::strong_count(&self.inner)
  }
}

impl<T> Clone for SharedReceiver<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T> From<mpsc::Receiver<T>> for SharedReceiver<T> {
  fn from(receiver: mpsc::Receiver<T>) -> Self {
    Self::new(receiver)
  }
}

/// Creates a stream that yields every item of `items` and then closes.
///
/// # Arguments
///
/// * `items` - The items to send, in order.
/// * `capacity` - Capacity of the created stream.
pub fn feed<I>(items: I, capacity: NonZeroUsize) -> mpsc::Receiver<I::Item>
where
  I: IntoIterator + Send + 'static,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  from_stream(futures::stream::iter(items), capacity)
}

/// Creates a stream fed by an async [`Stream`], closing it when the source ends.
///
/// Feeding stops early if the returned receiver is dropped.
///
/// # Arguments
///
/// * `source` - The stream to forward.
/// * `capacity` - Capacity of the created stream.
pub fn from_stream<S>(source: S, capacity: NonZeroUsize) -> mpsc::Receiver<S::Item>
where
  S: Stream + Send + 'static,
  S::Item: Send + 'static,
{
  let (tx, rx) = channel(capacity);
  tokio::spawn(async move {
    let mut source = Box::pin(source);
    let mut sent = 0u64;
    while let Some(item) = source.next().await {
      if tx.send(item).await.is_err() {
        trace!(sent, "stream feeder stopped: receiver dropped");
        return;
      }
      sent += 1;
    }
    trace!(sent, "stream feeder exhausted");
  });
  rx
}

/// Adapts a receiver into a [`Stream`], for consumers that prefer stream
/// combinators over `recv` loops.
pub fn into_stream<T>(receiver: mpsc::Receiver<T>) -> ReceiverStream<T> {
  ReceiverStream::new(receiver)
}
