//! # Transform Trait
//!
//! A transform is the user-supplied callback a stage applies to each item.
//! It maps one item to either a replacement item (`Some`) or nothing
//! (`None`), in which case the item is filtered out and nothing is forwarded.
//!
//! Transforms are shared by every worker of a stage and by every run of the
//! pipeline, so they must be `Send + Sync`. A transform that keeps mutable
//! state has to synchronize it itself; the engine only guarantees that a
//! single worker applies it to one item at a time.
//!
//! ## Example
//!
//! ```rust
//! use streamweave_pipeline::transform::{Transform, transform_fn, async_transform_fn};
//!
//! # async fn example() {
//! let even_squares = transform_fn(|x: i32| (x % 2 == 0).then(|| x * x));
//! assert_eq!(even_squares.apply(4).await, Some(16));
//! assert_eq!(even_squares.apply(3).await, None);
//!
//! let delayed = async_transform_fn(|x: i32| async move { Some(x + 1) });
//! assert_eq!(delayed.apply(1).await, Some(2));
//! # }
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

/// A per-item transformation applied by pipeline workers.
#[async_trait]
pub trait Transform<T>: Send + Sync {
  /// Transforms one item. Returning `None` drops the item.
  async fn apply(&self, item: T) -> Option<T>;
}

/// A [`Transform`] backed by a synchronous closure.
///
/// The closure runs directly on the worker task. Closures that block for
/// long stretches hold a runtime thread for that time; wrap such work with
/// [`async_transform_fn`] and `tokio::task::spawn_blocking` instead.
pub struct FnTransform<F> {
  f: F,
}

/// Wraps a synchronous closure as a [`Transform`].
pub fn transform_fn<T, F>(f: F) -> FnTransform<F>
where
  F: Fn(T) -> Option<T> + Send + Sync,
{
  FnTransform { f }
}

#[async_trait]
impl<T, F> Transform<T> for FnTransform<F>
where
  T: Send + 'static,
  F: Fn(T) -> Option<T> + Send + Sync,
{
  async fn apply(&self, item: T) -> Option<T> {
    (self.f)(item)
  }
}

/// A [`Transform`] backed by a closure returning a future.
pub struct AsyncFnTransform<F, Fut> {
  f: F,
  _future: PhantomData<fn() -> Fut>,
}

/// Wraps an async closure as a [`Transform`].
pub fn async_transform_fn<T, F, Fut>(f: F) -> AsyncFnTransform<F, Fut>
where
  F: Fn(T) -> Fut + Send + Sync,
  Fut: Future<Output = Option<T>> + Send + 'static,
{
  AsyncFnTransform {
    f,
    _future: PhantomData,
  }
}

#[async_trait]
impl<T, F, Fut> Transform<T> for AsyncFnTransform<F, Fut>
where
  T: Send + 'static,
  F: Fn(T) -> Fut + Send + Sync,
  Fut: Future<Output = Option<T>> + Send + 'static,
{
  async fn apply(&self, item: T) -> Option<T> {
    (self.f)(item).await
  }
}
