//! # Stage Test Suite
//!
//! Tests for stage configuration and per-run wiring.

use crate::run::RunContext;
use crate::stage::Stage;
use crate::stream::feed;
use crate::transform::transform_fn;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn context() -> RunContext {
  RunContext::new("stage_test", 1, NonZeroUsize::new(4).unwrap())
}

async fn collect<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
  timeout(WAIT, async move {
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
      items.push(item);
    }
    items
  })
  .await
  .expect("stage output did not close")
}

#[test]
fn test_stage_defaults_to_fan_out_one() {
  let stage = Stage::new(|x: i32| Some(x));
  assert_eq!(stage.fan_out(), Some(1));
  assert_eq!(stage.name(), None);
  assert!(!stage.is_raw());
}

#[test]
fn test_stage_builder_sets_name_and_fan_out() {
  let stage = Stage::new(|x: i32| Some(x))
    .with_name("identity".to_string())
    .with_fan_out(8);
  assert_eq!(stage.name(), Some("identity".to_string()));
  assert_eq!(stage.fan_out(), Some(8));
  assert_eq!(stage.label(3), "identity");
  assert!(format!("{:?}", stage).contains("fan_out: 8"));
}

#[test]
fn test_unnamed_stage_label_uses_position() {
  let stage = Stage::new(|x: i32| Some(x));
  assert_eq!(stage.label(2), "stage-2");
}

#[test]
fn test_raw_stage_ignores_fan_out() {
  let stage = Stage::raw(|rx: mpsc::Receiver<i32>| rx).with_fan_out(4);
  assert!(stage.is_raw());
  assert_eq!(stage.fan_out(), None);
}

#[test]
fn test_cloned_stage_shares_transform() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&calls);
  let stage = Stage::from_transform(transform_fn(move |x: i32| {
    counter.fetch_add(1, Ordering::SeqCst);
    Some(x)
  }))
  .with_fan_out(2);
  let cloned = stage.clone();
  assert_eq!(cloned.fan_out(), Some(2));
  // The closure (and its captured counter) is shared, not duplicated.
  assert_eq!(Arc::strong_count(&calls), 2);
}

#[tokio::test]
async fn test_single_worker_stage_preserves_order() {
  let stage = Stage::new(|x: u32| Some(x * 10));
  let output = stage.wire(&context(), "times_ten", feed(1..=5u32, NonZeroUsize::MIN));
  assert_eq!(collect(output).await, vec![10, 20, 30, 40, 50]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fanned_stage_processes_every_item_once() {
  let stage = Stage::new(|x: u32| (x % 3 != 0).then_some(x)).with_fan_out(5);
  let output = stage.wire(&context(), "not_div3", feed(0..300u32, NonZeroUsize::MIN));

  let mut items = collect(output).await;
  items.sort();
  let expected: Vec<u32> = (0..300u32).filter(|x| x % 3 != 0).collect();
  assert_eq!(items, expected);
}

#[tokio::test]
async fn test_async_stage_wires_like_sync_stage() {
  let stage = Stage::new_async(|x: i64| async move { Some(-x) }).with_fan_out(2);
  let output = stage.wire(&context(), "negate", feed(vec![1i64, 2, 3], NonZeroUsize::MIN));

  let mut items = collect(output).await;
  items.sort();
  assert_eq!(items, vec![-3, -2, -1]);
}

#[tokio::test]
async fn test_zero_fan_out_stage_closes_immediately_and_drops_input() {
  let stage = Stage::new(|x: i32| Some(x)).with_fan_out(0);
  let (tx, rx) = mpsc::channel(4);

  let mut output = stage.wire(&context(), "nothing", rx);
  assert_eq!(timeout(WAIT, output.recv()).await.unwrap(), None);
  assert!(tx.is_closed());
  assert!(tx.send(1).await.is_err());
}

#[tokio::test]
async fn test_raw_stage_receives_upstream_and_returns_downstream() {
  let stage = Stage::raw(|mut rx: mpsc::Receiver<i32>| {
    let (tx, out) = mpsc::channel(4);
    tokio::spawn(async move {
      let mut total = 0;
      while let Some(x) = rx.recv().await {
        total += x;
      }
      let _ = tx.send(total).await;
    });
    out
  });

  let output = stage.wire(&context(), "sum", feed(1..=4, NonZeroUsize::MIN));
  assert_eq!(collect(output).await, vec![10]);
}
