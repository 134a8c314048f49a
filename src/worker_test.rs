//! # Worker Test Suite

use crate::merge::merge_streams;
use crate::stream::{SharedReceiver, feed};
use crate::transform::{Transform, async_transform_fn, transform_fn};
use crate::worker::{spawn_default_worker, spawn_worker};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn collect<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
  timeout(WAIT, async move {
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
      items.push(item);
    }
    items
  })
  .await
  .expect("worker output did not close")
}

#[tokio::test]
async fn test_worker_forwards_transformed_items_and_drops_filtered() {
  let transform: Arc<dyn Transform<i32>> =
    Arc::new(transform_fn(|x: i32| (x % 2 == 0).then_some(x * 2)));
  let input = feed(1..=10, NonZeroUsize::MIN);

  let output = spawn_default_worker(input, transform);
  assert_eq!(collect(output).await, vec![4, 8, 12, 16, 20]);
}

#[tokio::test]
async fn test_worker_applies_async_transform_in_order() {
  let transform: Arc<dyn Transform<String>> = Arc::new(async_transform_fn(|s: String| async move {
    tokio::task::yield_now().await;
    Some(s.to_uppercase())
  }));
  let input = feed(
    vec!["a".to_string(), "b".to_string(), "c".to_string()],
    NonZeroUsize::MIN,
  );

  let output = spawn_worker(input, transform, NonZeroUsize::new(8).unwrap());
  assert_eq!(collect(output).await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_worker_output_stays_open_until_input_closes() {
  let transform: Arc<dyn Transform<u8>> = Arc::new(transform_fn(|x: u8| Some(x)));
  let (tx, rx) = mpsc::channel(4);
  let mut output = spawn_default_worker(rx, transform);

  tx.send(7).await.unwrap();
  assert_eq!(timeout(WAIT, output.recv()).await.unwrap(), Some(7));
  assert!(
    timeout(Duration::from_millis(50), output.recv())
      .await
      .is_err()
  );

  drop(tx);
  assert_eq!(timeout(WAIT, output.recv()).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_sharing_a_receiver_process_each_item_once() {
  let transform: Arc<dyn Transform<u32>> = Arc::new(transform_fn(|x: u32| Some(x + 1000)));
  let shared = SharedReceiver::new(feed(0..200u32, NonZeroUsize::new(8).unwrap()));

  let outputs = (0..4)
    .map(|_| spawn_default_worker(shared.clone(), Arc::clone(&transform)))
    .collect();
  drop(shared);

  let mut items = collect(merge_streams(outputs)).await;
  items.sort();
  assert_eq!(items, (1000..1200u32).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stuck_worker_does_not_hold_up_its_siblings() {
  let transform: Arc<dyn Transform<u32>> = Arc::new(async_transform_fn(|x: u32| async move {
    if x == 0 {
      futures::future::pending::<()>().await;
    }
    Some(x)
  }));
  let shared = SharedReceiver::new(feed(0..6u32, NonZeroUsize::MIN));

  let outputs = (0..2)
    .map(|_| spawn_default_worker(shared.clone(), Arc::clone(&transform)))
    .collect();
  drop(shared);
  let mut merged = merge_streams(outputs);

  let mut items = Vec::new();
  for _ in 0..5 {
    let item = timeout(WAIT, merged.recv()).await.expect("sibling worker stalled");
    items.push(item.unwrap());
  }
  items.sort();
  assert_eq!(items, vec![1, 2, 3, 4, 5]);

  // The stuck worker keeps the merged stream open.
  assert!(
    timeout(Duration::from_millis(50), merged.recv())
      .await
      .is_err()
  );
}

#[tokio::test]
async fn test_worker_stops_when_output_dropped() {
  let transform: Arc<dyn Transform<u8>> = Arc::new(transform_fn(|x: u8| Some(x)));
  let (tx, rx) = mpsc::channel(1);
  drop(spawn_default_worker(rx, transform));

  let released = timeout(WAIT, async {
    let _ = tx.send(1).await;
    tx.closed().await;
  })
  .await;
  assert!(released.is_ok());
}
