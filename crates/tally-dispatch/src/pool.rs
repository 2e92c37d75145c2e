//! [`WorkerPool`]: runs a processing function over partitions on tokio's
//! blocking thread pool and joins every worker before returning.

use std::{any::Any, num::NonZeroUsize, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
  Error, PartitionError, Result,
  partition::{Strategy, partition},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What one worker produced for its partition.
#[derive(Debug)]
pub struct PartitionOutcome<R, E> {
  pub worker:  usize,
  /// Original input positions of this partition's items, ascending.
  pub indices: Vec<usize>,
  pub result:  Result<R, PartitionError<E>>,
}

/// Every partition's outcome, in partition order.
#[derive(Debug)]
pub struct Batch<R, E> {
  pub outcomes: Vec<PartitionOutcome<R, E>>,
}

impl<R, E> Batch<R, E> {
  pub fn is_complete(&self) -> bool {
    self.outcomes.iter().all(|o| o.result.is_ok())
  }

  pub fn failures(&self) -> impl Iterator<Item = &PartitionOutcome<R, E>> {
    self.outcomes.iter().filter(|o| o.result.is_err())
  }

  /// All results, or the first failed partition (in partition order).
  pub fn try_collect(self) -> Result<Vec<R>, PartitionOutcome<R, E>> {
    let mut results = Vec::with_capacity(self.outcomes.len());
    for outcome in self.outcomes {
      match outcome.result {
        Ok(r) => results.push(r),
        Err(e) => {
          return Err(PartitionOutcome {
            worker:  outcome.worker,
            indices: outcome.indices,
            result:  Err(e),
          });
        }
      }
    }
    Ok(results)
  }

  /// Successful results alongside the failed partitions.
  pub fn partial(self) -> (Vec<R>, Vec<FailedPartition<E>>) {
    let mut ok = Vec::new();
    let mut failed = Vec::new();
    for outcome in self.outcomes {
      match outcome.result {
        Ok(r) => ok.push(r),
        Err(error) => failed.push(FailedPartition {
          worker: outcome.worker,
          indices: outcome.indices,
          error,
        }),
      }
    }
    (ok, failed)
  }
}

impl<R, E> Batch<Vec<(usize, Result<R, E>)>, E> {
  /// Split per-item results by outcome. Items from partitions that panicked
  /// or were cancelled are not in `ok` or `failed`; their partitions are in
  /// `lost`.
  pub fn into_items(self) -> ItemResults<R, E> {
    let (parts, lost) = self.partial();
    let mut ok = Vec::new();
    let mut failed = Vec::new();
    for (index, result) in parts.into_iter().flatten() {
      match result {
        Ok(r) => ok.push((index, r)),
        Err(e) => failed.push((index, e)),
      }
    }
    ok.sort_by_key(|(i, _)| *i);
    failed.sort_by_key(|(i, _)| *i);
    ItemResults { ok, failed, lost }
  }
}

/// Item-at-a-time results keyed by original input position, ascending.
#[derive(Debug)]
pub struct ItemResults<R, E> {
  pub ok:     Vec<(usize, R)>,
  pub failed: Vec<(usize, E)>,
  pub lost:   Vec<FailedPartition<E>>,
}

/// A partition that produced no result.
#[derive(Debug)]
pub struct FailedPartition<E> {
  pub worker:  usize,
  pub indices: Vec<usize>,
  pub error:   PartitionError<E>,
}

// ─── Pool ────────────────────────────────────────────────────────────────────

/// A fixed-width pool. Workers get owned partitions and share nothing; the
/// pool itself holds no state between runs.
///
/// Must be driven from within a tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
  workers: NonZeroUsize,
}

impl WorkerPool {
  pub fn new(workers: usize) -> Result<Self> {
    NonZeroUsize::new(workers)
      .map(|workers| Self { workers })
      .ok_or(Error::ZeroWorkers)
  }

  pub fn workers(&self) -> usize { self.workers.get() }

  /// Contiguous-chunk mode: `f` is called once per non-empty chunk with the
  /// whole chunk.
  pub async fn run_chunks<T, R, E, F>(&self, items: Vec<T>, f: F) -> Batch<R, E>
  where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(Vec<T>) -> Result<R, E> + Send + Sync + 'static,
  {
    self.run(Strategy::Chunked, items, f).await
  }

  /// Item-at-a-time mode: each worker calls `f` on every item of its
  /// partition in order, and each item keeps its own result. A failing item
  /// does not stop the rest of its partition.
  pub async fn run_each<T, R, E, F>(
    &self,
    strategy: Strategy,
    items: Vec<T>,
    f: F,
  ) -> Batch<Vec<(usize, Result<R, E>)>, E>
  where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
  {
    let items: Vec<(usize, T)> = items.into_iter().enumerate().collect();
    self
      .run(strategy, items, move |part: Vec<(usize, T)>| {
        Ok::<_, E>(part.into_iter().map(|(i, item)| (i, f(item))).collect())
      })
      .await
  }

  async fn run<T, R, E, F>(&self, strategy: Strategy, items: Vec<T>, f: F) -> Batch<R, E>
  where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(Vec<T>) -> Result<R, E> + Send + Sync + 'static,
  {
    if items.is_empty() {
      return Batch { outcomes: Vec::new() };
    }

    info!(%strategy, workers = self.workers(), items = items.len(), "dispatching");
    let f = Arc::new(f);

    let mut handles = Vec::new();
    for (worker, part) in partition(items, self.workers, strategy).into_iter().enumerate() {
      if part.is_empty() {
        continue;
      }
      let (indices, part): (Vec<usize>, Vec<T>) = part.into_iter().unzip();
      let f = Arc::clone(&f);
      let handle = tokio::task::spawn_blocking(move || f(part));
      handles.push((worker, indices, handle));
    }

    // Barrier: await in partition order; every worker is already running.
    let mut outcomes = Vec::with_capacity(handles.len());
    for (worker, indices, handle) in handles {
      let result = match handle.await {
        Ok(Ok(r)) => Ok(r),
        Ok(Err(e)) => Err(PartitionError::Failed(e)),
        Err(join) if join.is_panic() => {
          Err(PartitionError::Panicked(panic_message(join.into_panic())))
        }
        Err(_) => Err(PartitionError::Cancelled),
      };
      match &result {
        Ok(_) => debug!(worker, items = indices.len(), "partition finished"),
        Err(_) => warn!(worker, items = indices.len(), "partition failed"),
      }
      outcomes.push(PartitionOutcome { worker, indices, result });
    }

    Batch { outcomes }
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_owned()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_owned()
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
  };

  use super::*;

  #[tokio::test(flavor = "multi_thread")]
  async fn chunk_results_come_back_in_input_order() {
    let pool = WorkerPool::new(3).unwrap();
    let items: Vec<u64> = (0..10).collect();

    // Earlier chunks sleep longer so they finish last.
    let batch = pool
      .run_chunks(items, |chunk: Vec<u64>| {
        let delay = 30u64.saturating_sub(chunk[0] * 3);
        thread::sleep(Duration::from_millis(delay));
        Ok::<_, String>(chunk)
      })
      .await;

    assert!(batch.is_complete());
    let indices: Vec<Vec<usize>> =
      batch.outcomes.iter().map(|o| o.indices.clone()).collect();
    assert_eq!(indices, vec![vec![0, 1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);

    let flat: Vec<u64> = batch.try_collect().unwrap().concat();
    assert_eq!(flat, (0..10).collect::<Vec<_>>());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn failing_item_keeps_the_rest_of_its_partition() {
    let pool = WorkerPool::new(2).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    // Round robin puts 1, 3 and 5 on worker 1; 3 fails between two successes.
    let batch = pool
      .run_each(Strategy::RoundRobin, (0..6).collect(), move |i: u32| {
        counter.fetch_add(1, Ordering::SeqCst);
        if i == 3 { Err(format!("bad item {i}")) } else { Ok(i * 10) }
      })
      .await;

    assert!(batch.is_complete());
    assert_eq!(batch.outcomes[1].indices, vec![1, 3, 5]);

    let items = batch.into_items();
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(items.ok, vec![(0, 0), (1, 10), (2, 20), (4, 40), (5, 50)]);
    assert_eq!(items.failed, vec![(3, "bad item 3".to_owned())]);
    assert!(items.lost.is_empty());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn panicking_item_loses_only_its_partition() {
    let pool = WorkerPool::new(2).unwrap();
    let items = pool
      .run_each(Strategy::Chunked, vec![1, 2, 3, 4], |i: i32| {
        if i == 4 {
          panic!("boom");
        }
        Ok::<_, String>(i)
      })
      .await
      .into_items();

    assert_eq!(items.ok, vec![(0, 1), (1, 2)]);
    assert!(items.failed.is_empty());
    assert_eq!(items.lost.len(), 1);
    assert_eq!(items.lost[0].worker, 1);
    assert_eq!(items.lost[0].indices, vec![2, 3]);
    assert!(matches!(&items.lost[0].error, PartitionError::Panicked(m) if m == "boom"));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn failed_chunk_is_reported_for_its_partition_only() {
    let pool = WorkerPool::new(3).unwrap();
    let batch = pool
      .run_chunks((0..9).collect(), |chunk: Vec<u32>| {
        if chunk.contains(&4) {
          return Err("bad chunk".to_owned());
        }
        Ok(chunk.iter().sum::<u32>())
      })
      .await;

    assert!(!batch.is_complete());
    let (ok, failed) = batch.partial();
    assert_eq!(ok, vec![3, 21]);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].worker, 1);
    assert_eq!(failed[0].indices, vec![3, 4, 5]);
    assert!(matches!(&failed[0].error, PartitionError::Failed(m) if m == "bad chunk"));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn panics_are_captured() {
    let pool = WorkerPool::new(2).unwrap();
    let batch = pool
      .run_chunks(vec![1, 2, 3, 4], |chunk: Vec<i32>| {
        if chunk.contains(&4) {
          panic!("boom");
        }
        Ok::<_, String>(chunk.len())
      })
      .await;

    let err = batch.try_collect().unwrap_err();
    assert_eq!(err.worker, 1);
    assert!(matches!(err.result, Err(PartitionError::Panicked(ref m)) if m == "boom"));
  }

  #[tokio::test]
  async fn empty_input_spawns_nothing() {
    let pool = WorkerPool::new(4).unwrap();
    let batch = pool
      .run_chunks(Vec::<u8>::new(), |_chunk: Vec<u8>| -> Result<(), String> {
        unreachable!()
      })
      .await;
    assert!(batch.outcomes.is_empty());
    assert!(batch.is_complete());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn empty_partitions_are_skipped() {
    let pool = WorkerPool::new(8).unwrap();
    let batch = pool
      .run_chunks(vec!["x", "y"], |chunk: Vec<&str>| Ok::<_, String>(chunk.len()))
      .await;
    let workers: Vec<usize> = batch.outcomes.iter().map(|o| o.worker).collect();
    assert_eq!(workers, vec![0, 1]);
  }

  #[test]
  fn zero_workers_is_rejected() {
    assert!(matches!(WorkerPool::new(0), Err(Error::ZeroWorkers)));
  }
}
