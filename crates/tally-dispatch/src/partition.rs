//! Partitioning strategies.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How items are split across workers.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Strategy {
  /// Contiguous groups whose sizes differ by at most one; earlier groups take
  /// the remainder.
  #[default]
  Chunked,
  /// Item `i` goes to worker `i mod W`.
  RoundRobin,
}

/// Assign the indices `0..len` to `workers` partitions. Always returns exactly
/// `workers` partitions, some possibly empty; indices within a partition are
/// ascending.
pub fn partition_indices(
  len: usize,
  workers: NonZeroUsize,
  strategy: Strategy,
) -> Vec<Vec<usize>> {
  let w = workers.get();
  match strategy {
    Strategy::Chunked => {
      let base = len / w;
      let remainder = len % w;
      let mut start = 0;
      (0..w)
        .map(|worker| {
          let size = base + usize::from(worker < remainder);
          let chunk: Vec<usize> = (start..start + size).collect();
          start += size;
          chunk
        })
        .collect()
    }
    Strategy::RoundRobin => {
      let mut buckets = vec![Vec::new(); w];
      for i in 0..len {
        buckets[i % w].push(i);
      }
      buckets
    }
  }
}

/// Split owned `items` into `workers` partitions, pairing each item with its
/// original index.
pub fn partition<T>(
  items: Vec<T>,
  workers: NonZeroUsize,
  strategy: Strategy,
) -> Vec<Vec<(usize, T)>> {
  let len = items.len();
  let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
  partition_indices(len, workers, strategy)
    .into_iter()
    .map(|indices| {
      indices
        .into_iter()
        .filter_map(|i| slots[i].take().map(|item| (i, item)))
        .collect()
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn w(n: usize) -> NonZeroUsize { NonZeroUsize::new(n).unwrap() }

  #[test]
  fn chunk_sizes_differ_by_at_most_one_and_preserve_order() {
    for len in 0..40 {
      for workers in 1..12 {
        let parts = partition_indices(len, w(workers), Strategy::Chunked);
        assert_eq!(parts.len(), workers);

        let sizes: Vec<usize> = parts.iter().map(Vec::len).collect();
        let max = *sizes.iter().max().unwrap();
        let min = *sizes.iter().min().unwrap();
        assert!(max - min <= 1, "len={len} workers={workers} sizes={sizes:?}");
        assert!(sizes.windows(2).all(|p| p[0] >= p[1]), "remainder goes first");

        let flat: Vec<usize> = parts.concat();
        assert_eq!(flat, (0..len).collect::<Vec<_>>());
      }
    }
  }

  #[test]
  fn round_robin_assigns_i_mod_w() {
    for len in 0..40 {
      for workers in 1..12 {
        let parts = partition_indices(len, w(workers), Strategy::RoundRobin);
        assert_eq!(parts.len(), workers);
        for (worker, part) in parts.iter().enumerate() {
          assert!(part.iter().all(|i| i % workers == worker));
        }
        assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), len);
      }
    }
  }

  #[test]
  fn more_workers_than_items() {
    let parts = partition(vec!['a', 'b'], w(5), Strategy::Chunked);
    assert_eq!(
      parts,
      vec![vec![(0, 'a')], vec![(1, 'b')], vec![], vec![], vec![]]
    );
  }

  #[test]
  fn partition_moves_every_item_once() {
    let items: Vec<String> = (0..7).map(|i| format!("u{i}")).collect();
    let parts = partition(items, w(3), Strategy::RoundRobin);
    assert_eq!(parts[0], vec![(0, "u0".into()), (3, "u3".into()), (6, "u6".into())]);
    assert_eq!(parts[1], vec![(1, "u1".into()), (4, "u4".into())]);
    assert_eq!(parts[2], vec![(2, "u2".into()), (5, "u5".into())]);
  }

  #[test]
  fn strategy_parses_from_config_strings() {
    assert_eq!("round_robin".parse::<Strategy>().unwrap(), Strategy::RoundRobin);
    assert_eq!("Chunked".parse::<Strategy>().unwrap(), Strategy::Chunked);
  }
}
