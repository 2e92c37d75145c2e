//! Error types for `tally-dispatch`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("a worker pool needs at least one worker")]
  ZeroWorkers,
}

/// Why one partition produced no result.
#[derive(Debug, Error)]
pub enum PartitionError<E> {
  /// The processing function returned an error.
  #[error("worker failed: {0}")]
  Failed(E),

  #[error("worker panicked: {0}")]
  Panicked(String),

  /// The runtime shut down before the worker finished.
  #[error("worker was cancelled")]
  Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
