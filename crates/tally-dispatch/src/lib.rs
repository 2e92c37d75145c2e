//! Parallel task distribution for Tally.
//!
//! A [`WorkerPool`] splits a list of owned items into a fixed number of
//! partitions (see [`Strategy`]), runs a processing function over each on
//! tokio's blocking pool, and hands back one outcome per partition once all
//! of them have finished.

pub mod error;
pub mod partition;
pub mod pool;

pub use error::{Error, PartitionError, Result};
pub use partition::{Strategy, partition, partition_indices};
pub use pool::{Batch, FailedPartition, ItemResults, PartitionOutcome, WorkerPool};
