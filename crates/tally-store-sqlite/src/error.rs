//! Error type for `tally-store-sqlite`.

use tally_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column holds a value no domain type accepts.
  #[error("cannot decode stored value: {0}")]
  Decode(String),
}

/// Domain errors raised inside a connection closure travel as
/// `tokio_rusqlite::Error::Other`; unwrap them back to their own variants.
impl From<tokio_rusqlite::Error> for Error {
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Other(boxed) => match boxed.downcast::<tally_core::Error>() {
        Ok(core) => Self::Core(*core),
        Err(other) => match other.downcast::<uuid::Error>() {
          Ok(uuid) => Self::Uuid(*uuid),
          Err(other) => Self::Database(tokio_rusqlite::Error::Other(other)),
        },
      },
      other => Self::Database(other),
    }
  }
}

impl StoreError for Error {
  fn core(&self) -> Option<&tally_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
