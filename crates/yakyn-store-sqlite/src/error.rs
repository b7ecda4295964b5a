//! Error type for `yakyn-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] yakyn_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored discriminant that no longer maps to a known variant.
  #[error("undecodable column value: {0}")]
  Decode(String),

  #[error("user not found: {0}")]
  UserNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
