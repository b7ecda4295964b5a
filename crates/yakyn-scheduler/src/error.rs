//! Error type for `yakyn-scheduler`.

use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("send failed: {0}")]
  Send(#[source] BoxError),

  #[error("{operation} timed out after {after:?}")]
  Timeout {
    operation: &'static str,
    after:     Duration,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
