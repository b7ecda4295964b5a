//! Error type for `yakyn-server` configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid setting `{key}`: {reason}")]
  InvalidSetting { key: &'static str, reason: String },

  #[error(transparent)]
  Core(#[from] yakyn_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
