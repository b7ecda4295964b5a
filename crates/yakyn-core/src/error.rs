//! Error types for `yakyn-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown frequency: {0:?}")]
  InvalidFrequency(String),

  #[error("invalid reminder time: {0:?}")]
  InvalidReminderTime(String),

  #[error("invalid birthday: {0:?}")]
  InvalidBirthday(String),

  #[error("unknown timezone: {0:?}")]
  InvalidTimezone(String),

  #[error("unknown language: {0:?}")]
  InvalidLanguage(String),

  #[error("snooze must be between 1 and 24 hours, got {0}")]
  InvalidSnoozeHours(u32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
