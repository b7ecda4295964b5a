//! Driver telemetry, exposed read-only to the health endpoint.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  Result,
  engine::{BirthdayReport, PollReport},
};

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
  pub running:                   bool,
  pub started_at:                Option<DateTime<Utc>>,
  pub polls_completed:           u64,
  pub consecutive_poll_failures: u32,
  pub last_poll_at:              Option<DateTime<Utc>>,
  pub last_poll:                 Option<PollReport>,
  pub last_poll_error:           Option<String>,
  pub last_birthday_pass_at:     Option<DateTime<Utc>>,
  pub last_birthday_pass:        Option<BirthdayReport>,
  pub last_birthday_error:       Option<String>,
  pub next_birthday_pass_at:     Option<DateTime<Utc>>,
}

/// Shared, lock-protected [`StatusSnapshot`].
#[derive(Debug, Default)]
pub struct SchedulerStatus {
  inner: Mutex<StatusSnapshot>,
}

impl SchedulerStatus {
  pub fn new() -> Self { Self::default() }

  fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut inner);
  }

  pub fn mark_started(&self, at: DateTime<Utc>) {
    self.update(|s| {
      s.running = true;
      s.started_at = Some(at);
    });
  }

  pub fn mark_stopped(&self) {
    self.update(|s| {
      s.running = false;
      s.next_birthday_pass_at = None;
    });
  }

  pub fn record_poll(&self, at: DateTime<Utc>, result: &Result<PollReport>) {
    self.update(|s| {
      s.last_poll_at = Some(at);
      match result {
        Ok(report) => {
          s.polls_completed += 1;
          s.consecutive_poll_failures = 0;
          s.last_poll = Some(*report);
          s.last_poll_error = None;
        }
        Err(e) => {
          s.consecutive_poll_failures += 1;
          s.last_poll_error = Some(e.to_string());
        }
      }
    });
  }

  pub fn record_birthday_pass(&self, at: DateTime<Utc>, result: &Result<BirthdayReport>) {
    self.update(|s| {
      s.last_birthday_pass_at = Some(at);
      match result {
        Ok(report) => {
          s.last_birthday_pass = Some(*report);
          s.last_birthday_error = None;
        }
        Err(e) => s.last_birthday_error = Some(e.to_string()),
      }
    });
  }

  pub fn set_next_birthday_pass(&self, at: DateTime<Utc>) {
    self.update(|s| s.next_birthday_pass_at = Some(at));
  }

  pub fn snapshot(&self) -> StatusSnapshot {
    self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }
}
