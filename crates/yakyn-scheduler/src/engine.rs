//! The [`Engine`] runs one poll cycle or one birthday pass at a time, against an
//! arbitrary store and messenger.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};
use yakyn_core::{
  notify::{Messenger, OutboundMessage},
  store::ContactStore,
};

use crate::{Error, Result, detector, status::SchedulerStatus};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Upper bound on a single `Messenger::send`.
  pub send_timeout:         Duration,
  /// Upper bound on a single store call.
  pub store_timeout:        Duration,
  /// How far into the future a dispatched contact is pushed.
  pub silence_for:          TimeDelta,
  /// Users dispatched in parallel within one poll cycle.
  pub max_concurrent_users: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      send_timeout:         Duration::from_secs(15),
      store_timeout:        Duration::from_secs(10),
      silence_for:          TimeDelta::days(365),
      max_concurrent_users: 8,
    }
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
  pub due_contacts:      usize,
  pub users:             usize,
  pub notified_users:    usize,
  pub failed_users:      usize,
  pub silenced_contacts: u64,
}

/// Outcome of one birthday pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BirthdayReport {
  pub checked:       usize,
  pub upcoming_sent: usize,
  pub today_sent:    usize,
  pub failed:        usize,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Detects due reminders, dispatches them and runs the birthday pass.
///
/// Cloning is cheap; every clone shares the same store, messenger and
/// status.
pub struct Engine<S, M> {
  pub(crate) store:     Arc<S>,
  pub(crate) messenger: Arc<M>,
  pub(crate) config:    EngineConfig,
  pub(crate) status:    Arc<SchedulerStatus>,
}

impl<S, M> Clone for Engine<S, M> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      messenger: Arc::clone(&self.messenger),
      config:    self.config.clone(),
      status:    Arc::clone(&self.status),
    }
  }
}

impl<S, M> Engine<S, M>
where
  S: ContactStore + 'static,
  M: Messenger + 'static,
{
  pub fn new(store: Arc<S>, messenger: Arc<M>, config: EngineConfig) -> Self {
    Self {
      store,
      messenger,
      config,
      status: Arc::new(SchedulerStatus::new()),
    }
  }

  /// Shared telemetry, updated by [`run_poll`](Self::run_poll) and
  /// [`run_birthday_pass`](Self::run_birthday_pass).
  pub fn status(&self) -> Arc<SchedulerStatus> { Arc::clone(&self.status) }

  /// Await a store future under the configured store timeout.
  pub(crate) async fn store_call<T, E>(
    &self,
    operation: &'static str,
    fut: impl Future<Output = std::result::Result<T, E>>,
  ) -> Result<T>
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let after = self.config.store_timeout;
    match tokio::time::timeout(after, fut).await {
      Ok(result) => result.map_err(|e| Error::Store(Box::new(e))),
      Err(_) => Err(Error::Timeout { operation, after }),
    }
  }

  /// Send one message under the configured send timeout.
  pub(crate) async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
    let after = self.config.send_timeout;
    match tokio::time::timeout(after, self.messenger.send(message)).await {
      Ok(result) => result.map_err(|e| Error::Send(Box::new(e))),
      Err(_) => Err(Error::Timeout { operation: "send", after }),
    }
  }

  /// Run one poll cycle at `now`: find due contacts, then notify and silence
  /// each user's batch in parallel.
  ///
  /// Fails only when the due query itself fails. A failure for one user is
  /// logged and counted; that user's contacts stay due for the next cycle.
  pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollReport> {
    let due = self.store_call("find_due", self.store.find_due(now)).await?;
    let batches = detector::group_by_user(due);

    let mut report = PollReport {
      due_contacts: batches.iter().map(|b| b.contacts.len()).sum(),
      users: batches.len(),
      ..PollReport::default()
    };
    if batches.is_empty() {
      return Ok(report);
    }

    let permits = Arc::new(Semaphore::new(self.config.max_concurrent_users.max(1)));
    let mut tasks = JoinSet::new();
    for batch in batches {
      let engine = self.clone();
      let permits = Arc::clone(&permits);
      tasks.spawn(async move {
        let user_id = batch.recipient.user_id;
        let _permit = permits.acquire_owned().await;
        (user_id, engine.dispatch_batch(batch, now).await)
      });
    }

    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok((_, Ok(silenced))) => {
          report.notified_users += 1;
          report.silenced_contacts += silenced;
        }
        Ok((user_id, Err(e))) => {
          report.failed_users += 1;
          warn!(%user_id, error = %e, "reminder dispatch failed, contacts stay due");
        }
        Err(e) => {
          report.failed_users += 1;
          error!(error = %e, "reminder dispatch task aborted");
        }
      }
    }

    Ok(report)
  }

  /// [`poll_once`](Self::poll_once), logged and recorded in the status.
  pub async fn run_poll(&self, now: DateTime<Utc>) -> Option<PollReport> {
    let result = self.poll_once(now).await;
    self.status.record_poll(now, &result);
    match result {
      Ok(report) if report.users == 0 => {
        debug!("poll cycle: nothing due");
        Some(report)
      }
      Ok(report) => {
        info!(
          due = report.due_contacts,
          users = report.users,
          notified = report.notified_users,
          failed = report.failed_users,
          "poll cycle finished"
        );
        Some(report)
      }
      Err(e) => {
        error!(error = %e, "poll cycle abandoned");
        None
      }
    }
  }

  /// [`birthday_pass`](Self::birthday_pass), logged and recorded in the
  /// status.
  pub async fn run_birthday_pass(&self, now: DateTime<Utc>) -> Option<BirthdayReport> {
    let result = self.birthday_pass(now).await;
    self.status.record_birthday_pass(now, &result);
    match result {
      Ok(report) => {
        info!(
          checked = report.checked,
          upcoming = report.upcoming_sent,
          today = report.today_sent,
          failed = report.failed,
          "birthday pass finished"
        );
        Some(report)
      }
      Err(e) => {
        error!(error = %e, "birthday pass abandoned");
        None
      }
    }
  }
}
