//! The background driver: a poll loop and a daily birthday loop, each an
//! owned task stopped through a [`SchedulerHandle`].

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tokio::{
  sync::watch,
  task::JoinHandle,
  time::{MissedTickBehavior, interval, sleep},
};
use tracing::{info, warn};
use yakyn_core::{notify::Messenger, schedule, store::ContactStore, zone::UserZone};

use crate::{
  SchedulerStatus,
  engine::{BirthdayReport, Engine},
};

#[derive(Debug, Clone)]
pub struct DriverConfig {
  pub poll_interval:   Duration,
  /// Local clock time of the daily birthday pass.
  pub birthday_run_at: NaiveTime,
  /// Calendar in which `birthday_run_at` is read.
  pub birthday_zone:   UserZone,
  /// Delay before re-running a birthday pass that left notices unsent.
  /// Retries stop at the end of the local day.
  pub birthday_retry:  Duration,
}

impl Default for DriverConfig {
  fn default() -> Self {
    Self {
      poll_interval:   Duration::from_secs(60),
      birthday_run_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
      birthday_zone:   UserZone::default(),
      birthday_retry:  Duration::from_secs(300),
    }
  }
}

pub struct Scheduler<S, M> {
  engine: Engine<S, M>,
  config: DriverConfig,
}

impl<S, M> Scheduler<S, M>
where
  S: ContactStore + 'static,
  M: Messenger + 'static,
{
  pub fn new(engine: Engine<S, M>, config: DriverConfig) -> Self { Self { engine, config } }

  pub fn engine(&self) -> &Engine<S, M> { &self.engine }

  /// Spawn both loops. The poll loop runs its first cycle immediately, so
  /// contacts that fell due while the process was down are caught at once.
  /// Likewise, if today's birthday run time has already passed, a birthday
  /// pass runs at once.
  ///
  /// May be called again after [`SchedulerHandle::shutdown`] to restart.
  pub fn start(&self) -> SchedulerHandle {
    let (shutdown, rx) = watch::channel(false);
    self.engine.status.mark_started(Utc::now());

    let poll = tokio::spawn(poll_loop(
      self.engine.clone(),
      self.config.poll_interval,
      rx.clone(),
    ));
    let daily = tokio::spawn(birthday_loop(
      self.engine.clone(),
      self.config.birthday_run_at,
      self.config.birthday_zone.clone(),
      self.config.birthday_retry,
      rx,
    ));

    info!(
      poll_interval = ?self.config.poll_interval,
      birthday_run_at = %self.config.birthday_run_at,
      birthday_zone = %self.config.birthday_zone,
      "scheduler started"
    );
    SchedulerHandle {
      shutdown,
      tasks: vec![poll, daily],
      engine_status: self.engine.status(),
    }
  }
}

/// Owns the running loops. Dropping it without calling
/// [`shutdown`](Self::shutdown) also stops them, without waiting.
pub struct SchedulerHandle {
  shutdown:      watch::Sender<bool>,
  tasks:         Vec<JoinHandle<()>>,
  engine_status: Arc<SchedulerStatus>,
}

impl SchedulerHandle {
  /// Signal both loops and wait for them. A cycle already in progress is
  /// allowed to finish.
  pub async fn shutdown(self) {
    let _ = self.shutdown.send(true);
    for task in self.tasks {
      if let Err(e) = task.await {
        warn!(error = %e, "scheduler task ended abnormally");
      }
    }
    self.engine_status.mark_stopped();
    info!("scheduler stopped");
  }
}

async fn poll_loop<S, M>(engine: Engine<S, M>, every: Duration, mut shutdown: watch::Receiver<bool>)
where
  S: ContactStore + 'static,
  M: Messenger + 'static,
{
  let mut ticker = interval(every);
  // A cycle that overruns the interval swallows the ticks it missed.
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = ticker.tick() => {}
      _ = shutdown.changed() => break,
    }
    engine.run_poll(Utc::now()).await;
  }
}

async fn birthday_loop<S, M>(
  engine: Engine<S, M>,
  at: NaiveTime,
  zone: UserZone,
  retry: Duration,
  mut shutdown: watch::Receiver<bool>,
) where
  S: ContactStore + 'static,
  M: Messenger + 'static,
{
  // Today's run time went by before we started, possibly while the process
  // was down.
  let now = Utc::now();
  let mut retrying = false;
  if zone.local_date(schedule::next_daily_run(at, &zone, now)) > zone.local_date(now) {
    retrying = incomplete(engine.run_birthday_pass(now).await);
  }

  loop {
    let now = Utc::now();
    let wake = next_birthday_wake(at, &zone, retrying.then_some(retry), now);
    engine.status.set_next_birthday_pass(wake);
    let wait = (wake - now).to_std().unwrap_or_default();

    tokio::select! {
      _ = sleep(wait) => {}
      _ = shutdown.changed() => break,
    }
    retrying = incomplete(engine.run_birthday_pass(Utc::now()).await);
    if retrying {
      warn!(retry_in = ?retry, "birthday pass left notices unsent");
    }
  }
}

/// Whether a pass left notices unsent, or could not run at all.
fn incomplete(report: Option<BirthdayReport>) -> bool {
  report.is_none_or(|r| r.failed > 0)
}

/// When the birthday loop wakes next: after `retry` if one is pending and
/// still lands on the same local day, otherwise at the next daily run.
fn next_birthday_wake(
  at: NaiveTime,
  zone: &UserZone,
  retry: Option<Duration>,
  now: DateTime<Utc>,
) -> DateTime<Utc> {
  let daily = schedule::next_daily_run(at, zone, now);
  retry
    .and_then(|r| TimeDelta::from_std(r).ok())
    .and_then(|r| now.checked_add_signed(r))
    .filter(|wake| *wake < daily && zone.local_date(*wake) == zone.local_date(now))
    .unwrap_or(daily)
}

#[cfg(test)]
mod tests {
  use chrono::{Datelike, TimeZone};
  use yakyn_core::{
    contact::{Birthday, Frequency, NewContact, ReminderTime},
    store::ContactStore,
  };
  use yakyn_store_sqlite::SqliteStore;

  use super::*;
  use crate::{
    EngineConfig,
    testing::{RecordingMessenger, utc_user},
  };

  #[tokio::test]
  async fn start_polls_and_shutdown_stops() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = utc_user(&store, "9").await;
    let input = NewContact::new(
      user.user_id,
      "Aziz",
      Frequency::Weekly,
      ReminderTime::new(9, 0).unwrap(),
    );
    // Created long enough ago to be due now.
    store
      .create_contact(input, Utc::now() - TimeDelta::days(30))
      .await
      .unwrap();

    let engine = Engine::new(
      Arc::new(store),
      Arc::new(RecordingMessenger::default()),
      EngineConfig::default(),
    );
    let scheduler = Scheduler::new(engine, DriverConfig {
      poll_interval: Duration::from_millis(20),
      ..DriverConfig::default()
    });

    let handle = scheduler.start();
    let messenger = Arc::clone(&scheduler.engine().messenger);
    for _ in 0..100 {
      if !messenger.sent().is_empty() {
        break;
      }
      sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown().await;

    assert_eq!(messenger.sent().len(), 1);
    let snapshot = scheduler.engine().status().snapshot();
    assert!(!snapshot.running);
    assert!(snapshot.polls_completed >= 1);

    // Restartable.
    let handle = scheduler.start();
    assert!(scheduler.engine().status().snapshot().running);
    handle.shutdown().await;
  }

  fn nine() -> NaiveTime { NaiveTime::from_hms_opt(9, 0, 0).unwrap() }

  #[test]
  fn retry_wakes_early_within_the_local_day() {
    let zone = UserZone::utc();
    let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 30).unwrap();
    let five_minutes = Some(Duration::from_secs(300));

    assert_eq!(
      next_birthday_wake(nine(), &zone, five_minutes, now),
      Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 30).unwrap()
    );
    assert_eq!(
      next_birthday_wake(nine(), &zone, None, now),
      Utc.with_ymd_and_hms(2024, 3, 8, 9, 0, 0).unwrap()
    );
  }

  #[test]
  fn retry_stops_at_local_midnight() {
    let zone = UserZone::utc();
    let late = Utc.with_ymd_and_hms(2024, 3, 7, 23, 58, 0).unwrap();
    assert_eq!(
      next_birthday_wake(nine(), &zone, Some(Duration::from_secs(300)), late),
      Utc.with_ymd_and_hms(2024, 3, 8, 9, 0, 0).unwrap()
    );

    // Midnight in UTC+5 is 19:00 UTC.
    let tashkent: UserZone = "UTC+5".parse().unwrap();
    let evening = Utc.with_ymd_and_hms(2024, 3, 7, 18, 58, 0).unwrap();
    assert_eq!(
      next_birthday_wake(nine(), &tashkent, Some(Duration::from_secs(300)), evening),
      Utc.with_ymd_and_hms(2024, 3, 8, 4, 0, 0).unwrap()
    );
  }

  #[tokio::test]
  async fn birthday_pass_catches_up_on_start_and_retries_failures() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = utc_user(&store, "11").await;
    let today = Utc::now().date_naive();
    let mut input = NewContact::new(
      user.user_id,
      "Aziz",
      Frequency::Weekly,
      ReminderTime::new(9, 0).unwrap(),
    );
    input.birthday = Some(Birthday::new(today.month(), today.day()).unwrap());
    let created = store.create_contact(input, Utc::now()).await.unwrap();

    let engine = Engine::new(
      Arc::new(store),
      Arc::new(RecordingMessenger::failing_first(1)),
      EngineConfig::default(),
    );
    // Midnight has always passed, so the pass is owed from the start.
    let scheduler = Scheduler::new(engine, DriverConfig {
      poll_interval:   Duration::from_secs(3600),
      birthday_run_at: NaiveTime::MIN,
      birthday_zone:   UserZone::utc(),
      birthday_retry:  Duration::from_millis(20),
    });

    let handle = scheduler.start();
    let messenger = Arc::clone(&scheduler.engine().messenger);
    for _ in 0..100 {
      if !messenger.sent().is_empty() {
        break;
      }
      sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown().await;

    let sent = messenger.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Aziz"));
    let contact = scheduler
      .engine()
      .store
      .get_contact(created.contact_id)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(contact.birthday_wish_sent_year, Some(today.year()));
  }
}
