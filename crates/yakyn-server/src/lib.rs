//! The Yakyn daemon: configuration, outbound messengers, and the health
//! endpoint.
//!
//! The binary in `main.rs` wires these together with a [`SqliteStore`] and the
//! [`yakyn_scheduler`] driver.
//!
//! [`SqliteStore`]: yakyn_store_sqlite::SqliteStore

pub mod error;
pub mod messenger;
pub mod telegram;

pub use error::{Error, Result};

use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use yakyn_core::zone::{DEFAULT_ZONE, UserZone};
use yakyn_scheduler::{DriverConfig, EngineConfig, SchedulerStatus, StatusSnapshot};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `config.toml` and `YAKYN_*`
/// environment variables. Every field has a default.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  #[serde(default = "default_store_path")]
  pub store_path:           PathBuf,
  /// Without a token, notifications are only logged.
  #[serde(default)]
  pub telegram_bot_token:   Option<String>,
  #[serde(default = "default_telegram_api_url")]
  pub telegram_api_url:     String,
  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_secs:   u64,
  /// Local `HH:MM` of the daily birthday pass.
  #[serde(default = "default_birthday_run_at")]
  pub birthday_run_at:      String,
  #[serde(default = "default_birthday_zone")]
  pub birthday_zone:        String,
  /// Delay before retrying a birthday pass that left notices unsent.
  #[serde(default = "default_birthday_retry_secs")]
  pub birthday_retry_secs:  u64,
  #[serde(default = "default_send_timeout_secs")]
  pub send_timeout_secs:    u64,
  #[serde(default = "default_store_timeout_secs")]
  pub store_timeout_secs:   u64,
  #[serde(default = "default_silence_days")]
  pub silence_days:         i64,
  #[serde(default = "default_max_concurrent_users")]
  pub max_concurrent_users: usize,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("yakyn.db") }
fn default_telegram_api_url() -> String { telegram::DEFAULT_API_URL.into() }
fn default_poll_interval_secs() -> u64 { 60 }
fn default_birthday_run_at() -> String { "09:00".into() }
fn default_birthday_zone() -> String { DEFAULT_ZONE.into() }
fn default_birthday_retry_secs() -> u64 { 300 }
fn default_send_timeout_secs() -> u64 { 15 }
fn default_store_timeout_secs() -> u64 { 10 }
fn default_silence_days() -> i64 { 365 }
fn default_max_concurrent_users() -> usize { 8 }

impl ServerConfig {
  pub fn engine_config(&self) -> Result<EngineConfig> {
    if self.silence_days <= 0 {
      return Err(Error::InvalidSetting {
        key:    "silence_days",
        reason: format!("must be positive, got {}", self.silence_days),
      });
    }
    Ok(EngineConfig {
      send_timeout:         Duration::from_secs(self.send_timeout_secs),
      store_timeout:        Duration::from_secs(self.store_timeout_secs),
      silence_for:          TimeDelta::days(self.silence_days),
      max_concurrent_users: self.max_concurrent_users.max(1),
    })
  }

  pub fn driver_config(&self) -> Result<DriverConfig> {
    for (key, value) in [
      ("poll_interval_secs", self.poll_interval_secs),
      ("birthday_retry_secs", self.birthday_retry_secs),
    ] {
      if value == 0 {
        return Err(Error::InvalidSetting { key, reason: "must be at least 1".into() });
      }
    }
    let birthday_run_at = NaiveTime::parse_from_str(&self.birthday_run_at, "%H:%M")
      .map_err(|e| Error::InvalidSetting {
        key:    "birthday_run_at",
        reason: format!("{:?}: {e}", self.birthday_run_at),
      })?;
    Ok(DriverConfig {
      poll_interval: Duration::from_secs(self.poll_interval_secs),
      birthday_run_at,
      birthday_zone: UserZone::from_str(&self.birthday_zone)?,
      birthday_retry: Duration::from_secs(self.birthday_retry_secs),
    })
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState {
  pub scheduler: Arc<SchedulerStatus>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Consecutive failed poll cycles after which `/health` reports degraded.
const DEGRADED_AFTER_FAILURES: u32 = 3;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
  pub status:    &'static str,
  pub timestamp: DateTime<Utc>,
  pub scheduler: StatusSnapshot,
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/health", get(health))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
  let scheduler = state.scheduler.snapshot();
  let status = if scheduler.consecutive_poll_failures >= DEGRADED_AFTER_FAILURES {
    "degraded"
  } else {
    "ok"
  };
  Json(HealthResponse { status, timestamp: Utc::now(), scheduler })
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use tower::ServiceExt as _;
  use yakyn_scheduler::Error as SchedulerError;

  use super::*;

  fn defaults() -> ServerConfig {
    config::Config::builder()
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  async fn get_health(state: AppState) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = defaults();
    assert_eq!(cfg.port, 8080);
    assert!(cfg.telegram_bot_token.is_none());

    let engine = cfg.engine_config().unwrap();
    assert_eq!(engine.silence_for, TimeDelta::days(365));
    assert_eq!(engine.send_timeout, Duration::from_secs(15));

    let driver = cfg.driver_config().unwrap();
    assert_eq!(driver.poll_interval, Duration::from_secs(60));
    assert_eq!(driver.birthday_run_at, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    assert_eq!(driver.birthday_zone.label(), "UTC+5");
    assert_eq!(driver.birthday_retry, Duration::from_secs(300));
  }

  #[test]
  fn bad_settings_are_rejected() {
    let mut cfg = defaults();
    cfg.birthday_run_at = "9am".into();
    assert!(matches!(
      cfg.driver_config(),
      Err(Error::InvalidSetting { key: "birthday_run_at", .. })
    ));

    let mut cfg = defaults();
    cfg.birthday_zone = "Mars/Olympus".into();
    assert!(matches!(cfg.driver_config(), Err(Error::Core(_))));

    let mut cfg = defaults();
    cfg.birthday_retry_secs = 0;
    assert!(matches!(
      cfg.driver_config(),
      Err(Error::InvalidSetting { key: "birthday_retry_secs", .. })
    ));

    let mut cfg = defaults();
    cfg.silence_days = 0;
    assert!(cfg.engine_config().is_err());
  }

  #[tokio::test]
  async fn health_reports_scheduler_snapshot() {
    let scheduler = Arc::new(SchedulerStatus::new());
    scheduler.mark_started(Utc::now());

    let (status, body) = get_health(AppState { scheduler }).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
    assert_eq!(body["scheduler"]["running"], true);
  }

  #[tokio::test]
  async fn health_degrades_after_repeated_poll_failures() {
    let scheduler = Arc::new(SchedulerStatus::new());
    for _ in 0..DEGRADED_AFTER_FAILURES {
      let err = SchedulerError::Timeout {
        operation: "find_due",
        after:     Duration::from_secs(10),
      };
      scheduler.record_poll(Utc::now(), &Err(err));
    }

    let (_, body) = get_health(AppState { scheduler }).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["scheduler"]["consecutive_poll_failures"], 3);
  }
}
