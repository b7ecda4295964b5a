//! yakyn daemon binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, starts the reminder scheduler and serves `/health` over
//! HTTP until interrupted.
//!
//! ```
//! cargo run -p yakyn-server --bin yakyn -- --once
//! ```
//!
//! runs a single poll cycle and birthday pass, then exits.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use yakyn_scheduler::{Engine, Scheduler};
use yakyn_server::{
  AppState, ServerConfig,
  messenger::{DaemonMessenger, LogMessenger},
  telegram::TelegramMessenger,
};
use yakyn_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Yakyn reminder daemon")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Run one poll cycle and one birthday pass, then exit.
  #[arg(long)]
  once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("YAKYN"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  let engine_cfg = server_cfg.engine_config().context("invalid engine settings")?;
  let driver_cfg = server_cfg.driver_config().context("invalid scheduler settings")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let messenger = match &server_cfg.telegram_bot_token {
    Some(token) => DaemonMessenger::Telegram(
      TelegramMessenger::new(
        &server_cfg.telegram_api_url,
        token,
        Duration::from_secs(server_cfg.send_timeout_secs),
      )
      .context("failed to build Telegram client")?,
    ),
    None => {
      tracing::warn!("no telegram_bot_token configured, notifications will only be logged");
      DaemonMessenger::DryRun(LogMessenger)
    }
  };

  let engine = Engine::new(Arc::new(store), Arc::new(messenger), engine_cfg);

  if cli.once {
    let now = Utc::now();
    engine.run_poll(now).await;
    engine.run_birthday_pass(now).await;
    return Ok(());
  }

  let state = AppState { scheduler: engine.status() };
  let scheduler = Scheduler::new(engine, driver_cfg);
  let handle = scheduler.start();

  let app = yakyn_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  handle.shutdown().await;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
