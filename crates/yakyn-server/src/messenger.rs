//! The messenger the daemon runs with: Telegram when a bot token is
//! configured, otherwise a dry-run messenger that only logs.

use std::convert::Infallible;

use tracing::info;
use yakyn_core::notify::{Messenger, OutboundMessage};

use crate::telegram::{TelegramError, TelegramMessenger};

/// Logs every notification instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessenger;

impl Messenger for LogMessenger {
  type Error = Infallible;

  async fn send(&self, message: &OutboundMessage) -> Result<(), Infallible> {
    let actions: Vec<String> = message.actions.iter().map(|b| b.action.to_string()).collect();
    info!(
      address = %message.address,
      text = %message.text,
      ?actions,
      "dry run: notification not delivered"
    );
    Ok(())
  }
}

pub enum DaemonMessenger {
  Telegram(TelegramMessenger),
  DryRun(LogMessenger),
}

impl Messenger for DaemonMessenger {
  type Error = TelegramError;

  async fn send(&self, message: &OutboundMessage) -> Result<(), TelegramError> {
    match self {
      Self::Telegram(telegram) => telegram.send(message).await,
      Self::DryRun(log) => log.send(message).await.map_err(|never| match never {}),
    }
  }
}
