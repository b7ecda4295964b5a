//! Telegram Bot API messenger.
//!
//! Notifications go out through `sendMessage` with the actions rendered as an
//! inline keyboard whose `callback_data` is the action payload, so button
//! presses come back to the bot as parseable [`Action`]s.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use yakyn_core::notify::{Action, ActionButton, Messenger, OutboundMessage};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum TelegramError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("telegram rejected the message ({status}): {description}")]
  Rejected { status: u16, description: String },
}

/// Sends notifications as Telegram chat messages.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct TelegramMessenger {
  client:   Client,
  endpoint: String,
}

impl TelegramMessenger {
  pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, TelegramError> {
    let client = Client::builder().timeout(timeout).build()?;
    let endpoint = format!("{}/bot{token}/sendMessage", api_url.trim_end_matches('/'));
    Ok(Self { client, endpoint })
  }
}

/// The API's envelope; only the fields needed to detect a rejection.
#[derive(Deserialize)]
struct ApiResponse {
  ok:          bool,
  #[serde(default)]
  description: Option<String>,
}

fn button(b: &ActionButton) -> Value {
  json!({ "text": b.label, "callback_data": b.action.to_string() })
}

/// The `sendMessage` request body. "Open app" sits on its own row; the other
/// buttons follow two per row.
pub fn build_payload(message: &OutboundMessage) -> Value {
  let (open, rest): (Vec<&ActionButton>, Vec<&ActionButton>) = message
    .actions
    .iter()
    .partition(|b| b.action == Action::OpenApp);

  let mut rows: Vec<Vec<Value>> = Vec::new();
  if !open.is_empty() {
    rows.push(open.into_iter().map(button).collect());
  }
  rows.extend(rest.chunks(2).map(|pair| pair.iter().copied().map(button).collect()));

  let mut payload = json!({
    "chat_id": message.address,
    "text":    message.text,
  });
  if !rows.is_empty() {
    payload["reply_markup"] = json!({ "inline_keyboard": rows });
  }
  payload
}

impl Messenger for TelegramMessenger {
  type Error = TelegramError;

  async fn send(&self, message: &OutboundMessage) -> Result<(), TelegramError> {
    let resp = self
      .client
      .post(&self.endpoint)
      .json(&build_payload(message))
      .send()
      .await?;

    let status = resp.status();
    let body: ApiResponse = resp.json().await?;
    if !status.is_success() || !body.ok {
      return Err(TelegramError::Rejected {
        status:      status.as_u16(),
        description: body.description.unwrap_or_default(),
      });
    }
    Ok(())
  }
}
