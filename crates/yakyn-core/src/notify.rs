//! Outbound notifications and the [`Messenger`] trait.
//!
//! The engine composes an [`OutboundMessage`] and hands it to a messenger;
//! how it reaches the user (Telegram, logs, a test double) is the
//! implementation's business.

use std::{fmt, future::Future, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::Language;

// ─── Actions ─────────────────────────────────────────────────────────────────

/// A button attached to a notification. Each action maps to exactly one
/// engine mutator (or to opening the app).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
  MarkContacted { contact_id: Uuid },
  Snooze { contact_id: Uuid, hours: u32 },
  SnoozeUntilTomorrow { contact_id: Uuid },
  OpenApp,
}

impl Action {
  /// The localized button label for this action.
  pub fn label(&self, lang: Language) -> &'static str {
    let buttons = &lang.strings().buttons;
    match self {
      Self::MarkContacted { .. } => buttons.contacted,
      Self::Snooze { hours: 1, .. } => buttons.snooze_1h,
      Self::Snooze { .. } => buttons.snooze_3h,
      Self::SnoozeUntilTomorrow { .. } => buttons.tomorrow,
      Self::OpenApp => buttons.open_app,
    }
  }

  /// The actions offered when exactly one contact is due.
  pub fn single_contact_set(contact_id: Uuid) -> [Self; 4] {
    [
      Self::MarkContacted { contact_id },
      Self::Snooze { contact_id, hours: 1 },
      Self::Snooze { contact_id, hours: 3 },
      Self::SnoozeUntilTomorrow { contact_id },
    ]
  }
}

/// Callback payload carried by chat buttons, e.g. `reminder:snooze:<id>:3`.
impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MarkContacted { contact_id } => write!(f, "reminder:contacted:{contact_id}"),
      Self::Snooze { contact_id, hours } => write!(f, "reminder:snooze:{contact_id}:{hours}"),
      Self::SnoozeUntilTomorrow { contact_id } => {
        write!(f, "reminder:snooze:{contact_id}:tomorrow")
      }
      Self::OpenApp => f.write_str("action:open_app"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised action payload: {0:?}")]
pub struct ParseActionError(String);

impl FromStr for Action {
  type Err = ParseActionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let err = || ParseActionError(s.to_owned());
    if s == "action:open_app" {
      return Ok(Self::OpenApp);
    }
    let mut parts = s.split(':');
    if parts.next() != Some("reminder") {
      return Err(err());
    }
    let verb = parts.next().ok_or_else(err)?;
    let contact_id: Uuid = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let action = match (verb, parts.next()) {
      ("contacted", None) => Self::MarkContacted { contact_id },
      ("snooze", Some("tomorrow")) => Self::SnoozeUntilTomorrow { contact_id },
      ("snooze", Some(hours)) => Self::Snooze {
        contact_id,
        hours: hours.parse().map_err(|_| err())?,
      },
      _ => return Err(err()),
    };
    if parts.next().is_some() {
      return Err(err());
    }
    Ok(action)
  }
}

/// An [`Action`] with its rendered label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
  pub label:  String,
  pub action: Action,
}

impl ActionButton {
  pub fn new(action: Action, lang: Language) -> Self {
    Self { label: action.label(lang).to_owned(), action }
  }
}

// ─── Message ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
  /// Delivery address of the recipient.
  pub address: String,
  pub text:    String,
  pub actions: Vec<ActionButton>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Delivers notifications to users.
///
/// A returned `Ok` means the message was accepted by the transport; the
/// engine only applies post-send state changes after it.
pub trait Messenger: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn send<'a>(
    &'a self,
    message: &'a OutboundMessage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
