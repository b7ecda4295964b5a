//! Users: the owners of contacts and the recipients of notifications.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, zone::UserZone};

/// The languages notifications are rendered in.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
  #[default]
  Ru,
  Uz,
}

impl Language {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::InvalidLanguage(s.to_owned()))
  }
}

/// An owner of contacts. Created on first interaction, never deleted by the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:    Uuid,
  /// Where notifications are delivered (e.g. a Telegram chat id).
  pub address:    String,
  pub username:   Option<String>,
  pub language:   Language,
  pub zone:       UserZone,
  pub created_at: DateTime<Utc>,
}

/// Settings a user may change. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
  pub language: Option<Language>,
  pub zone:     Option<UserZone>,
}

/// The parts of a [`User`] the notification path needs, joined onto each due
/// contact by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
  pub user_id:  Uuid,
  pub address:  String,
  pub language: Language,
  pub zone:     UserZone,
}
