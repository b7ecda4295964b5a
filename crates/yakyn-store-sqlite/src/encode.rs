//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings in UTC. UUIDs are hyphenated
//! lowercase strings. Enums use their lowercase discriminants.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;
use yakyn_core::{
  contact::{Birthday, Contact, ContactHistory, Frequency, HistoryEvent, ReminderTime, Snooze},
  store::DueContact,
  user::{Language, Recipient, User},
  zone::UserZone,
};

use crate::{Error, Result};

// ─── Column lists ────────────────────────────────────────────────────────────

/// Columns read by [`RawContact::read`], in order. Expects the `contacts`
/// table aliased as `c`.
pub const CONTACT_COLUMNS: &str = "
  c.contact_id, c.user_id, c.name, c.frequency, c.reminder_time,
  c.next_reminder_at, c.snoozed_until, c.last_contact_at, c.birthday,
  c.birthday_reminder_sent_year, c.birthday_wish_sent_year, c.notes,
  c.created_at, c.updated_at";

/// Number of columns in [`CONTACT_COLUMNS`].
pub const CONTACT_COLUMN_COUNT: usize = 14;

/// Columns read by [`RawRecipient::read`]. Expects `users` aliased as `u`.
pub const RECIPIENT_COLUMNS: &str = "u.user_id, u.address, u.language, u.timezone";

pub const USER_COLUMNS: &str =
  "user_id, address, username, language, timezone, created_at";

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

/// Microsecond precision with a `Z` suffix, so every encoded instant has the
/// same width and text order matches time order.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn decode_history_event(s: &str) -> Result<HistoryEvent> {
  HistoryEvent::from_str(s).map_err(|_| Error::Decode(format!("history event {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `contacts` row.
pub struct RawContact {
  pub contact_id:                  String,
  pub user_id:                     String,
  pub name:                        String,
  pub frequency:                   String,
  pub reminder_time:               String,
  pub next_reminder_at:            String,
  pub snoozed_until:               Option<String>,
  pub last_contact_at:             Option<String>,
  pub birthday:                    Option<String>,
  pub birthday_reminder_sent_year: Option<i32>,
  pub birthday_wish_sent_year:     Option<i32>,
  pub notes:                       Option<String>,
  pub created_at:                  String,
  pub updated_at:                  String,
}

impl RawContact {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      contact_id:                  row.get(0)?,
      user_id:                     row.get(1)?,
      name:                        row.get(2)?,
      frequency:                   row.get(3)?,
      reminder_time:               row.get(4)?,
      next_reminder_at:            row.get(5)?,
      snoozed_until:               row.get(6)?,
      last_contact_at:             row.get(7)?,
      birthday:                    row.get(8)?,
      birthday_reminder_sent_year: row.get(9)?,
      birthday_wish_sent_year:     row.get(10)?,
      notes:                       row.get(11)?,
      created_at:                  row.get(12)?,
      updated_at:                  row.get(13)?,
    })
  }

  pub fn into_contact(self) -> Result<Contact> {
    Ok(Contact {
      contact_id:                  decode_uuid(&self.contact_id)?,
      user_id:                     decode_uuid(&self.user_id)?,
      name:                        self.name,
      frequency:                   Frequency::parse(&self.frequency)?,
      reminder_time:               ReminderTime::from_str(&self.reminder_time)?,
      next_reminder_at:            decode_dt(&self.next_reminder_at)?,
      snooze:                      Snooze::from(decode_opt_dt(self.snoozed_until)?),
      last_contact_at:             decode_opt_dt(self.last_contact_at)?,
      birthday:                    self
        .birthday
        .as_deref()
        .map(Birthday::from_str)
        .transpose()?,
      birthday_reminder_sent_year: self.birthday_reminder_sent_year,
      birthday_wish_sent_year:     self.birthday_wish_sent_year,
      notes:                       self.notes,
      created_at:                  decode_dt(&self.created_at)?,
      updated_at:                  decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values of the owner columns joined onto a contact row.
pub struct RawRecipient {
  pub user_id:  String,
  pub address:  String,
  pub language: String,
  pub timezone: String,
}

impl RawRecipient {
  /// Read the four [`RECIPIENT_COLUMNS`] starting at column `offset`.
  pub fn read(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:  row.get(offset)?,
      address:  row.get(offset + 1)?,
      language: row.get(offset + 2)?,
      timezone: row.get(offset + 3)?,
    })
  }

  pub fn into_recipient(self) -> Result<Recipient> {
    Ok(Recipient {
      user_id:  decode_uuid(&self.user_id)?,
      address:  self.address,
      language: Language::parse(&self.language)?,
      zone:     UserZone::from_str(&self.timezone)?,
    })
  }
}

/// A contact row joined with its owner, as returned by the engine queries.
pub struct RawDue {
  pub contact:   RawContact,
  pub recipient: RawRecipient,
}

impl RawDue {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      contact:   RawContact::read(row)?,
      recipient: RawRecipient::read(row, CONTACT_COLUMN_COUNT)?,
    })
  }

  pub fn into_due(self) -> Result<DueContact> {
    Ok(DueContact {
      contact:   self.contact.into_contact()?,
      recipient: self.recipient.into_recipient()?,
    })
  }
}

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub user_id:    String,
  pub address:    String,
  pub username:   Option<String>,
  pub language:   String,
  pub timezone:   String,
  pub created_at: String,
}

impl RawUser {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:    row.get(0)?,
      address:    row.get(1)?,
      username:   row.get(2)?,
      language:   row.get(3)?,
      timezone:   row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:    decode_uuid(&self.user_id)?,
      address:    self.address,
      username:   self.username,
      language:   Language::parse(&self.language)?,
      zone:       UserZone::from_str(&self.timezone)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `contact_history` row.
pub struct RawHistory {
  pub history_id:  String,
  pub contact_id:  String,
  pub user_id:     String,
  pub event_type:  String,
  pub note:        Option<String>,
  pub recorded_at: String,
}

impl RawHistory {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      history_id:  row.get(0)?,
      contact_id:  row.get(1)?,
      user_id:     row.get(2)?,
      event_type:  row.get(3)?,
      note:        row.get(4)?,
      recorded_at: row.get(5)?,
    })
  }

  pub fn into_history(self) -> Result<ContactHistory> {
    Ok(ContactHistory {
      history_id:  decode_uuid(&self.history_id)?,
      contact_id:  decode_uuid(&self.contact_id)?,
      user_id:     decode_uuid(&self.user_id)?,
      event:       decode_history_event(&self.event_type)?,
      note:        self.note,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
