//! The SQLite implementation of [`ContactStore`].

use std::{path::Path, str::FromStr};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tracing::{debug, warn};
use uuid::Uuid;
use yakyn_core::{
  contact::{
    BirthdayNotice, Contact, ContactHistory, ContactPatch, Frequency, HistoryEvent, NewContact,
    ReminderTime,
  },
  schedule,
  store::{ContactStore, DueContact},
  user::{Language, User, UserPatch},
  zone::{DEFAULT_ZONE, UserZone},
};

use crate::{
  Error, Result,
  encode::{
    CONTACT_COLUMNS, RECIPIENT_COLUMNS, RawContact, RawDue, RawHistory, RawUser, USER_COLUMNS,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Surface a domain error raised inside a `call` closure.
fn closure_err(e: yakyn_core::Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

fn query_contact(
  conn: &rusqlite::Connection,
  contact_id: &str,
) -> rusqlite::Result<Option<RawContact>> {
  conn
    .query_row(
      &format!("SELECT {CONTACT_COLUMNS} FROM contacts c WHERE c.contact_id = ?1"),
      rusqlite::params![contact_id],
      RawContact::read,
    )
    .optional()
}

fn query_user(
  conn: &rusqlite::Connection,
  column: &'static str,
  value: &str,
) -> rusqlite::Result<Option<RawUser>> {
  conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
      rusqlite::params![value],
      RawUser::read,
    )
    .optional()
}

/// Everything needed to recompute a contact's schedule, read in the same
/// transaction as the write that follows.
struct ScheduleInputs {
  user_id:       String,
  frequency:     String,
  reminder_time: String,
  timezone:      String,
}

impl ScheduleInputs {
  fn read(conn: &rusqlite::Connection, contact_id: &str) -> rusqlite::Result<Option<Self>> {
    conn
      .query_row(
        "SELECT c.user_id, c.frequency, c.reminder_time, u.timezone
         FROM contacts c
         JOIN users u ON u.user_id = c.user_id
         WHERE c.contact_id = ?1",
        rusqlite::params![contact_id],
        |row| {
          Ok(Self {
            user_id:       row.get(0)?,
            frequency:     row.get(1)?,
            reminder_time: row.get(2)?,
            timezone:      row.get(3)?,
          })
        },
      )
      .optional()
  }

  fn frequency(&self) -> yakyn_core::Result<Frequency> { Frequency::parse(&self.frequency) }

  fn reminder_time(&self) -> yakyn_core::Result<ReminderTime> {
    ReminderTime::from_str(&self.reminder_time)
  }

  fn zone(&self) -> yakyn_core::Result<UserZone> { UserZone::from_str(&self.timezone) }
}

/// Decode engine-query rows, dropping (and logging) any row whose stored
/// values no longer decode. One bad row must not hide every other due
/// contact.
fn decode_due_rows(raws: Vec<RawDue>) -> Vec<DueContact> {
  raws
    .into_iter()
    .filter_map(|raw| {
      let contact_id = raw.contact.contact_id.clone();
      match raw.into_due() {
        Ok(due) => Some(due),
        Err(e) => {
          warn!(%contact_id, error = %e, "skipping undecodable contact row");
          None
        }
      }
    })
    .collect()
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Yakyn store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_due(&self, filter: &'static str, now: Option<String>) -> Result<Vec<DueContact>> {
    let raws: Vec<RawDue> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONTACT_COLUMNS}, {RECIPIENT_COLUMNS}
           FROM contacts c
           JOIN users u ON u.user_id = c.user_id
           WHERE {filter}"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(now.iter()), RawDue::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(decode_due_rows(raws))
  }
}

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn find_or_create_user(
    &self,
    address: String,
    username: Option<String>,
    now: DateTime<Utc>,
  ) -> Result<User> {
    let id_str   = encode_uuid(Uuid::new_v4());
    let at_str   = encode_dt(now);
    let language = Language::default().to_string();

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        // The UNIQUE address makes concurrent first interactions converge on
        // one row.
        conn.execute(
          "INSERT INTO users (user_id, address, username, language, timezone, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(address) DO NOTHING",
          rusqlite::params![id_str, address, username, language, DEFAULT_ZONE, at_str],
        )?;
        Ok(query_user(conn, "address", &address)?)
      })
      .await?;

    raw
      .ok_or_else(|| Error::Decode("user row vanished after upsert".into()))?
      .into_user()
  }

  async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
    let id_str = encode_uuid(user_id);
    let raw = self
      .conn
      .call(move |conn| Ok(query_user(conn, "user_id", &id_str)?))
      .await?;
    raw.map(RawUser::into_user).transpose()
  }

  async fn update_user(&self, user_id: Uuid, patch: UserPatch) -> Result<Option<User>> {
    let id_str   = encode_uuid(user_id);
    let language = patch.language.map(|l| l.to_string());
    let timezone = patch.zone.map(String::from);

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE users
           SET language = COALESCE(?2, language),
               timezone = COALESCE(?3, timezone)
           WHERE user_id = ?1",
          rusqlite::params![id_str, language, timezone],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(query_user(conn, "user_id", &id_str)?)
      })
      .await?;
    raw.map(RawUser::into_user).transpose()
  }

  // ── Contacts ──────────────────────────────────────────────────────────────

  async fn create_contact(&self, input: NewContact, now: DateTime<Utc>) -> Result<Contact> {
    let owner         = input.user_id;
    let id_str        = encode_uuid(Uuid::new_v4());
    let user_str      = encode_uuid(owner);
    let now_str       = encode_dt(now);
    let frequency     = input.frequency;
    let reminder_time = input.reminder_time.require_slot()?;
    let name          = input.name;
    let notes         = input.notes;
    let birthday      = input.birthday.map(String::from);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let timezone: Option<String> = tx
          .query_row(
            "SELECT timezone FROM users WHERE user_id = ?1",
            rusqlite::params![user_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(timezone) = timezone else {
          return Ok(None);
        };
        let zone = UserZone::from_str(&timezone).map_err(closure_err)?;
        let next = schedule::next_instant(frequency, reminder_time, now, &zone);

        tx.execute(
          "INSERT INTO contacts (
             contact_id, user_id, name, frequency, reminder_time,
             next_reminder_at, birthday, notes, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
          rusqlite::params![
            id_str,
            user_str,
            name,
            frequency.to_string(),
            reminder_time.to_string(),
            encode_dt(next),
            birthday,
            notes,
            now_str,
          ],
        )?;
        let created = query_contact(&tx, &id_str)?;
        tx.commit()?;
        Ok(created)
      })
      .await?;

    let contact = raw.ok_or(Error::UserNotFound(owner))?.into_contact()?;
    debug!(contact_id = %contact.contact_id, next = %contact.next_reminder_at, "contact created");
    Ok(contact)
  }

  async fn get_contact(&self, contact_id: Uuid) -> Result<Option<Contact>> {
    let id_str = encode_uuid(contact_id);
    let raw = self
      .conn
      .call(move |conn| Ok(query_contact(conn, &id_str)?))
      .await?;
    raw.map(RawContact::into_contact).transpose()
  }

  async fn list_contacts(&self, user_id: Uuid) -> Result<Vec<Contact>> {
    let user_str = encode_uuid(user_id);
    let raws: Vec<RawContact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONTACT_COLUMNS} FROM contacts c
           WHERE c.user_id = ?1
           ORDER BY c.next_reminder_at ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], RawContact::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawContact::into_contact).collect()
  }

  async fn update_contact(
    &self,
    contact_id: Uuid,
    patch: ContactPatch,
    now: DateTime<Utc>,
  ) -> Result<Option<Contact>> {
    let id_str       = encode_uuid(contact_id);
    let now_str      = encode_dt(now);
    let reschedules  = patch.reschedules();
    let new_freq     = patch.frequency;
    let new_time     = patch.reminder_time.map(ReminderTime::require_slot).transpose()?;
    let name         = patch.name;
    let set_notes    = patch.notes.is_some();
    let notes        = patch.notes.flatten();
    let set_birthday = patch.birthday.is_some();
    let birthday     = patch.birthday.flatten().map(String::from);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(inputs) = ScheduleInputs::read(&tx, &id_str)? else {
          return Ok(None);
        };

        // Merge the patch over the stored values; never schedule from the
        // changed field alone.
        let frequency = match new_freq {
          Some(f) => f,
          None => inputs.frequency().map_err(closure_err)?,
        };
        let reminder_time = match new_time {
          Some(t) => t,
          None => inputs.reminder_time().map_err(closure_err)?,
        };
        let next = if reschedules {
          let zone = inputs.zone().map_err(closure_err)?;
          Some(encode_dt(schedule::next_instant(frequency, reminder_time, now, &zone)))
        } else {
          None
        };

        tx.execute(
          "UPDATE contacts
           SET name             = COALESCE(?1, name),
               frequency        = ?2,
               reminder_time    = ?3,
               next_reminder_at = COALESCE(?4, next_reminder_at),
               notes            = CASE WHEN ?5 THEN ?6 ELSE notes END,
               birthday         = CASE WHEN ?7 THEN ?8 ELSE birthday END,
               updated_at       = ?9
           WHERE contact_id = ?10",
          rusqlite::params![
            name,
            frequency.to_string(),
            reminder_time.to_string(),
            next,
            set_notes,
            notes,
            set_birthday,
            birthday,
            now_str,
            id_str,
          ],
        )?;
        let updated = query_contact(&tx, &id_str)?;
        tx.commit()?;
        Ok(updated)
      })
      .await?;

    raw.map(RawContact::into_contact).transpose()
  }

  async fn delete_contact(&self, contact_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(contact_id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM contacts WHERE contact_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(deleted > 0)
  }

  async fn history(&self, contact_id: Uuid, limit: usize) -> Result<Vec<ContactHistory>> {
    let id_str    = encode_uuid(contact_id);
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT history_id, contact_id, user_id, event_type, note, recorded_at
           FROM contact_history
           WHERE contact_id = ?1
           ORDER BY recorded_at DESC, rowid DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, limit_val], RawHistory::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_history).collect()
  }

  async fn count_overdue(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
    let user_str = encode_uuid(user_id);
    let now_str  = encode_dt(now);
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM contacts
           WHERE user_id = ?1
             AND snoozed_until IS NULL
             AND next_reminder_at <= ?2",
          rusqlite::params![user_str, now_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(u64::try_from(count).unwrap_or(0))
  }

  // ── Scheduling mutators ───────────────────────────────────────────────────

  async fn mark_contacted(
    &self,
    contact_id: Uuid,
    note: Option<String>,
    now: DateTime<Utc>,
  ) -> Result<Option<Contact>> {
    let id_str      = encode_uuid(contact_id);
    let history_str = encode_uuid(Uuid::new_v4());
    let now_str     = encode_dt(now);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(inputs) = ScheduleInputs::read(&tx, &id_str)? else {
          return Ok(None);
        };
        let next = schedule::next_instant(
          inputs.frequency().map_err(closure_err)?,
          inputs.reminder_time().map_err(closure_err)?,
          now,
          &inputs.zone().map_err(closure_err)?,
        );

        tx.execute(
          "INSERT INTO contact_history
             (history_id, contact_id, user_id, event_type, note, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            history_str,
            id_str,
            inputs.user_id,
            HistoryEvent::Contacted.to_string(),
            note,
            now_str,
          ],
        )?;
        tx.execute(
          "UPDATE contacts
           SET last_contact_at  = ?1,
               next_reminder_at = ?2,
               snoozed_until    = NULL,
               updated_at       = ?1
           WHERE contact_id = ?3",
          rusqlite::params![now_str, encode_dt(next), id_str],
        )?;
        let updated = query_contact(&tx, &id_str)?;
        tx.commit()?;
        Ok(updated)
      })
      .await?;

    let contact = raw.map(RawContact::into_contact).transpose()?;
    if let Some(c) = &contact {
      debug!(contact_id = %c.contact_id, next = %c.next_reminder_at, "marked contacted");
    }
    Ok(contact)
  }

  async fn snooze(&self, contact_id: Uuid, hours: u32, now: DateTime<Utc>) -> Result<Option<Contact>> {
    let until     = schedule::snooze_until(now, hours)?;
    let id_str    = encode_uuid(contact_id);
    let until_str = encode_dt(until);
    let now_str   = encode_dt(now);

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE contacts SET snoozed_until = ?1, updated_at = ?2 WHERE contact_id = ?3",
          rusqlite::params![until_str, now_str, id_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(query_contact(conn, &id_str)?)
      })
      .await?;

    raw.map(RawContact::into_contact).transpose()
  }

  async fn snooze_until_tomorrow(
    &self,
    contact_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Option<Contact>> {
    let id_str  = encode_uuid(contact_id);
    let now_str = encode_dt(now);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(inputs) = ScheduleInputs::read(&tx, &id_str)? else {
          return Ok(None);
        };
        let until = schedule::tomorrow_at(
          inputs.reminder_time().map_err(closure_err)?,
          now,
          &inputs.zone().map_err(closure_err)?,
        );
        tx.execute(
          "UPDATE contacts SET snoozed_until = ?1, updated_at = ?2 WHERE contact_id = ?3",
          rusqlite::params![encode_dt(until), now_str, id_str],
        )?;
        let updated = query_contact(&tx, &id_str)?;
        tx.commit()?;
        Ok(updated)
      })
      .await?;

    raw.map(RawContact::into_contact).transpose()
  }

  // ── Engine ────────────────────────────────────────────────────────────────

  async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<DueContact>> {
    self
      .query_due(
        "(c.snoozed_until IS NOT NULL AND c.snoozed_until <= ?1)
         OR (c.snoozed_until IS NULL AND c.next_reminder_at <= ?1)",
        Some(encode_dt(now)),
      )
      .await
  }

  async fn find_birthdays(&self) -> Result<Vec<DueContact>> {
    self.query_due("c.birthday IS NOT NULL", None).await
  }

  async fn silence(
    &self,
    contact_ids: &[Uuid],
    until: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<u64> {
    if contact_ids.is_empty() {
      return Ok(0);
    }

    let mut params = vec![encode_dt(until), encode_dt(now)];
    params.extend(contact_ids.iter().copied().map(encode_uuid));
    let placeholders = (3..=params.len())
      .map(|i| format!("?{i}"))
      .collect::<Vec<_>>()
      .join(", ");

    let changed = self
      .conn
      .call(move |conn| {
        // `NULL <= ?2` is NULL, so an unset snooze stays unset.
        let sql = format!(
          "UPDATE contacts
           SET next_reminder_at = ?1,
               snoozed_until    = CASE WHEN snoozed_until <= ?2 THEN NULL ELSE snoozed_until END,
               updated_at       = ?2
           WHERE contact_id IN ({placeholders})"
        );
        Ok(conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?)
      })
      .await?;

    Ok(changed as u64)
  }

  async fn mark_birthday_sent(
    &self,
    contact_id: Uuid,
    notice: BirthdayNotice,
    year: i32,
    now: DateTime<Utc>,
  ) -> Result<bool> {
    let column = match notice {
      BirthdayNotice::Upcoming => "birthday_reminder_sent_year",
      BirthdayNotice::Today => "birthday_wish_sent_year",
    };
    let id_str  = encode_uuid(contact_id);
    let now_str = encode_dt(now);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &format!("UPDATE contacts SET {column} = ?1, updated_at = ?2 WHERE contact_id = ?3"),
          rusqlite::params![year, now_str, id_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }
}
