//! The `ContactStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `yakyn-store-sqlite`).
//! The scheduler and any UI layer depend on this abstraction, not on a
//! concrete backend.
//!
//! The mutators in the "Scheduling mutators" section are the only legal ways
//! to change `next_reminder_at` and `snooze`. The "Engine" section is reserved
//! for the scheduler itself.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  contact::{BirthdayNotice, Contact, ContactHistory, ContactPatch, NewContact},
  user::{Recipient, User, UserPatch},
};

/// Default page size for [`ContactStore::history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// A contact joined with the user it must be delivered to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueContact {
  pub contact:   Contact,
  pub recipient: Recipient,
}

/// Abstraction over a Yakyn store backend.
///
/// Every method that computes a schedule takes `now` explicitly; the store
/// never reads the clock for scheduling decisions.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait ContactStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Return the user registered at `address`, creating one with default
  /// language and zone if none exists.
  fn find_or_create_user(
    &self,
    address: String,
    username: Option<String>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn update_user(
    &self,
    user_id: Uuid,
    patch: UserPatch,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  // ── Contacts ──────────────────────────────────────────────────────────

  /// Persist a new contact with `next_reminder_at` computed from its cadence
  /// relative to `now`. Fails if the owning user does not exist.
  fn create_contact(
    &self,
    input: NewContact,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Contact, Self::Error>> + Send + '_;

  fn get_contact(
    &self,
    contact_id: Uuid,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// All of a user's contacts, soonest `next_reminder_at` first.
  fn list_contacts(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + '_;

  /// Apply `patch`. When it touches `frequency` or `reminder_time`,
  /// `next_reminder_at` is recomputed from the merged values relative to
  /// `now`. Returns `None` if the contact does not exist.
  fn update_contact(
    &self,
    contact_id: Uuid,
    patch: ContactPatch,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Delete a contact. Its history rows are kept. Returns `false` if it did
  /// not exist.
  fn delete_contact(
    &self,
    contact_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// History rows for a contact, newest first.
  fn history(
    &self,
    contact_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ContactHistory>, Self::Error>> + Send + '_;

  /// How many of the user's unsnoozed contacts have `next_reminder_at <= now`.
  fn count_overdue(
    &self,
    user_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Scheduling mutators ───────────────────────────────────────────────

  /// Acknowledge contact, atomically: append a history row carrying `note`,
  /// set `last_contact_at = now`, recompute `next_reminder_at` from `now`,
  /// and clear the snooze. Returns `None` if the contact does not exist.
  fn mark_contacted(
    &self,
    contact_id: Uuid,
    note: Option<String>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Snooze for `hours` from `now`. `next_reminder_at` is untouched.
  fn snooze(
    &self,
    contact_id: Uuid,
    hours: u32,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Snooze until tomorrow at the contact's own reminder time, in the
  /// owner's calendar.
  fn snooze_until_tomorrow(
    &self,
    contact_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  // ── Engine ────────────────────────────────────────────────────────────

  /// Contacts whose effective next-fire instant is `<= now`: the snooze when
  /// set, otherwise `next_reminder_at`.
  fn find_due(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DueContact>, Self::Error>> + Send + '_;

  /// Every contact with a birthday set.
  fn find_birthdays(
    &self,
  ) -> impl Future<Output = Result<Vec<DueContact>, Self::Error>> + Send + '_;

  /// The post-dispatch silencing mutation, applied to all `contact_ids` in
  /// one statement: `next_reminder_at = until`, and a snooze that has
  /// already expired at `now` is cleared. A snooze still in the future is
  /// kept. Returns the number of rows updated.
  fn silence<'a>(
    &'a self,
    contact_ids: &'a [Uuid],
    until: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Record that `notice` was delivered for `year`. Returns `false` if the
  /// contact no longer exists.
  fn mark_birthday_sent(
    &self,
    contact_id: Uuid,
    notice: BirthdayNotice,
    year: i32,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
