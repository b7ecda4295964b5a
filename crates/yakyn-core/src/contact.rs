//! Contact types: the unit the reminder engine schedules.
//!
//! A contact carries its own cadence ([`Frequency`]), a preferred clock time
//! ([`ReminderTime`]) and the scheduling fields the engine mutates. The only
//! legal writers of those fields are the operations on
//! [`ContactStore`](crate::store::ContactStore).

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Cadence ─────────────────────────────────────────────────────────────────

/// How often the owner wants to be nudged about a contact.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Frequency {
  Weekly,
  Biweekly,
  Monthly,
  Quarterly,
}

impl Frequency {
  /// The fixed day-count of this tier.
  pub fn cadence_days(self) -> u64 {
    match self {
      Self::Weekly => 7,
      Self::Biweekly => 14,
      Self::Monthly => 30,
      Self::Quarterly => 90,
    }
  }

  /// Parse a stored or user-supplied discriminant.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::InvalidFrequency(s.to_owned()))
  }
}

// ─── Time of day ─────────────────────────────────────────────────────────────

/// The clock slots offered to users when they pick a reminder time.
pub const REMINDER_SLOTS: [(u32, u32); 9] = [
  (8, 0),
  (9, 0),
  (10, 0),
  (12, 0),
  (14, 0),
  (18, 0),
  (20, 0),
  (21, 0),
  (22, 0),
];

/// A wall-clock time-of-day with minute precision, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime(NaiveTime);

impl ReminderTime {
  pub fn new(hour: u32, minute: u32) -> Result<Self> {
    NaiveTime::from_hms_opt(hour, minute, 0)
      .map(Self)
      .ok_or_else(|| Error::InvalidReminderTime(format!("{hour}:{minute}")))
  }

  /// `self`, if it is one of [`REMINDER_SLOTS`].
  ///
  /// New and edited contacts must use a slot; [`FromStr`] accepts any valid
  /// clock time so rows written under an older slot list still decode.
  pub fn require_slot(self) -> Result<Self> {
    if self.is_allowed_slot() {
      Ok(self)
    } else {
      Err(Error::InvalidReminderTime(self.to_string()))
    }
  }

  pub fn is_allowed_slot(&self) -> bool {
    REMINDER_SLOTS.contains(&(self.hour(), self.minute()))
  }

  pub fn hour(&self) -> u32 { self.0.hour() }

  pub fn minute(&self) -> u32 { self.0.minute() }

  pub fn as_naive(&self) -> NaiveTime { self.0 }
}

impl fmt::Display for ReminderTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}:{:02}", self.hour(), self.minute())
  }
}

impl FromStr for ReminderTime {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidReminderTime(s.to_owned());
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    if m.len() != 2 {
      return Err(invalid());
    }
    let hour = h.parse().map_err(|_| invalid())?;
    let minute = m.parse().map_err(|_| invalid())?;
    Self::new(hour, minute).map_err(|_| invalid())
  }
}

impl TryFrom<String> for ReminderTime {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<ReminderTime> for String {
  fn from(t: ReminderTime) -> Self { t.to_string() }
}

// ─── Birthday ────────────────────────────────────────────────────────────────

/// A recurring month/day. The birth year, if ever known, is not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Birthday {
  month: u32,
  day:   u32,
}

impl Birthday {
  pub fn new(month: u32, day: u32) -> Result<Self> {
    // 2000 is a leap year, so 29 February is accepted.
    NaiveDate::from_ymd_opt(2000, month, day)
      .map(|_| Self { month, day })
      .ok_or_else(|| Error::InvalidBirthday(format!("{month:02}-{day:02}")))
  }

  pub fn from_date(date: NaiveDate) -> Self {
    Self { month: date.month(), day: date.day() }
  }

  pub fn month(&self) -> u32 { self.month }

  pub fn day(&self) -> u32 { self.day }

  /// This birthday's date within `year`. 29 February falls on 1 March in
  /// non-leap years.
  pub fn in_year(&self, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, self.month, self.day)
      .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
      // Only reachable for years outside chrono's range.
      .unwrap_or(NaiveDate::MAX)
  }
}

impl fmt::Display for Birthday {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}-{:02}", self.month, self.day)
  }
}

/// Accepts `MM-DD` or a full `YYYY-MM-DD` date (the year is dropped).
impl FromStr for Birthday {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
      return Ok(Self::from_date(date));
    }
    let invalid = || Error::InvalidBirthday(s.to_owned());
    let (m, d) = s.split_once('-').ok_or_else(invalid)?;
    let month = m.parse().map_err(|_| invalid())?;
    let day = d.parse().map_err(|_| invalid())?;
    Self::new(month, day)
  }
}

impl TryFrom<String> for Birthday {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<Birthday> for String {
  fn from(b: Birthday) -> Self { b.to_string() }
}

/// The two fixed birthday notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BirthdayNotice {
  /// Sent three days before the birthday.
  Upcoming,
  /// Sent on the day itself.
  Today,
}

impl BirthdayNotice {
  /// How many days before the birthday this notice fires.
  pub fn days_before(self) -> u32 {
    match self {
      Self::Upcoming => 3,
      Self::Today => 0,
    }
  }

  /// The notice due when the birthday is `days_until` days away, if any.
  pub fn for_days_until(days_until: u32) -> Option<Self> {
    [Self::Today, Self::Upcoming]
      .into_iter()
      .find(|n| n.days_before() == days_until)
  }
}

// ─── Snooze ──────────────────────────────────────────────────────────────────

/// A one-cycle override of [`Contact::next_reminder_at`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "until", rename_all = "snake_case")]
pub enum Snooze {
  #[default]
  Unset,
  Until(DateTime<Utc>),
}

impl Snooze {
  pub fn until(&self) -> Option<DateTime<Utc>> {
    match self {
      Self::Unset => None,
      Self::Until(at) => Some(*at),
    }
  }
}

impl From<Option<DateTime<Utc>>> for Snooze {
  fn from(value: Option<DateTime<Utc>>) -> Self {
    value.map_or(Self::Unset, Self::Until)
  }
}

// ─── Contact ─────────────────────────────────────────────────────────────────

/// A person the owner wants to keep in touch with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
  pub contact_id:                  Uuid,
  pub user_id:                     Uuid,
  pub name:                        String,
  pub frequency:                   Frequency,
  pub reminder_time:               ReminderTime,
  /// When the next "keep in touch" notification fires, unless snoozed.
  pub next_reminder_at:            DateTime<Utc>,
  pub snooze:                      Snooze,
  pub last_contact_at:             Option<DateTime<Utc>>,
  pub birthday:                    Option<Birthday>,
  /// Year in which the three-days-prior birthday notice was last sent.
  pub birthday_reminder_sent_year: Option<i32>,
  /// Year in which the day-of birthday notice was last sent.
  pub birthday_wish_sent_year:     Option<i32>,
  pub notes:                       Option<String>,
  pub created_at:                  DateTime<Utc>,
  pub updated_at:                  DateTime<Utc>,
}

impl Contact {
  /// The instant this contact next becomes due: the snooze when one is set,
  /// otherwise `next_reminder_at`.
  pub fn next_fire_at(&self) -> DateTime<Utc> {
    match self.snooze {
      Snooze::Until(at) => at,
      Snooze::Unset => self.next_reminder_at,
    }
  }

  pub fn is_due(&self, now: DateTime<Utc>) -> bool { self.next_fire_at() <= now }

  /// The year marker guarding `notice`.
  pub fn birthday_sent_year(&self, notice: BirthdayNotice) -> Option<i32> {
    match notice {
      BirthdayNotice::Upcoming => self.birthday_reminder_sent_year,
      BirthdayNotice::Today => self.birthday_wish_sent_year,
    }
  }
}

/// Input for [`ContactStore::create_contact`](crate::store::ContactStore::create_contact).
#[derive(Debug, Clone)]
pub struct NewContact {
  pub user_id:       Uuid,
  pub name:          String,
  pub frequency:     Frequency,
  pub reminder_time: ReminderTime,
  pub notes:         Option<String>,
  pub birthday:      Option<Birthday>,
}

impl NewContact {
  pub fn new(
    user_id: Uuid,
    name: impl Into<String>,
    frequency: Frequency,
    reminder_time: ReminderTime,
  ) -> Self {
    Self {
      user_id,
      name: name.into(),
      frequency,
      reminder_time,
      notes: None,
      birthday: None,
    }
  }
}

/// A partial update. `None` leaves a field as it is; for the nullable fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct ContactPatch {
  pub name:          Option<String>,
  pub frequency:     Option<Frequency>,
  pub reminder_time: Option<ReminderTime>,
  pub notes:         Option<Option<String>>,
  pub birthday:      Option<Option<Birthday>>,
}

impl ContactPatch {
  /// Whether applying this patch must recompute `next_reminder_at`.
  pub fn reschedules(&self) -> bool {
    self.frequency.is_some() || self.reminder_time.is_some()
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HistoryEvent {
  Contacted,
}

/// An append-only record of the owner acknowledging a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactHistory {
  pub history_id:  Uuid,
  pub contact_id:  Uuid,
  pub user_id:     Uuid,
  pub event:       HistoryEvent,
  /// Free-text note the owner attached when acknowledging.
  pub note:        Option<String>,
  pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use strum::IntoEnumIterator;

  use super::*;

  fn contact(next: DateTime<Utc>, snooze: Snooze) -> Contact {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    Contact {
      contact_id: Uuid::new_v4(),
      user_id: Uuid::new_v4(),
      name: "Dilnoza".into(),
      frequency: Frequency::Weekly,
      reminder_time: ReminderTime::new(9, 0).unwrap(),
      next_reminder_at: next,
      snooze,
      last_contact_at: None,
      birthday: None,
      birthday_reminder_sent_year: None,
      birthday_wish_sent_year: None,
      notes: None,
      created_at: created,
      updated_at: created,
    }
  }

  #[test]
  fn cadence_days_per_tier() {
    let days: Vec<u64> = Frequency::iter().map(Frequency::cadence_days).collect();
    assert_eq!(days, [7, 14, 30, 90]);
  }

  #[test]
  fn frequency_parses_lowercase_discriminants() {
    assert_eq!(Frequency::parse("biweekly").unwrap(), Frequency::Biweekly);
    assert_eq!(Frequency::Quarterly.to_string(), "quarterly");
    assert!(matches!(
      Frequency::parse("daily"),
      Err(Error::InvalidFrequency(s)) if s == "daily"
    ));
  }

  #[test]
  fn reminder_time_parsing_and_slots() {
    let t: ReminderTime = "09:00".parse().unwrap();
    assert_eq!((t.hour(), t.minute()), (9, 0));
    assert_eq!(t.to_string(), "09:00");

    assert!(ReminderTime::new(21, 0).unwrap().require_slot().is_ok());
    assert!(matches!(
      ReminderTime::new(7, 30).unwrap().require_slot(),
      Err(Error::InvalidReminderTime(s)) if s == "07:30"
    ));
    assert!("07:30".parse::<ReminderTime>().is_ok());
    assert!("25:00".parse::<ReminderTime>().is_err());
    assert!("9".parse::<ReminderTime>().is_err());
    assert!("9:5".parse::<ReminderTime>().is_err());
  }

  #[test]
  fn birthday_accepts_month_day_and_full_dates() {
    let b: Birthday = "03-10".parse().unwrap();
    assert_eq!((b.month(), b.day()), (3, 10));
    let full: Birthday = "1990-03-10".parse().unwrap();
    assert_eq!(b, full);
    assert!("02-30".parse::<Birthday>().is_err());
    assert!("02-29".parse::<Birthday>().is_ok());
  }

  #[test]
  fn leap_day_birthday_falls_on_march_first_in_common_years() {
    let b = Birthday::new(2, 29).unwrap();
    assert_eq!(b.in_year(2024), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    assert_eq!(b.in_year(2025), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
  }

  #[test]
  fn notice_offsets() {
    assert_eq!(BirthdayNotice::for_days_until(0), Some(BirthdayNotice::Today));
    assert_eq!(BirthdayNotice::for_days_until(3), Some(BirthdayNotice::Upcoming));
    assert_eq!(BirthdayNotice::for_days_until(1), None);
  }

  #[test]
  fn unset_snooze_uses_next_reminder() {
    let now = Utc.with_ymd_and_hms(2024, 1, 8, 9, 1, 0).unwrap();
    let past = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
    assert!(contact(past, Snooze::Unset).is_due(now));
    assert!(!contact(now + chrono::TimeDelta::minutes(1), Snooze::Unset).is_due(now));
  }

  #[test]
  fn future_snooze_overrides_past_next_reminder() {
    let now = Utc.with_ymd_and_hms(2024, 1, 8, 9, 1, 0).unwrap();
    let past = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let later = now + chrono::TimeDelta::hours(1);
    assert!(!contact(past, Snooze::Until(later)).is_due(now));
    assert!(contact(later, Snooze::Until(now)).is_due(now));
  }

  #[test]
  fn snooze_serialises_as_tagged_variant() {
    let at = Utc.with_ymd_and_hms(2024, 1, 8, 10, 0, 0).unwrap();
    let json = serde_json::to_value(Snooze::Until(at)).unwrap();
    assert_eq!(json["state"], "until");
    assert_eq!(serde_json::to_value(Snooze::Unset).unwrap()["state"], "unset");
    assert_eq!(Snooze::from(Some(at)).until(), Some(at));
  }
}
