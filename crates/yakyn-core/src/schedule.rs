//! Pure scheduling arithmetic: cadences, snoozes and birthday offsets.
//!
//! Nothing here reads the clock. Every function takes the current instant
//! explicitly so the engine and its tests agree on "now".

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::{
  Error, Result,
  contact::{Birthday, Frequency, ReminderTime},
  zone::UserZone,
};

/// Upper bound accepted by [`snooze_until`].
pub const MAX_SNOOZE_HOURS: u32 = 24;

fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
  date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// The next reminder instant for a contact: `cadence_days(frequency)`
/// calendar days after `from`'s local date, at `time` on the local clock.
///
/// The clock time of `from` itself is irrelevant; only its date counts.
pub fn next_instant(
  frequency: Frequency,
  time: ReminderTime,
  from: DateTime<Utc>,
  zone: &UserZone,
) -> DateTime<Utc> {
  let date = add_days(zone.local_date(from), frequency.cadence_days());
  zone.instant_at(date, time.as_naive())
}

/// Tomorrow's local date at `time`. Used by "snooze until tomorrow", which
/// must land on the contact's own reminder time rather than `now + 24h`.
pub fn tomorrow_at(time: ReminderTime, now: DateTime<Utc>, zone: &UserZone) -> DateTime<Utc> {
  let date = add_days(zone.local_date(now), 1);
  zone.instant_at(date, time.as_naive())
}

/// `now + hours`, for hours in `1..=MAX_SNOOZE_HOURS`.
pub fn snooze_until(now: DateTime<Utc>, hours: u32) -> Result<DateTime<Utc>> {
  if hours == 0 || hours > MAX_SNOOZE_HOURS {
    return Err(Error::InvalidSnoozeHours(hours));
  }
  Ok(now + TimeDelta::hours(i64::from(hours)))
}

/// The owner's calendar date at `now`.
pub fn local_today(now: DateTime<Utc>, zone: &UserZone) -> NaiveDate { zone.local_date(now) }

/// Whole days from `today` until the next occurrence of `birthday`; `0` when
/// the birthday is today.
pub fn days_until_birthday(birthday: Birthday, today: NaiveDate) -> u32 {
  let this_year = birthday.in_year(today.year());
  let next = if this_year < today {
    birthday.in_year(today.year() + 1)
  } else {
    this_year
  };
  u32::try_from((next - today).num_days()).unwrap_or(0)
}

/// Whole days elapsed since `since`, floored and never negative.
pub fn whole_days_since(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
  (now - since).num_days().max(0)
}

/// The first instant strictly after `now` at which the local clock in `zone`
/// reads `at`.
pub fn next_daily_run(at: NaiveTime, zone: &UserZone, now: DateTime<Utc>) -> DateTime<Utc> {
  let today = zone.local_date(now);
  let candidate = zone.instant_at(today, at);
  if candidate > now {
    candidate
  } else {
    zone.instant_at(add_days(today, 1), at)
  }
}
