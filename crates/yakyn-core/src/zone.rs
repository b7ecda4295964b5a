//! A user's timezone, parsed from the label stored with the user.
//!
//! Labels are either a fixed offset (`UTC`, `UTC+5`, `UTC-03:30`) or an IANA
//! name (`Asia/Tashkent`). All calendar arithmetic in
//! [`schedule`](crate::schedule) goes through [`UserZone`] so that adding
//! calendar days never drifts the wall-clock hour across DST changes.

use std::{fmt, str::FromStr};

use chrono::{
  DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset as _, TimeDelta,
  TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The zone assigned to users who never picked one.
pub const DEFAULT_ZONE: &str = "UTC+5";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneKind {
  Fixed(FixedOffset),
  Named(Tz),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserZone {
  label: String,
  kind:  ZoneKind,
}

impl UserZone {
  pub fn utc() -> Self {
    Self { label: "UTC".into(), kind: ZoneKind::Fixed(Utc.fix()) }
  }

  pub fn label(&self) -> &str { &self.label }

  /// The calendar date in this zone at instant `at`.
  pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
    match self.kind {
      ZoneKind::Fixed(offset) => at.with_timezone(&offset).date_naive(),
      ZoneKind::Named(tz) => at.with_timezone(&tz).date_naive(),
    }
  }

  /// The instant at which the local clock in this zone reads `time` on
  /// `date`.
  ///
  /// A local time skipped by a DST transition resolves to the same clock
  /// reading one hour later; a repeated one resolves to its earlier instant.
  pub fn instant_at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match self.kind {
      ZoneKind::Fixed(offset) => resolve_local(&offset, naive),
      ZoneKind::Named(tz) => resolve_local(&tz, naive),
    }
  }
}

fn resolve_local<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> DateTime<Utc> {
  zone
    .from_local_datetime(&naive)
    .earliest()
    .or_else(|| zone.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|| naive.and_utc())
}

fn parse_fixed(label: &str) -> Option<FixedOffset> {
  let rest = label
    .strip_prefix("UTC")
    .or_else(|| label.strip_prefix("GMT"))?;
  if rest.is_empty() {
    return Some(Utc.fix());
  }
  let (sign, rest) = if let Some(r) = rest.strip_prefix('+') {
    (1, r)
  } else if let Some(r) = rest.strip_prefix('-') {
    (-1, r)
  } else {
    return None;
  };
  let (hours, minutes): (i32, i32) = match rest.split_once(':') {
    Some((h, m)) => (h.parse().ok()?, m.parse().ok()?),
    None => (rest.parse().ok()?, 0),
  };
  if hours > 14 || minutes >= 60 {
    return None;
  }
  FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl Default for UserZone {
  fn default() -> Self { DEFAULT_ZONE.parse().unwrap_or_else(|_| Self::utc()) }
}

impl FromStr for UserZone {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let label = s.trim();
    let kind = match parse_fixed(label) {
      Some(offset) => ZoneKind::Fixed(offset),
      None => ZoneKind::Named(
        label
          .parse::<Tz>()
          .map_err(|_| Error::InvalidTimezone(label.to_owned()))?,
      ),
    };
    Ok(Self { label: label.to_owned(), kind })
  }
}

impl fmt::Display for UserZone {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.label) }
}

impl TryFrom<String> for UserZone {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<UserZone> for String {
  fn from(z: UserZone) -> Self { z.label }
}
