//! Test doubles shared by the scheduler's unit tests.

use std::{collections::HashSet, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use yakyn_core::{
  contact::{Contact, Frequency, ReminderTime, Snooze},
  notify::{Messenger, OutboundMessage},
  store::{ContactStore, DueContact},
  user::{Language, Recipient, User, UserPatch},
  zone::UserZone,
};

pub fn recipient(address: &str) -> Recipient {
  Recipient {
    user_id:  Uuid::new_v4(),
    address:  address.to_owned(),
    language: Language::Ru,
    zone:     UserZone::utc(),
  }
}

pub fn contact(owner: &Recipient, name: &str, next_reminder_at: DateTime<Utc>) -> Contact {
  Contact {
    contact_id: Uuid::new_v4(),
    user_id: owner.user_id,
    name: name.to_owned(),
    frequency: Frequency::Weekly,
    reminder_time: ReminderTime::new(9, 0).unwrap(),
    next_reminder_at,
    snooze: Snooze::Unset,
    last_contact_at: None,
    birthday: None,
    birthday_reminder_sent_year: None,
    birthday_wish_sent_year: None,
    notes: None,
    created_at: next_reminder_at,
    updated_at: next_reminder_at,
  }
}

pub fn due_contact(owner: &Recipient, name: &str, next_reminder_at: DateTime<Utc>) -> DueContact {
  DueContact {
    contact:   contact(owner, name, next_reminder_at),
    recipient: owner.clone(),
  }
}

/// A user whose calendar is UTC.
pub async fn utc_user<S: ContactStore>(store: &S, address: &str) -> User {
  let user = store
    .find_or_create_user(address.to_owned(), None, Utc::now())
    .await
    .unwrap();
  store
    .update_user(user.user_id, UserPatch { language: None, zone: Some(UserZone::utc()) })
    .await
    .unwrap()
    .unwrap()
}

#[derive(Debug, thiserror::Error)]
#[error("delivery refused for {0}")]
pub struct Refused(String);

/// Records every message it accepts. Can refuse chosen addresses, refuse
/// its first few sends, or stall before answering.
#[derive(Default)]
pub struct RecordingMessenger {
  sent:          Mutex<Vec<OutboundMessage>>,
  refuse:        HashSet<String>,
  refusals_left: Mutex<usize>,
  delay:         Option<Duration>,
}

impl RecordingMessenger {
  pub fn refusing(addresses: &[&str]) -> Self {
    Self {
      refuse: addresses.iter().map(|a| (*a).to_owned()).collect(),
      ..Self::default()
    }
  }

  /// Refuses the first `n` sends, whatever the address, then accepts.
  pub fn failing_first(n: usize) -> Self {
    Self { refusals_left: Mutex::new(n), ..Self::default() }
  }

  pub fn slow(delay: Duration) -> Self {
    Self { delay: Some(delay), ..Self::default() }
  }

  pub fn sent(&self) -> Vec<OutboundMessage> { self.sent.lock().unwrap().clone() }
}

impl Messenger for RecordingMessenger {
  type Error = Refused;

  async fn send(&self, message: &OutboundMessage) -> Result<(), Refused> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if self.refuse.contains(&message.address) {
      return Err(Refused(message.address.clone()));
    }
    {
      let mut left = self.refusals_left.lock().unwrap();
      if *left > 0 {
        *left -= 1;
        return Err(Refused(message.address.clone()));
      }
    }
    self.sent.lock().unwrap().push(message.clone());
    Ok(())
  }
}
