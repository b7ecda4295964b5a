//! Due-reminder detection: turn the store's flat `find_due` result into one
//! batch per user.

use std::collections::BTreeMap;

use uuid::Uuid;
use yakyn_core::{contact::Contact, store::DueContact, user::Recipient};

/// One user's due contacts, ready for a single notification.
#[derive(Debug, Clone)]
pub struct UserBatch {
  pub recipient: Recipient,
  /// Sorted by effective due instant ([`Contact::next_fire_at`]), oldest
  /// first.
  pub contacts:  Vec<Contact>,
}

impl UserBatch {
  pub fn contact_ids(&self) -> Vec<Uuid> {
    self.contacts.iter().map(|c| c.contact_id).collect()
  }
}

/// Group due contacts by owner. Batches come out in `user_id` order.
pub fn group_by_user(due: Vec<DueContact>) -> Vec<UserBatch> {
  let mut batches: BTreeMap<Uuid, UserBatch> = BTreeMap::new();
  for DueContact { contact, recipient } in due {
    batches
      .entry(recipient.user_id)
      .or_insert_with(|| UserBatch { recipient, contacts: Vec::new() })
      .contacts
      .push(contact);
  }

  let mut batches: Vec<UserBatch> = batches.into_values().collect();
  for batch in &mut batches {
    batch.contacts.sort_by(|a, b| {
      a.next_fire_at()
        .cmp(&b.next_fire_at())
        .then_with(|| a.name.cmp(&b.name))
    });
  }
  batches
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use yakyn_core::contact::Snooze;

  use super::*;
  use crate::testing::{due_contact, recipient};

  #[test]
  fn one_batch_per_user() {
    let ana = recipient("ana");
    let bob = recipient("bob");
    let due = vec![
      due_contact(&ana, "A1", Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap()),
      due_contact(&bob, "B1", Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()),
      due_contact(&ana, "A2", Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
    ];

    let batches = group_by_user(due);
    assert_eq!(batches.len(), 2);

    let ana_batch = batches
      .iter()
      .find(|b| b.recipient.user_id == ana.user_id)
      .unwrap();
    let names: Vec<_> = ana_batch.contacts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["A2", "A1"]);
    assert_eq!(ana_batch.contact_ids().len(), 2);
  }

  #[test]
  fn snoozed_contacts_sort_by_their_snooze() {
    let ana = recipient("ana");
    let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 9, 0, 0).unwrap();
    let mut snoozed = due_contact(&ana, "Snoozed", day(1));
    snoozed.contact.snooze = Snooze::Until(day(5));
    let plain = due_contact(&ana, "Plain", day(3));

    let batches = group_by_user(vec![snoozed, plain]);
    let names: Vec<_> = batches[0].contacts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Plain", "Snoozed"]);
  }

  #[test]
  fn empty_input_yields_no_batches() {
    assert!(group_by_user(Vec::new()).is_empty());
  }
}
