//! Notification dispatch: compose one message per user batch, send it, then
//! silence the batch.

use chrono::{DateTime, Utc};
use tracing::info;
use yakyn_core::{
  locale::format_message,
  notify::{Action, ActionButton, Messenger, OutboundMessage},
  schedule,
  store::ContactStore,
};

use crate::{Result, detector::UserBatch, engine::Engine};

/// Build the reminder for one user's batch.
///
/// Each contact gets a line with the whole days elapsed since its effective
/// due instant (the snooze if one fired, else `next_reminder_at`). "Open app" is always offered; a single-contact batch
/// also gets the contacted and snooze actions.
pub fn compose_reminder(batch: &UserBatch, now: DateTime<Utc>) -> OutboundMessage {
  let lang = batch.recipient.language;
  let strings = lang.strings();

  let lines: Vec<String> = batch
    .contacts
    .iter()
    .map(|c| {
      let days = schedule::whole_days_since(c.next_fire_at(), now).to_string();
      format_message(strings.reminder_item, &[("name", &c.name), ("days", &days)])
    })
    .collect();
  let text = format_message(strings.reminder, &[("contacts", &lines.join("\n"))]);

  let mut actions = vec![ActionButton::new(Action::OpenApp, lang)];
  if let [only] = batch.contacts.as_slice() {
    actions.extend(
      Action::single_contact_set(only.contact_id)
        .into_iter()
        .map(|action| ActionButton::new(action, lang)),
    );
  }

  OutboundMessage {
    address: batch.recipient.address.clone(),
    text,
    actions,
  }
}

impl<S, M> Engine<S, M>
where
  S: ContactStore + 'static,
  M: Messenger + 'static,
{
  /// Notify one user and, only once the send succeeded, silence every
  /// contact in the batch. Returns the number of contacts silenced.
  pub(crate) async fn dispatch_batch(&self, batch: UserBatch, now: DateTime<Utc>) -> Result<u64> {
    let message = compose_reminder(&batch, now);
    self.deliver(&message).await?;

    let ids = batch.contact_ids();
    let until = now + self.config.silence_for;
    let silenced = self
      .store_call("silence", self.store.silence(&ids, until, now))
      .await?;

    info!(
      user_id = %batch.recipient.user_id,
      contacts = ids.len(),
      "reminder sent"
    );
    Ok(silenced)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use yakyn_core::{contact::Snooze, user::Language};

  use super::*;
  use crate::testing::{contact, recipient};

  fn batch_of(names: &[(&str, DateTime<Utc>)], language: Language) -> UserBatch {
    let mut recipient = recipient("42");
    recipient.language = language;
    let contacts = names
      .iter()
      .map(|(name, next)| contact(&recipient, name, *next))
      .collect();
    UserBatch { recipient, contacts }
  }

  #[test]
  fn lists_every_contact_with_days_overdue() {
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
    let batch = batch_of(
      &[
        ("Aziz", Utc.with_ymd_and_hms(2024, 1, 7, 8, 0, 0).unwrap()),
        ("Dilnoza", Utc.with_ymd_and_hms(2024, 1, 9, 10, 0, 0).unwrap()),
      ],
      Language::Uz,
    );

    let message = compose_reminder(&batch, now);
    assert_eq!(message.address, "42");
    assert!(message.text.contains("• Aziz — 3 kun oldin"));
    assert!(message.text.contains("• Dilnoza — 0 kun oldin"));
    assert_eq!(message.actions.len(), 1);
    assert_eq!(message.actions[0].action, Action::OpenApp);
  }

  #[test]
  fn days_overdue_count_from_the_snooze_that_fired() {
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
    let mut batch = batch_of(
      &[("Aziz", Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap())],
      Language::Uz,
    );
    let snoozed_to = Utc.with_ymd_and_hms(2024, 1, 9, 9, 0, 0).unwrap();
    batch.contacts[0].snooze = Snooze::Until(snoozed_to);

    let message = compose_reminder(&batch, now);
    assert!(message.text.contains("• Aziz — 1 kun oldin"));
  }

  #[test]
  fn single_contact_gets_quick_actions() {
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
    let batch = batch_of(&[("Aziz", now)], Language::Ru);
    let id = batch.contacts[0].contact_id;

    let message = compose_reminder(&batch, now);
    let actions: Vec<_> = message.actions.iter().map(|b| b.action).collect();
    assert_eq!(
      actions,
      [
        Action::OpenApp,
        Action::MarkContacted { contact_id: id },
        Action::Snooze { contact_id: id, hours: 1 },
        Action::Snooze { contact_id: id, hours: 3 },
        Action::SnoozeUntilTomorrow { contact_id: id },
      ]
    );
    assert!(message.text.starts_with("🔔 Напоминание"));
  }
}
