//! The daily birthday pass.
//!
//! Each contact with a birthday gets at most one "upcoming" notice (three
//! days ahead) and one "today" notice per year, tracked by the per-notice
//! year markers on the contact. Days are counted in the owner's calendar.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use tracing::warn;
use yakyn_core::{
  contact::{BirthdayNotice, Contact},
  locale::format_message,
  notify::{Action, ActionButton, Messenger, OutboundMessage},
  schedule,
  store::{ContactStore, DueContact},
};

use crate::{
  Result,
  engine::{BirthdayReport, Engine},
};

/// The notice owed for `contact` on `today`, if any has not yet been sent
/// this year.
pub fn notice_due(contact: &Contact, today: NaiveDate) -> Option<BirthdayNotice> {
  let birthday = contact.birthday?;
  let notice = BirthdayNotice::for_days_until(schedule::days_until_birthday(birthday, today))?;
  (contact.birthday_sent_year(notice) != Some(today.year())).then_some(notice)
}

pub fn compose_birthday(due: &DueContact, notice: BirthdayNotice, today: NaiveDate) -> OutboundMessage {
  let lang = due.recipient.language;
  let strings = lang.strings();
  let name = due.contact.name.as_str();

  let text = match notice {
    BirthdayNotice::Upcoming => {
      let date = today
        .checked_add_days(Days::new(u64::from(notice.days_before())))
        .unwrap_or(today)
        .format("%d.%m")
        .to_string();
      format_message(strings.birthday_upcoming, &[("date", &date), ("name", name)])
    }
    BirthdayNotice::Today => format_message(strings.birthday_today, &[("name", name)]),
  };

  OutboundMessage {
    address: due.recipient.address.clone(),
    text,
    actions: vec![ActionButton::new(Action::OpenApp, lang)],
  }
}

impl<S, M> Engine<S, M>
where
  S: ContactStore + 'static,
  M: Messenger + 'static,
{
  /// Check every contact with a birthday and send whatever notice is owed.
  ///
  /// Fails only when the contacts cannot be listed. A failed send leaves the
  /// marker unset so a later pass on the same day retries it; one contact's
  /// failure never stops the others.
  pub async fn birthday_pass(&self, now: DateTime<Utc>) -> Result<BirthdayReport> {
    let candidates = self
      .store_call("find_birthdays", self.store.find_birthdays())
      .await?;

    let mut report = BirthdayReport {
      checked: candidates.len(),
      ..BirthdayReport::default()
    };

    for due in &candidates {
      let today = schedule::local_today(now, &due.recipient.zone);
      let Some(notice) = notice_due(&due.contact, today) else {
        continue;
      };
      let contact_id = due.contact.contact_id;

      if let Err(e) = self.deliver(&compose_birthday(due, notice, today)).await {
        report.failed += 1;
        warn!(%contact_id, ?notice, error = %e, "birthday notice not sent");
        continue;
      }
      match notice {
        BirthdayNotice::Upcoming => report.upcoming_sent += 1,
        BirthdayNotice::Today => report.today_sent += 1,
      }

      let marked = self
        .store_call(
          "mark_birthday_sent",
          self.store.mark_birthday_sent(contact_id, notice, today.year(), now),
        )
        .await;
      if let Err(e) = marked {
        warn!(%contact_id, ?notice, error = %e, "birthday notice sent but not recorded, may repeat");
      }
    }

    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chrono::TimeZone;
  use yakyn_core::{
    contact::{Birthday, Frequency, NewContact, ReminderTime},
    store::ContactStore,
  };
  use yakyn_store_sqlite::SqliteStore;

  use super::*;
  use crate::{
    EngineConfig,
    testing::{RecordingMessenger, contact, recipient, utc_user},
  };

  fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  fn with_birthday(month: u32, day: u32) -> Contact {
    let mut c = contact(&recipient("1"), "Aziz", Utc::now());
    c.birthday = Some(Birthday::new(month, day).unwrap());
    c
  }

  #[test]
  fn upcoming_three_days_ahead() {
    let c = with_birthday(3, 10);
    assert_eq!(notice_due(&c, date(2024, 3, 7)), Some(BirthdayNotice::Upcoming));
    assert_eq!(notice_due(&c, date(2024, 3, 10)), Some(BirthdayNotice::Today));
    assert_eq!(notice_due(&c, date(2024, 3, 8)), None);
  }

  #[test]
  fn marker_blocks_the_same_year_only() {
    let mut c = with_birthday(3, 10);
    c.birthday_reminder_sent_year = Some(2024);
    assert_eq!(notice_due(&c, date(2024, 3, 7)), None);
    assert_eq!(notice_due(&c, date(2025, 3, 7)), Some(BirthdayNotice::Upcoming));
    // The other notice has its own marker.
    assert_eq!(notice_due(&c, date(2024, 3, 10)), Some(BirthdayNotice::Today));
  }

  #[test]
  fn no_birthday_no_notice() {
    let c = contact(&recipient("1"), "Aziz", Utc::now());
    assert_eq!(notice_due(&c, date(2024, 3, 7)), None);
  }

  #[test]
  fn upcoming_text_names_the_date() {
    let r = recipient("1");
    let due = DueContact { contact: with_birthday(3, 10), recipient: r };
    let message = compose_birthday(&due, BirthdayNotice::Upcoming, date(2024, 3, 7));
    assert!(message.text.contains("10.03"));
    assert!(message.text.contains("Aziz"));
  }

  async fn engine_with_birthday(
    messenger: RecordingMessenger,
  ) -> (Engine<SqliteStore, RecordingMessenger>, uuid::Uuid) {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = utc_user(&store, "7").await;
    let mut input = NewContact::new(
      user.user_id,
      "Aziz",
      Frequency::Monthly,
      ReminderTime::new(9, 0).unwrap(),
    );
    input.birthday = Some(Birthday::new(3, 10).unwrap());
    let created = store
      .create_contact(input, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
      .await
      .unwrap();
    let engine = Engine::new(Arc::new(store), Arc::new(messenger), EngineConfig::default());
    (engine, created.contact_id)
  }

  #[tokio::test]
  async fn pass_sends_once_per_year() {
    let (engine, id) = engine_with_birthday(RecordingMessenger::default()).await;
    let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap();

    let report = engine.birthday_pass(now).await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.upcoming_sent, 1);
    let contact = engine.store.get_contact(id).await.unwrap().unwrap();
    assert_eq!(contact.birthday_reminder_sent_year, Some(2024));

    let rerun = engine.birthday_pass(now).await.unwrap();
    assert_eq!(rerun.upcoming_sent, 0);
    assert_eq!(engine.messenger.sent().len(), 1);

    let today = engine
      .birthday_pass(Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap())
      .await
      .unwrap();
    assert_eq!(today.today_sent, 1);
    assert_eq!(engine.messenger.sent().len(), 2);
  }

  #[tokio::test]
  async fn failed_send_is_delivered_by_a_later_pass_the_same_day() {
    let (engine, id) = engine_with_birthday(RecordingMessenger::failing_first(1)).await;

    let first = engine
      .birthday_pass(Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap())
      .await
      .unwrap();
    assert_eq!(first.failed, 1);
    let contact = engine.store.get_contact(id).await.unwrap().unwrap();
    assert_eq!(contact.birthday_reminder_sent_year, None);

    let retry = engine
      .birthday_pass(Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap())
      .await
      .unwrap();
    assert_eq!(retry.upcoming_sent, 1);
    assert_eq!(retry.failed, 0);
    let sent = engine.messenger.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("10.03"));
    let contact = engine.store.get_contact(id).await.unwrap().unwrap();
    assert_eq!(contact.birthday_reminder_sent_year, Some(2024));
  }

  #[tokio::test]
  async fn notice_is_only_owed_on_its_day() {
    let (engine, _) = engine_with_birthday(RecordingMessenger::refusing(&["7"])).await;
    engine
      .birthday_pass(Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap())
      .await
      .unwrap();

    // Two days out, no notice is owed, so retries must happen on the day.
    let next_day = engine
      .birthday_pass(Utc.with_ymd_and_hms(2024, 3, 8, 9, 0, 0).unwrap())
      .await
      .unwrap();
    assert_eq!(next_day, BirthdayReport { checked: 1, ..BirthdayReport::default() });
  }
}
