//! Localized notification strings.
//!
//! Templates use `{key}` placeholders filled by [`format_message`].

use crate::user::Language;

/// Every user-visible string the engine emits, in one language.
#[derive(Debug)]
pub struct Strings {
  pub reminder:          &'static str,
  pub reminder_item:     &'static str,
  pub birthday_upcoming: &'static str,
  pub birthday_today:    &'static str,
  pub buttons:           Buttons,
}

#[derive(Debug)]
pub struct Buttons {
  pub open_app:  &'static str,
  pub contacted: &'static str,
  pub snooze_1h: &'static str,
  pub snooze_3h: &'static str,
  pub tomorrow:  &'static str,
}

static RU: Strings = Strings {
  reminder:          "🔔 Напоминание\n\nПора связаться:\n{contacts}",
  reminder_item:     "• {name} — {days} дн. назад",
  birthday_upcoming: "🎁 Через 3 дня ({date}) день рождения у {name}. Самое время подготовить поздравление!",
  birthday_today:    "🎂 Сегодня день рождения у {name}! Не забудьте поздравить.",
  buttons:           Buttons {
    open_app:  "📱 Открыть Yakyn",
    contacted: "✅ Связался",
    snooze_1h: "⏰ Через 1 час",
    snooze_3h: "⏰ Через 3 часа",
    tomorrow:  "⏰ Завтра",
  },
};

static UZ: Strings = Strings {
  reminder:          "🔔 Eslatma\n\nBog'lanish vaqti keldi:\n{contacts}",
  reminder_item:     "• {name} — {days} kun oldin",
  birthday_upcoming: "🎁 3 kundan keyin ({date}) {name}ning tug'ilgan kuni. Tabrikni tayyorlash vaqti!",
  birthday_today:    "🎂 Bugun {name}ning tug'ilgan kuni! Tabriklashni unutmang.",
  buttons:           Buttons {
    open_app:  "📱 Yakyn'ni ochish",
    contacted: "✅ Bog'landim",
    snooze_1h: "⏰ 1 soatdan keyin",
    snooze_3h: "⏰ 3 soatdan keyin",
    tomorrow:  "⏰ Ertaga",
  },
};

impl Language {
  pub fn strings(self) -> &'static Strings {
    match self {
      Self::Ru => &RU,
      Self::Uz => &UZ,
    }
  }
}

/// Replace every `{key}` in `template` with its value.
///
/// Single pass over the template: substituted values are never scanned
/// again, so a value containing `{...}` is copied as-is.
pub fn format_message(template: &str, params: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(template.len());
  let mut rest = template;

  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let value = after.find('}').and_then(|close| {
      let key = &after[..close];
      params
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| (*v, close))
    });
    match value {
      Some((value, close)) => {
        out.push_str(value);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fills_every_occurrence() {
    let out = format_message("{a}-{b}-{a}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x-y-x");
  }

  #[test]
  fn unknown_placeholders_are_left_alone() {
    assert_eq!(format_message("hi {name}", &[("days", "3")]), "hi {name}");
  }

  #[test]
  fn substituted_values_are_not_expanded_again() {
    let out = format_message("{name}: {days}", &[("name", "{days}"), ("days", "3")]);
    assert_eq!(out, "{days}: 3");
  }

  #[test]
  fn stray_braces_survive() {
    assert_eq!(format_message("{ {a} }", &[("a", "x")]), "{ x }");
  }

  #[test]
  fn both_languages_carry_the_contacts_placeholder() {
    for lang in [Language::Ru, Language::Uz] {
      assert!(lang.strings().reminder.contains("{contacts}"));
      assert!(lang.strings().reminder_item.contains("{name}"));
      assert!(lang.strings().birthday_upcoming.contains("{date}"));
    }
  }
}
