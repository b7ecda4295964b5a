//! SQL schema for the Yakyn SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
///
/// Timestamp columns hold fixed-width RFC 3339 UTC strings
/// (`2024-01-08T09:00:00.000000Z`), so `<=` on the text is chronological.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id     TEXT PRIMARY KEY,
    address     TEXT NOT NULL UNIQUE,   -- delivery address, e.g. chat id
    username    TEXT,
    language    TEXT NOT NULL DEFAULT 'ru',
    timezone    TEXT NOT NULL DEFAULT 'UTC+5',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    contact_id                  TEXT PRIMARY KEY,
    user_id                     TEXT NOT NULL REFERENCES users(user_id),
    name                        TEXT NOT NULL,
    frequency                   TEXT NOT NULL,   -- weekly | biweekly | monthly | quarterly
    reminder_time               TEXT NOT NULL,   -- HH:MM, owner's local clock
    next_reminder_at            TEXT NOT NULL,
    snoozed_until               TEXT,            -- NULL = no snooze
    last_contact_at             TEXT,
    birthday                    TEXT,            -- MM-DD
    birthday_reminder_sent_year INTEGER,
    birthday_wish_sent_year     INTEGER,
    notes                       TEXT,
    created_at                  TEXT NOT NULL,
    updated_at                  TEXT NOT NULL
);

-- Append-only. No UPDATE or DELETE is ever issued against this table, and
-- contact_id has no foreign key so rows outlive their contact.
CREATE TABLE IF NOT EXISTS contact_history (
    history_id  TEXT PRIMARY KEY,
    contact_id  TEXT NOT NULL,
    user_id     TEXT NOT NULL REFERENCES users(user_id),
    event_type  TEXT NOT NULL,   -- 'contacted'
    note        TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS contacts_user_idx     ON contacts(user_id);
CREATE INDEX IF NOT EXISTS contacts_next_idx     ON contacts(next_reminder_at);
CREATE INDEX IF NOT EXISTS contacts_snooze_idx   ON contacts(snoozed_until);
CREATE INDEX IF NOT EXISTS contacts_birthday_idx ON contacts(birthday);
CREATE INDEX IF NOT EXISTS history_contact_idx   ON contact_history(contact_id, recorded_at);

PRAGMA user_version = 1;
";
