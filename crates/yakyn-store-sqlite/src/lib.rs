//! SQLite backend for the Yakyn reminder engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Read-modify-write operations such as
//! `mark_contacted` run inside a single SQLite transaction on that thread.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
