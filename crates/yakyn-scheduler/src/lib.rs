//! The Yakyn reminder engine: due-reminder detection, notification dispatch,
//! the daily birthday pass, and the background driver that runs them.
//!
//! Everything here is generic over a [`ContactStore`] and a [`Messenger`], so
//! the same engine runs against SQLite and Telegram in production and against
//! an in-memory store and a recording messenger in tests.
//!
//! [`ContactStore`]: yakyn_core::store::ContactStore
//! [`Messenger`]: yakyn_core::notify::Messenger

pub mod birthday;
pub mod detector;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod error;
pub mod status;

pub use driver::{DriverConfig, Scheduler, SchedulerHandle};
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
pub use status::{SchedulerStatus, StatusSnapshot};

#[cfg(test)]
mod testing;
