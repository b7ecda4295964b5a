//! Core types and trait definitions for the Yakyn reminder engine.
//!
//! No HTTP or database code lives here. The crate holds the contact model,
//! the pure scheduling arithmetic and the localized message strings, plus the
//! two seams the engine is written against: [`ContactStore`] and
//! [`Messenger`].
//!
//! [`ContactStore`]: store::ContactStore
//! [`Messenger`]: notify::Messenger

// Implementors write `async fn`; the trait signatures spell out the `Send`
// bound on the returned futures.
#![allow(async_fn_in_trait)]

pub mod contact;
pub mod error;
pub mod locale;
pub mod notify;
pub mod schedule;
pub mod store;
pub mod user;
pub mod zone;

pub use error::{Error, Result};
