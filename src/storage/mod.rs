//! Storage layer abstraction.
//!
//! Durable records live behind two narrow traits:
//! - [`UserStore`]: user records and their lifecycle status
//! - [`HistoryStore`]: the append-only search history
//!
//! [`SqliteStore`] implements both over a single `SQLite` database. Every
//! operation opens its own implicit scope and commits before returning; no
//! transaction spans more than one call.

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{HistoryStore, UserStore};
