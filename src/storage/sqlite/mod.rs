//! `SQLite` storage backend.
//!
//! - [`connection`]: lock acquisition with poison recovery and pragma setup
//! - [`store`]: the [`SqliteStore`] implementing both storage traits

mod connection;
mod store;

pub use connection::{acquire_lock, configure_connection};
pub use store::SqliteStore;
