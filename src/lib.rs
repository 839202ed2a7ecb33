//! # kbgate
//!
//! A moderated, single-operator chat service that gates access to a small
//! searchable knowledge base.
//!
//! New users must be approved by the administrator before they can query the
//! knowledge base. Approved users send free-text queries and receive the
//! best-matching entries. The administrator adds, edits and deletes entries
//! through multi-step conversations, and every change is announced to all
//! approved users.
//!
//! ## Components
//!
//! - [`knowledge::KnowledgeBase`]: ordered keyword map persisted to a backing document
//! - [`services::search`]: bidirectional substring search, capped at 7 results
//! - [`services::AccessControl`]: pending / approved / blocked user lifecycle
//! - [`services::NotificationFanout`]: per-recipient isolated delivery
//! - [`conversation::ConversationStateMachine`]: per-user multi-step flows
//! - [`services::SearchHistoryLog`]: append-only query audit log
//!
//! ## Example
//!
//! ```rust,ignore
//! use kbgate::knowledge::KnowledgeBase;
//! use kbgate::services::search;
//!
//! let kb = KnowledgeBase::open("data.kb");
//! let results = kb.with_entries(|entries| search(entries, "app"));
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod bot;
pub mod config;
pub mod conversation;
pub mod health;
pub mod knowledge;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;
pub mod transport;

pub use config::ServiceConfig;
pub use knowledge::KnowledgeBase;
pub use models::{KnowledgeEntry, SearchHistoryRecord, UserId, UserRecord, UserStatus};
pub use services::{AccessControl, NotificationFanout, SearchHistoryLog, search};
pub use storage::{HistoryStore, SqliteStore, UserStore};

/// Error type for kbgate operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed user ids, empty queries, missing configuration |
/// | `NotFound` | Unknown user id or keyword in an administrative operation |
/// | `AccessDenied` | A pending or blocked user attempts a gated action |
/// | `DeliveryFailed` | The chat transport rejects or times out a single message |
/// | `OperationFailed` | `SQLite` errors, backing document I/O errors |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A user id argument is not a number
    /// - A search query is empty after normalization
    /// - Required configuration (token, admin id) is missing
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced entity does not exist.
    ///
    /// Carries the identifier so administrator-facing messages can name it.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity ("user", "keyword").
        kind: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not allowed to perform the action.
    ///
    /// Intentionally carries no detail; users only ever see a generic denial.
    #[error("access denied")]
    AccessDenied,

    /// Delivering a message to one recipient failed.
    #[error("delivery to {recipient} failed: {cause}")]
    DeliveryFailed {
        /// The recipient the message was addressed to.
        recipient: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - The backing document cannot be read or written
    /// - The HTTP listener cannot bind
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Shorthand for [`Error::NotFound`] on a keyword.
    #[must_use]
    pub fn keyword_not_found(key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "keyword",
            id: key.into(),
        }
    }

    /// Shorthand for [`Error::NotFound`] on a user.
    #[must_use]
    pub fn user_not_found(id: UserId) -> Self {
        Self::NotFound {
            kind: "user",
            id: id.to_string(),
        }
    }
}

/// Result type alias for kbgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "persist".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'persist' failed: disk full");

        let err = Error::keyword_not_found("apple");
        assert_eq!(err.to_string(), "keyword not found: apple");

        let err = Error::user_not_found(UserId::new(42));
        assert_eq!(err.to_string(), "user not found: 42");
    }

    #[test]
    fn test_access_denied_leaks_nothing() {
        assert_eq!(Error::AccessDenied.to_string(), "access denied");
    }
}
