//! Storage traits for user records and search history.

use crate::Result;
use crate::models::{SearchHistoryRecord, UserId, UserRecord, UserStatus};

/// Durable storage for user records.
///
/// Implementations must be thread-safe; the access-control service shares a
/// single instance across all request handlers.
pub trait UserStore: Send + Sync {
    /// Fetches a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, id: UserId) -> Result<Option<UserRecord>>;

    /// Inserts a new record unless one already exists for the id.
    ///
    /// Returns `true` if the record was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn insert(&self, record: &UserRecord) -> Result<bool>;

    /// Updates the status of an existing record.
    ///
    /// Returns `false` if no record exists for the id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set_status(&self, id: UserId, status: UserStatus) -> Result<bool>;

    /// Sets the status, creating the record with the given display name if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert_status(&self, id: UserId, display_name: &str, status: UserStatus) -> Result<()>;

    /// Lists all records ordered by first contact.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn list(&self) -> Result<Vec<UserRecord>>;

    /// Lists the ids of all users with the given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn ids_with_status(&self, status: UserStatus) -> Result<Vec<UserId>>;
}

/// Append-only storage for search history.
pub trait HistoryStore: Send + Sync {
    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&self, record: &SearchHistoryRecord) -> Result<()>;

    /// Returns up to `limit` records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn recent(&self, limit: usize) -> Result<Vec<SearchHistoryRecord>>;

    /// Counts records with `timestamp >= since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn count_since(&self, since: i64) -> Result<u64>;
}
