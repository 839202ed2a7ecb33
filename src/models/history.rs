//! Search history records.

use super::UserId;
use serde::{Deserialize, Serialize};

/// One served search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistoryRecord {
    /// Who searched.
    pub user_id: UserId,
    /// Display name at the time of the query.
    pub display_name: String,
    /// The normalized query text.
    pub query: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

/// Aggregate counts over the search history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    /// All queries ever served.
    pub total: u64,
    /// Queries served since the start of the current UTC day.
    pub today: u64,
}
