//! Append-only search history.

use crate::Result;
use crate::models::{HistoryStats, SearchHistoryRecord, UserId};
use crate::storage::HistoryStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Number of records shown by the history view.
pub const HISTORY_LIMIT: usize = 50;

/// Records every served query for audit and statistics.
pub struct SearchHistoryLog {
    store: Arc<dyn HistoryStore>,
}

impl SearchHistoryLog {
    /// Creates the log.
    #[must_use]
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Appends a query made now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn record(&self, user_id: UserId, display_name: &str, query: &str) -> Result<()> {
        self.store.append(&SearchHistoryRecord {
            user_id,
            display_name: display_name.to_string(),
            query: query.to_string(),
            timestamp: crate::current_timestamp(),
        })
    }

    /// The most recent [`HISTORY_LIMIT`] queries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn recent(&self) -> Result<Vec<SearchHistoryRecord>> {
        self.store.recent(HISTORY_LIMIT)
    }

    /// Total and same-day (UTC) query counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn stats(&self) -> Result<HistoryStats> {
        self.stats_at(Utc::now())
    }

    fn stats_at(&self, now: DateTime<Utc>) -> Result<HistoryStats> {
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(0, |midnight| midnight.and_utc().timestamp());
        Ok(HistoryStats {
            total: self.store.count_since(i64::MIN)?,
            today: self.store.count_since(start_of_day)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use chrono::TimeZone;

    #[test]
    fn test_record_and_recent() {
        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let log = SearchHistoryLog::new(store);
        log.record(UserId::new(1), "alice", "apple").expect("record");
        log.record(UserId::new(2), "bob", "banana").expect("record");

        let recent = log.recent().expect("recent");
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().any(|r| r.query == "apple" && r.display_name == "alice"));
    }

    #[test]
    fn test_stats_splits_today() {
        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).single().expect("date");
        let yesterday = now.timestamp() - 86_400;
        for ts in [yesterday, now.timestamp() - 60, now.timestamp()] {
            store
                .append(&SearchHistoryRecord {
                    user_id: UserId::new(1),
                    display_name: "alice".to_string(),
                    query: "q".to_string(),
                    timestamp: ts,
                })
                .expect("append");
        }

        let log = SearchHistoryLog::new(store);
        let stats = log.stats_at(now).expect("stats");
        assert_eq!(stats, HistoryStats { total: 3, today: 2 });
    }
}
