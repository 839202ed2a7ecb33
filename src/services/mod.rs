//! Business logic services.
//!
//! Services orchestrate storage backends and the knowledge base and provide
//! the high-level operations the router calls.

mod access;
mod fanout;
mod history;
mod search;

pub use access::{AccessControl, AccessOutcome};
pub use fanout::NotificationFanout;
pub use history::{HISTORY_LIMIT, SearchHistoryLog};
pub use search::{MAX_RESULTS, SearchResults, search};
