//! Data models for kbgate.
//!
//! This module contains the core data structures shared by the services:
//! user records and their lifecycle status, knowledge entries, search history
//! records, and the tagged command/callback variants parsed at the transport
//! boundary.

mod command;
mod events;
mod history;
mod knowledge;
mod user;

pub use command::{CallbackAction, Command, parse_user_ids};
pub use events::KnowledgeChange;
pub use history::{HistoryStats, SearchHistoryRecord};
pub use knowledge::{KnowledgeEntry, callback_token, display_key, normalize_key};
pub use user::{UserId, UserRecord, UserStatus};
