//! User identity, record and lifecycle status.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque chat user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wraps a raw transport identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("not a user id: {s}")))
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Lifecycle status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Waiting for the administrator's decision.
    #[default]
    Pending,
    /// May search and receives change notifications.
    Approved,
    /// Access revoked.
    Blocked,
}

impl UserStatus {
    /// Returns the status as stored in the `users` table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Blocked => "blocked",
        }
    }

    /// Parses a stored status string.
    ///
    /// Unknown strings are treated as [`UserStatus::Pending`] so a corrupted
    /// row never grants access.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "approved" => Self::Approved,
            "blocked" => Self::Blocked,
            _ => Self::Pending,
        }
    }

    /// Status after the administrator presses the toggle button.
    ///
    /// Approved users become blocked; anything else becomes approved.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Approved => Self::Blocked,
            Self::Pending | Self::Blocked => Self::Approved,
        }
    }

    /// Single-glyph marker used in the user roster.
    #[must_use]
    pub const fn marker(&self) -> &'static str {
        match self {
            Self::Approved => "✅",
            Self::Blocked => "❌",
            Self::Pending => "⏳",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique identity.
    pub id: UserId,
    /// Display name captured at first contact (`N/A` when unknown).
    pub display_name: String,
    /// Current lifecycle status.
    pub status: UserStatus,
    /// Unix timestamp (seconds) of the first contact.
    pub requested_at: i64,
}

impl UserRecord {
    /// Creates a pending record stamped with the current time.
    #[must_use]
    pub fn pending(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            status: UserStatus::Pending,
            requested_at: crate::current_timestamp(),
        }
    }

    /// Returns true if the user may use gated features.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == UserStatus::Approved
    }
}
