//! Knowledge base change events.

/// A change to the knowledge base that approved users are told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeChange {
    /// A new keyword was added.
    Added {
        /// The normalized keyword.
        key: String,
    },
    /// An existing keyword got a new description.
    Updated {
        /// The normalized keyword.
        key: String,
    },
    /// A keyword was removed.
    Deleted {
        /// The normalized keyword.
        key: String,
    },
    /// A reload of the backing document introduced new keywords.
    Discovered {
        /// The new keywords, in document order.
        keys: Vec<String>,
    },
}

impl KnowledgeChange {
    /// Returns the event type as a string.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
            Self::Discovered { .. } => "discovered",
        }
    }

    /// Returns true when there is nothing to announce.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Discovered { keys } if keys.is_empty())
    }
}
