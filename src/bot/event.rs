//! Inbound events as seen by the router.

use crate::models::UserId;

/// Display name stored for users without a username.
const NO_USERNAME: &str = "N/A";

/// The user behind an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Platform identity; replies are addressed to it.
    pub id: UserId,
    /// First and last name as shown by the client.
    pub full_name: String,
    /// Public handle, without the leading `@`.
    pub username: Option<String>,
}

impl Sender {
    /// Creates a sender without a username.
    #[must_use]
    pub fn new(id: impl Into<UserId>, full_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            full_name: full_name.into(),
            username: None,
        }
    }

    /// Sets the username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Name recorded in the user roster and search history.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(NO_USERNAME)
    }
}

/// One inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text message (command or free text).
    Message {
        /// Who sent it.
        sender: Sender,
        /// Raw message text.
        text: String,
    },
    /// An inline button press.
    Callback {
        /// Who pressed it.
        sender: Sender,
        /// Platform id used to acknowledge the press.
        callback_id: String,
        /// The message carrying the button, if still available.
        message_id: Option<i64>,
        /// Raw callback payload.
        data: String,
    },
}

impl Inbound {
    /// Convenience constructor for a text message.
    #[must_use]
    pub fn message(sender: Sender, text: impl Into<String>) -> Self {
        Self::Message {
            sender,
            text: text.into(),
        }
    }

    /// Convenience constructor for a button press.
    #[must_use]
    pub fn callback(sender: Sender, data: impl Into<String>) -> Self {
        Self::Callback {
            sender,
            callback_id: String::new(),
            message_id: None,
            data: data.into(),
        }
    }

    /// The user behind the event.
    #[must_use]
    pub const fn sender(&self) -> &Sender {
        match self {
            Self::Message { sender, .. } | Self::Callback { sender, .. } => sender,
        }
    }
}
