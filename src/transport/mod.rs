//! Chat transport boundary.
//!
//! The bot only ever talks to users through [`ChatTransport`]. The Telegram
//! Bot API implementation lives in [`telegram`]; [`recording`] keeps every
//! outbound call in memory for tests and dry runs.

pub mod recording;
pub mod telegram;
mod telegram_receive;

pub use recording::RecordingTransport;
pub use telegram::TelegramTransport;
pub use telegram_receive::TelegramReceiver;

use crate::Result;
use crate::models::{CallbackAction, UserId};
use async_trait::async_trait;

/// An inline button attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Text shown on the button.
    pub label: String,
    /// Action delivered back when the button is pressed.
    pub action: CallbackAction,
}

impl Button {
    /// Creates a button.
    #[must_use]
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// A message to deliver to one chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Message body.
    pub text: String,
    /// Whether `text` is HTML-formatted.
    pub html: bool,
    /// Inline keyboard, one inner vector per row.
    pub buttons: Vec<Vec<Button>>,
}

impl OutboundMessage {
    /// A plain-text message.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// An HTML-formatted message. The caller escapes user-supplied content.
    #[must_use]
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: true,
            buttons: Vec::new(),
        }
    }

    /// Appends a row of buttons.
    #[must_use]
    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        self.buttons.push(row);
        self
    }
}

/// Outbound side of a chat platform.
///
/// Every call addresses a single chat and fails independently; callers that
/// deliver to many users isolate failures per recipient.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends a message to `chat`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeliveryFailed`] if the platform rejects the
    /// message or cannot be reached.
    async fn send(&self, chat: UserId, message: &OutboundMessage) -> Result<()>;

    /// Replaces the text of a message previously sent to `chat`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeliveryFailed`] on failure.
    async fn edit(&self, chat: UserId, message_id: i64, text: &str) -> Result<()>;

    /// Acknowledges a button press so the client stops its spinner.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeliveryFailed`] on failure.
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;
}
