//! In-memory transport that records every outbound call.

use super::{ChatTransport, OutboundMessage};
use crate::models::UserId;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A message accepted by [`RecordingTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Recipient chat.
    pub chat: UserId,
    /// The message as sent.
    pub message: OutboundMessage,
}

/// A text replacement accepted by [`RecordingTransport::edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedMessage {
    /// Chat holding the message.
    pub chat: UserId,
    /// Platform message id.
    pub message_id: i64,
    /// Replacement text.
    pub text: String,
}

#[derive(Debug, Default)]
struct Log {
    sent: Vec<SentMessage>,
    edited: Vec<EditedMessage>,
    answered: Vec<String>,
    attempts: Vec<UserId>,
}

/// Records sends, edits and callback answers instead of delivering them.
///
/// Recipients registered with [`RecordingTransport::fail_for`] reject every
/// send. Failed attempts are still counted in [`RecordingTransport::attempts`].
#[derive(Debug, Default)]
pub struct RecordingTransport {
    log: Mutex<Log>,
    failing: Mutex<HashSet<UserId>>,
}

impl RecordingTransport {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `chat` fail.
    pub fn fail_for(&self, chat: UserId) {
        lock(&self.failing).insert(chat);
    }

    /// All successfully sent messages, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.log).sent.clone()
    }

    /// Messages successfully sent to `chat`, in order.
    #[must_use]
    pub fn sent_to(&self, chat: UserId) -> Vec<OutboundMessage> {
        lock(&self.log)
            .sent
            .iter()
            .filter(|s| s.chat == chat)
            .map(|s| s.message.clone())
            .collect()
    }

    /// Text of the last message sent to `chat`.
    #[must_use]
    pub fn last_text(&self, chat: UserId) -> Option<String> {
        self.sent_to(chat).pop().map(|m| m.text)
    }

    /// All edits, in order.
    #[must_use]
    pub fn edited(&self) -> Vec<EditedMessage> {
        lock(&self.log).edited.clone()
    }

    /// Answered callback ids, in order.
    #[must_use]
    pub fn answered(&self) -> Vec<String> {
        lock(&self.log).answered.clone()
    }

    /// Every send attempt's recipient, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> Vec<UserId> {
        lock(&self.log).attempts.clone()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        *lock(&self.log) = Log::default();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, chat: UserId, message: &OutboundMessage) -> Result<()> {
        let failing = lock(&self.failing).contains(&chat);
        let mut log = lock(&self.log);
        log.attempts.push(chat);
        if failing {
            return Err(Error::DeliveryFailed {
                recipient: chat.to_string(),
                cause: "recipient unreachable".to_string(),
            });
        }
        log.sent.push(SentMessage {
            chat,
            message: message.clone(),
        });
        Ok(())
    }

    async fn edit(&self, chat: UserId, message_id: i64, text: &str) -> Result<()> {
        lock(&self.log).edited.push(EditedMessage {
            chat,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        lock(&self.log).answered.push(callback_id.to_string());
        Ok(())
    }
}
