//! Telegram long-polling receive loop.

use super::telegram::{api_url, classify_transport_error};
use crate::bot::{Inbound, Sender};
use crate::models::UserId;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Long-poll timeout passed to `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 30;
/// Client-side request timeout (must exceed poll timeout).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 10);
/// Backoff between failed poll attempts.
const ERROR_BACKOFF: Duration = Duration::from_secs(3);
/// Consecutive failures logged before going quiet until recovery.
const LOGGED_ERRORS: u32 = 3;

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    update_id: Option<i64>,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    from: Option<User>,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    #[serde(default, rename = "type")]
    chat_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    data: Option<String>,
}

impl User {
    fn to_sender(&self) -> Sender {
        let full_name = match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        };
        Sender {
            id: UserId::new(self.id),
            full_name,
            username: self.username.clone(),
        }
    }
}

/// Pulls updates from `getUpdates` and hands each one to a dispatcher.
pub struct TelegramReceiver {
    client: reqwest::Client,
    updates_url: String,
}

impl TelegramReceiver {
    /// Creates a receiver for the given Bot API endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, bot_token: &SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "build_http_client".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            client,
            updates_url: api_url(base_url, bot_token.expose_secret(), "getUpdates"),
        })
    }

    /// Polls until `shutdown` flips to `true`.
    ///
    /// Every update advances the offset, whether or not it carried anything
    /// the bot handles, so nothing is redelivered after a restart.
    pub async fn run<F>(self, dispatch: F, mut shutdown: watch::Receiver<bool>)
    where
        F: Fn(Inbound) + Send + Sync,
    {
        info!("Telegram receive loop started");

        let mut offset: Option<i64> = None;
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let request_url = build_poll_request_url(&self.updates_url, offset);
            let outcome = tokio::select! {
                outcome = self.poll(&request_url) => outcome,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                },
            };

            match outcome {
                Ok(updates) => {
                    if consecutive_errors > 0 {
                        info!(errors = consecutive_errors, "Telegram receive loop recovered");
                        consecutive_errors = 0;
                    }
                    for update in updates {
                        offset = next_offset_after_update(offset, update.update_id);
                        if let Some(inbound) = extract_inbound(update) {
                            dispatch(inbound);
                        }
                    }
                    debug!("Telegram long-poll request completed");
                },
                Err(message) => {
                    consecutive_errors += 1;
                    metrics::counter!("telegram_poll_errors_total").increment(1);
                    if consecutive_errors <= LOGGED_ERRORS {
                        warn!(error = %message, "Telegram getUpdates failed");
                    } else if consecutive_errors == LOGGED_ERRORS + 1 {
                        warn!("Telegram receive errors continuing, suppressing logs until recovery");
                    }
                    tokio::select! {
                        () = tokio::time::sleep(ERROR_BACKOFF) => {},
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        },
                    }
                },
            }
        }

        info!("Telegram receive loop shutting down");
    }

    async fn poll(&self, url: &str) -> std::result::Result<Vec<Update>, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e).to_string())?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let payload = resp
            .json::<GetUpdatesResponse>()
            .await
            .map_err(|e| format!("failed to parse getUpdates response: {e}"))?;
        if !payload.ok {
            return Err(payload
                .description
                .unwrap_or_else(|| "getUpdates returned ok=false".to_string()));
        }
        Ok(payload.result)
    }
}

fn build_poll_request_url(updates_url: &str, offset: Option<i64>) -> String {
    let mut url = format!("{updates_url}?timeout={POLL_TIMEOUT_SECS}");
    if let Some(offset) = offset {
        url.push_str("&offset=");
        url.push_str(&offset.to_string());
    }
    url
}

fn next_offset_after_update(current: Option<i64>, update_id: Option<i64>) -> Option<i64> {
    let Some(update_id) = update_id else {
        return current;
    };
    let next = update_id.saturating_add(1);
    Some(current.map_or(next, |current| current.max(next)))
}

/// Converts an update into an inbound event.
///
/// Only private chats are served: replies go to the sender's own chat.
/// Messages from bots and updates without text or payload are skipped.
fn extract_inbound(update: Update) -> Option<Inbound> {
    if let Some(query) = update.callback_query {
        if query.from.is_bot {
            return None;
        }
        return Some(Inbound::Callback {
            sender: query.from.to_sender(),
            callback_id: query.id,
            message_id: query.message.map(|m| m.message_id),
            data: query.data?,
        });
    }

    let message = update.message?;
    if message
        .chat
        .chat_type
        .as_deref()
        .is_some_and(|t| t != "private")
    {
        return None;
    }
    let from = message.from.filter(|u| !u.is_bot)?;
    let text = message.text.filter(|t| !t.is_empty())?;
    Some(Inbound::Message {
        sender: from.to_sender(),
        text,
    })
}
