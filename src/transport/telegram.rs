//! Telegram Bot API transport.
//!
//! Delivers messages with `sendMessage`, rewrites admin prompts with
//! `editMessageText` and acknowledges button presses with
//! `answerCallbackQuery`.

use super::{ChatTransport, OutboundMessage};
use crate::models::UserId;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::instrument;

/// Default Bot API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Longest text Telegram accepts in one message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Sends messages through the Telegram Bot API.
pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl TelegramTransport {
    /// Creates a transport whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, bot_token: SecretString, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "build_http_client".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            bot_token,
        })
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.base_url, self.bot_token.expose_secret(), method)
    }

    async fn call(&self, method: &'static str, recipient: &str, body: &Value) -> Result<Value> {
        let failed = |cause: String| Error::DeliveryFailed {
            recipient: recipient.to_string(),
            cause,
        };

        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| failed(format!("{method}: {}", classify_transport_error(&e))))?;

        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        let parsed: Value = serde_json::from_str(&body_text).unwrap_or(Value::Null);
        let ok = parsed
            .get("ok")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| status.is_success());

        metrics::counter!(
            "telegram_requests_total",
            "method" => method,
            "status" => if ok { "success" } else { "error" }
        )
        .increment(1);

        if ok {
            return Ok(parsed);
        }

        let description = parsed
            .get("description")
            .and_then(Value::as_str)
            .map_or_else(|| describe_status(status), ToString::to_string);
        Err(failed(format!("{method}: {description}")))
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    #[instrument(skip(self, message), fields(chat = %chat))]
    async fn send(&self, chat: UserId, message: &OutboundMessage) -> Result<()> {
        let recipient = chat.to_string();
        let chunks = split_text(&message.text, MAX_MESSAGE_CHARS);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({
                "chat_id": chat.get(),
                "text": chunk,
            });
            if message.html {
                body["parse_mode"] = json!("HTML");
            }
            if i == last && !message.buttons.is_empty() {
                body["reply_markup"] = inline_keyboard(message);
            }
            self.call("sendMessage", &recipient, &body).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, text), fields(chat = %chat))]
    async fn edit(&self, chat: UserId, message_id: i64, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": chat.get(),
            "message_id": message_id,
            "text": text,
        });
        self.call("editMessageText", &chat.to_string(), &body)
            .await
            .map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let body = json!({ "callback_query_id": callback_id });
        self.call("answerCallbackQuery", callback_id, &body)
            .await
            .map(|_| ())
    }
}

pub(super) fn api_url(base_url: &str, bot_token: &str, method: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/bot{bot_token}/{method}")
}

pub(super) fn classify_transport_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "request timeout"
    } else if err.is_connect() {
        "connection error"
    } else {
        "request failed"
    }
}

fn describe_status(status: StatusCode) -> String {
    if status == StatusCode::TOO_MANY_REQUESTS {
        "rate limited".to_string()
    } else {
        format!("HTTP {status}")
    }
}

fn inline_keyboard(message: &OutboundMessage) -> Value {
    let rows: Vec<Vec<Value>> = message
        .buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| {
                    json!({
                        "text": button.label,
                        "callback_data": button.action.encode(),
                    })
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Splits `text` into chunks of at most `limit` characters.
///
/// Breaks on line boundaries where possible so HTML tags, which never span
/// lines in rendered replies, stay balanced within a chunk. A single line
/// longer than `limit` is cut before any entity or tag that would straddle
/// the cut.
fn split_text(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            let mut rest = chars.as_slice();
            while rest.len() > limit {
                let cut = markup_safe_cut(&rest[..limit]);
                chunks.push(rest[..cut].iter().collect());
                rest = &rest[cut..];
            }
            if !rest.is_empty() {
                chunks.push(rest.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Length of the longest prefix of `piece` that does not end inside an
/// `&...;` entity or a `<...>` tag.
///
/// Falls back to the full length when the open markup starts the piece, so
/// the split always makes progress.
fn markup_safe_cut(piece: &[char]) -> usize {
    let mut open: Option<(usize, char)> = None;
    for (i, &c) in piece.iter().enumerate() {
        match open {
            None if c == '&' => open = Some((i, ';')),
            None if c == '<' => open = Some((i, '>')),
            Some((_, close)) if c == close => open = None,
            _ => {},
        }
    }
    match open {
        Some((start, _)) if start > 0 => start,
        _ => piece.len(),
    }
}
