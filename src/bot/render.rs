//! Reply texts.
//!
//! HTML replies escape every piece of user-supplied content with
//! [`escape_html`]; plain replies are sent verbatim.

use super::event::Sender;
use crate::conversation::{Flow, Rejection, Step};
use crate::models::{
    CallbackAction, HistoryStats, KnowledgeChange, KnowledgeEntry, SearchHistoryRecord, UserId,
    UserRecord, UserStatus, callback_token, display_key,
};
use crate::services::{MAX_RESULTS, SearchResults};
use crate::transport::{Button, OutboundMessage};
use chrono::DateTime;
use std::fmt::Write as _;

/// Escapes `&`, `<`, `>` and `"` for Telegram HTML.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Greeting for an approved user.
#[must_use]
pub fn welcome() -> OutboundMessage {
    OutboundMessage::plain(format!(
        "✅ Welcome!\n\nSend any word to search the knowledge base. \
         You can search by one or two words or by part of a word; \
         the {MAX_RESULTS} best matches are returned."
    ))
}

/// Command overview for the administrator.
#[must_use]
pub fn admin_welcome() -> OutboundMessage {
    OutboundMessage::plain(
        "👑 Administrator commands:\n\
         /add, /edit, /del - manage entries\n\
         /list - browse entries\n\
         /users - user roster\n\
         /adduser <id>, /addusers <id...> - approve users\n\
         /history, /stats - search activity\n\
         /broadcast - message every approved user\n\
         /reload - re-read the knowledge document\n\
         /cancel - abort the current action\n\n\
         Any other text is searched.",
    )
}

/// Confirms that an access request was forwarded.
#[must_use]
pub fn request_sent() -> OutboundMessage {
    OutboundMessage::plain("📨 Your request has been sent to the administrator.")
}

/// Reply to `/start` from a blocked user.
#[must_use]
pub fn access_denied() -> OutboundMessage {
    OutboundMessage::plain("❌ Access denied.")
}

/// Reply to anything else from a user without access.
#[must_use]
pub fn no_access() -> OutboundMessage {
    OutboundMessage::plain("❌ You do not have access.")
}

/// Access request shown to the administrator, with an approve button.
#[must_use]
pub fn access_request(sender: &Sender) -> OutboundMessage {
    let username = sender
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or("—");
    OutboundMessage::plain(format!(
        "📬 New access request:\nID: {}\nName: {}\nUsername: @{username}",
        sender.id, sender.full_name
    ))
    .with_row(vec![Button::new("Approve", CallbackAction::Approve(sender.id))])
}

/// Tells a user their access was granted.
#[must_use]
pub fn approved_notice() -> OutboundMessage {
    OutboundMessage::plain("✅ Your request has been approved! Send /start to begin.")
}

/// Tells a user their access was revoked.
#[must_use]
pub fn revoked_notice() -> OutboundMessage {
    OutboundMessage::plain("❌ Your access has been revoked.")
}

/// Status line the administrator's prompt is rewritten to after a decision.
#[must_use]
pub const fn status_changed(status: UserStatus) -> &'static str {
    match status {
        UserStatus::Approved => "✅ User approved",
        UserStatus::Blocked => "🔒 User blocked",
        UserStatus::Pending => "⏳ User pending",
    }
}

/// Reply to a search made only of whitespace.
#[must_use]
pub fn empty_query() -> OutboundMessage {
    OutboundMessage::plain("🔍 Empty query.")
}

/// Reply to a search with no matches.
#[must_use]
pub fn nothing_found() -> OutboundMessage {
    OutboundMessage::plain("🔍 Nothing found.")
}

/// Search results: bold capitalized key, description below, blank line
/// between entries, and a notice when the list is full.
#[must_use]
pub fn search_results(results: &SearchResults) -> OutboundMessage {
    let mut text = results
        .entries
        .iter()
        .map(|entry| {
            format!(
                "<b>{}</b>\n{}",
                escape_html(&entry.display_key()),
                escape_html(&entry.description)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    if results.is_capped() {
        let _ = write!(text, "\n\n<i>Showing the first {MAX_RESULTS} matches</i>");
    }
    OutboundMessage::html(text)
}

/// Reply to an unrecognized slash command.
#[must_use]
pub fn unknown_command() -> OutboundMessage {
    OutboundMessage::plain("🤷 Unknown command. Send /start")
}

/// Reply to an edit or delete button whose entry is gone.
#[must_use]
pub fn entry_gone() -> OutboundMessage {
    OutboundMessage::plain("🗑 This entry no longer exists.")
}

/// Generic reply when handling failed unexpectedly.
#[must_use]
pub fn apology() -> OutboundMessage {
    OutboundMessage::plain("⚠️ Something went wrong, please try again later.")
}

/// Reply naming what was wrong with the input.
#[must_use]
pub fn invalid_input(detail: &str) -> OutboundMessage {
    OutboundMessage::plain(format!("⚠️ Invalid input: {detail}"))
}

/// Reply naming a missing record by kind and id.
#[must_use]
pub fn not_found(kind: &str, id: &str) -> OutboundMessage {
    OutboundMessage::plain(format!("❌ {} not found: {id}", display_key(kind)))
}

/// User roster with one toggle button per user.
#[must_use]
pub fn roster(records: &[UserRecord]) -> OutboundMessage {
    if records.is_empty() {
        return OutboundMessage::plain("📝 No registered users.");
    }
    let lines: Vec<String> = records
        .iter()
        .map(|r| {
            format!(
                "{} <b>{}</b> — {}",
                r.status.marker(),
                r.id,
                escape_html(&r.display_name)
            )
        })
        .collect();
    let mut message = OutboundMessage::html(format!("📋 Users:\n\n{}", lines.join("\n")));
    for r in records {
        let verb = if r.is_approved() { "Block" } else { "Approve" };
        message = message.with_row(vec![Button::new(
            format!("{verb} {}", r.id),
            CallbackAction::Toggle(r.id),
        )]);
    }
    message
}

/// Entry list with edit and delete buttons per entry.
#[must_use]
pub fn entry_list(entries: &[KnowledgeEntry]) -> OutboundMessage {
    if entries.is_empty() {
        return OutboundMessage::plain("📚 The knowledge base is empty.");
    }
    let lines: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, escape_html(&e.display_key())))
        .collect();
    let mut message = OutboundMessage::html(format!(
        "📚 Entries ({}):\n\n{}",
        entries.len(),
        lines.join("\n")
    ));
    for e in entries {
        let token = callback_token(&e.key);
        let label = e.display_key();
        message = message.with_row(vec![
            Button::new(format!("✏️ {label}"), CallbackAction::EditEntry(token.clone())),
            Button::new(format!("🗑 {label}"), CallbackAction::DeleteEntry(token)),
        ]);
    }
    message
}

/// Recent searches, newest first.
#[must_use]
pub fn history(records: &[SearchHistoryRecord]) -> OutboundMessage {
    if records.is_empty() {
        return OutboundMessage::plain("🕑 No searches yet.");
    }
    let lines: Vec<String> = records
        .iter()
        .map(|r| {
            let when = DateTime::from_timestamp(r.timestamp, 0)
                .map_or_else(|| r.timestamp.to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
            format!(
                "{when} <b>{}</b> ({}): {}",
                r.user_id,
                escape_html(&r.display_name),
                escape_html(&r.query)
            )
        })
        .collect();
    OutboundMessage::html(format!("🕑 Recent searches:\n\n{}", lines.join("\n")))
}

/// Search counts, entry count and user counts by status.
#[must_use]
pub fn stats(history: HistoryStats, entries: usize, users: &[UserRecord]) -> OutboundMessage {
    let count = |status: UserStatus| users.iter().filter(|u| u.status == status).count();
    OutboundMessage::plain(format!(
        "📊 Statistics\n\n\
         Searches today: {}\n\
         Searches total: {}\n\
         Entries: {entries}\n\
         Users: {} approved, {} pending, {} blocked",
        history.today,
        history.total,
        count(UserStatus::Approved),
        count(UserStatus::Pending),
        count(UserStatus::Blocked),
    ))
}

/// Announcement sent to approved users. `None` when there is nothing to say.
#[must_use]
pub fn change_notice(change: &KnowledgeChange) -> Option<OutboundMessage> {
    let text = match change {
        KnowledgeChange::Added { key } => {
            format!("🆕 New entry: <b>{}</b>", escape_html(&display_key(key)))
        },
        KnowledgeChange::Updated { key } => {
            format!("✏️ Entry updated: <b>{}</b>", escape_html(&display_key(key)))
        },
        KnowledgeChange::Deleted { key } => {
            format!("🗑 Entry removed: <b>{}</b>", escape_html(&display_key(key)))
        },
        KnowledgeChange::Discovered { keys } if keys.is_empty() => return None,
        KnowledgeChange::Discovered { keys } => {
            let names: Vec<String> = keys
                .iter()
                .map(|k| format!("<b>{}</b>", escape_html(&display_key(k))))
                .collect();
            format!("🆕 New entries: {}", names.join(", "))
        },
    };
    Some(OutboundMessage::html(text))
}

/// Confirmation for the administrator after a knowledge base change.
#[must_use]
pub fn change_applied(change: &KnowledgeChange, delivered: usize) -> OutboundMessage {
    let what = match change {
        KnowledgeChange::Added { key } => format!("✅ Added \"{key}\""),
        KnowledgeChange::Updated { key } => format!("✅ Updated \"{key}\""),
        KnowledgeChange::Deleted { key } => format!("✅ Deleted \"{key}\""),
        KnowledgeChange::Discovered { keys } => format!("✅ Found {} new entries", keys.len()),
    };
    OutboundMessage::plain(format!("{what}. Notified {delivered} users."))
}

/// Next-step prompt for an open flow.
#[must_use]
pub fn prompt(flow: Flow, step: &Step) -> OutboundMessage {
    let text = match (flow, step) {
        (Flow::Add, Step::AwaitingKey) => "➕ Send the keyword for the new entry (/cancel to abort).".to_string(),
        (Flow::Edit, Step::AwaitingKey) => "✏️ Send the keyword to edit (/cancel to abort).".to_string(),
        (Flow::Delete, Step::AwaitingKey) => "🗑 Send the keyword to delete (/cancel to abort).".to_string(),
        (_, Step::AwaitingDescription { key }) => {
            format!("📝 Send the description for \"{key}\" (/cancel to abort).")
        },
        (Flow::Broadcast, _) => "📢 Send the message for all approved users (/cancel to abort).".to_string(),
        (Flow::Feedback, _) => "💬 Send your message for the administrator (/cancel to abort).".to_string(),
        (_, Step::AwaitingText) => "Send the text (/cancel to abort).".to_string(),
    };
    OutboundMessage::plain(text)
}

/// Re-prompt after input the open flow could not accept.
#[must_use]
pub fn rejection(rejection: &Rejection) -> OutboundMessage {
    match rejection {
        Rejection::EmptyInput => OutboundMessage::plain("⚠️ The message is empty, try again (/cancel to abort)."),
        Rejection::UnknownKey(key) => OutboundMessage::plain(format!(
            "❌ Keyword not found: {key}. Send another one (/cancel to abort)."
        )),
    }
}

/// Reply when another flow is already open.
#[must_use]
pub fn busy(open: Flow) -> OutboundMessage {
    OutboundMessage::plain(format!(
        "⏳ Finish or /cancel the current action first ({open})."
    ))
}

/// Confirms `/cancel`, or says there was nothing open.
#[must_use]
pub fn cancelled(flow: Option<Flow>) -> OutboundMessage {
    match flow {
        Some(flow) => OutboundMessage::plain(format!("🚫 Cancelled {flow}.")),
        None => OutboundMessage::plain("Nothing to cancel."),
    }
}

/// Administrator announcement as delivered to users.
#[must_use]
pub fn broadcast(text: &str) -> OutboundMessage {
    OutboundMessage::plain(format!("📢 {text}"))
}

/// Delivery count reported back after a broadcast.
#[must_use]
pub fn broadcast_done(delivered: usize, total: usize) -> OutboundMessage {
    OutboundMessage::plain(format!("📢 Delivered to {delivered} of {total} users."))
}

/// Feedback forwarded to the administrator.
#[must_use]
pub fn feedback(sender: &Sender, text: &str) -> OutboundMessage {
    OutboundMessage::plain(format!(
        "💬 Feedback from {} ({}, {}):\n\n{text}",
        sender.full_name,
        sender.display_name(),
        sender.id
    ))
}

/// Confirms that feedback reached the administrator.
#[must_use]
pub fn feedback_sent() -> OutboundMessage {
    OutboundMessage::plain("✅ Your message has been sent to the administrator.")
}

/// Confirms a batch approval with the approved ids.
#[must_use]
pub fn users_added(ids: &[UserId]) -> OutboundMessage {
    let list: Vec<String> = ids.iter().map(ToString::to_string).collect();
    OutboundMessage::plain(format!("✅ Approved {} users: {}", ids.len(), list.join(", ")))
}

/// Summary of a manual reload for the administrator.
#[must_use]
pub fn reload_report(new_keys: &[String], delivered: usize) -> OutboundMessage {
    if new_keys.is_empty() {
        OutboundMessage::plain("🔄 Reloaded. No new entries.")
    } else {
        OutboundMessage::plain(format!(
            "🔄 Reloaded. {} new entries: {}. Notified {delivered} users.",
            new_keys.len(),
            new_keys.join(", ")
        ))
    }
}
