//! Routes inbound events to services and replies.

use super::event::{Inbound, Sender};
use super::render;
use crate::conversation::{Completed, ConversationStateMachine, Flow, Transition};
use crate::knowledge::KnowledgeBase;
use crate::models::{
    CallbackAction, Command, KnowledgeChange, UserId, UserStatus, normalize_key, parse_user_ids,
};
use crate::services::{AccessControl, AccessOutcome, NotificationFanout, SearchHistoryLog, search};
use crate::transport::OutboundMessage;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Dispatches every inbound event for the bot.
///
/// # Error Policy
///
/// Every failure inside a handler is caught in [`Router::handle`], logged
/// with full detail, and answered with a short reply. Unknown users and
/// keywords are named (only the administrator can trigger them); every other
/// failure gets a generic apology.
pub struct Router {
    access: AccessControl,
    knowledge: Arc<KnowledgeBase>,
    history: SearchHistoryLog,
    conversations: ConversationStateMachine,
    fanout: NotificationFanout,
}

impl Router {
    /// Creates a router over the given services.
    #[must_use]
    pub fn new(
        access: AccessControl,
        knowledge: Arc<KnowledgeBase>,
        history: SearchHistoryLog,
        fanout: NotificationFanout,
    ) -> Self {
        Self {
            access,
            knowledge,
            history,
            conversations: ConversationStateMachine::new(),
            fanout,
        }
    }

    /// The knowledge base served by this router.
    #[must_use]
    pub const fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// The access-control service.
    #[must_use]
    pub const fn access(&self) -> &AccessControl {
        &self.access
    }

    /// The conversation state machine.
    #[must_use]
    pub const fn conversations(&self) -> &ConversationStateMachine {
        &self.conversations
    }

    /// Handles one inbound event. Never fails.
    pub async fn handle(&self, event: Inbound) {
        let sender = event.sender().id;
        let kind = match &event {
            Inbound::Message { .. } => "message",
            Inbound::Callback { .. } => "callback",
        };
        let start = Instant::now();

        let result = self.dispatch(event).await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("bot_events_total", "kind" => kind, "status" => status).increment(1);
        metrics::histogram!("bot_event_duration_ms", "kind" => kind)
            .record(start.elapsed().as_secs_f64() * 1000.0);

        if let Err(e) = result {
            tracing::error!(user.id = %sender, error = %e, "Event handler failed");
            self.reply(sender, &error_reply(&e)).await;
        }
    }

    async fn dispatch(&self, event: Inbound) -> Result<()> {
        match event {
            Inbound::Message { sender, text } => {
                if let Some(command) = Command::parse(&text) {
                    self.handle_command(&sender, command).await
                } else if self.conversations.is_active(sender.id) {
                    self.handle_flow_input(&sender, &text).await
                } else {
                    self.handle_search(&sender, &text).await
                }
            },
            Inbound::Callback {
                sender,
                callback_id,
                message_id,
                data,
            } => {
                if !callback_id.is_empty() {
                    if let Err(e) = self.fanout.transport().answer_callback(&callback_id).await {
                        tracing::debug!(error = %e, "Failed to answer callback");
                    }
                }
                self.handle_callback(&sender, message_id, &data).await
            },
        }
    }

    #[instrument(skip(self, sender), fields(user.id = %sender.id))]
    async fn handle_command(&self, sender: &Sender, command: Command) -> Result<()> {
        if command.is_admin_only() && !self.access.is_admin(sender.id) {
            tracing::debug!(user.id = %sender.id, ?command, "Ignoring administrator command");
            return Ok(());
        }

        match command {
            Command::Start => self.handle_start(sender).await,
            Command::Cancel => {
                let flow = self.conversations.cancel(sender.id);
                self.reply(sender.id, &render::cancelled(flow)).await;
                Ok(())
            },
            Command::Feedback => {
                if !self.access.is_authorized(sender.id) {
                    self.reply(sender.id, &render::no_access()).await;
                    return Ok(());
                }
                self.begin_flow(sender.id, Flow::Feedback).await;
                Ok(())
            },
            Command::Unknown(_) => {
                self.reply(sender.id, &render::unknown_command()).await;
                Ok(())
            },
            Command::AddUser(args) | Command::AddUsers(args) => {
                let ids = parse_user_ids(&args)?;
                self.access.force_approve(&ids)?;
                self.reply(sender.id, &render::users_added(&ids)).await;
                Ok(())
            },
            Command::Add => {
                self.begin_flow(sender.id, Flow::Add).await;
                Ok(())
            },
            Command::Edit => {
                self.begin_flow(sender.id, Flow::Edit).await;
                Ok(())
            },
            Command::Delete => {
                self.begin_flow(sender.id, Flow::Delete).await;
                Ok(())
            },
            Command::Broadcast => {
                self.begin_flow(sender.id, Flow::Broadcast).await;
                Ok(())
            },
            Command::List => {
                let entries = self.knowledge.snapshot();
                self.reply(sender.id, &render::entry_list(&entries)).await;
                Ok(())
            },
            Command::History => {
                let records = self.history.recent()?;
                self.reply(sender.id, &render::history(&records)).await;
                Ok(())
            },
            Command::Stats => {
                let stats = self.history.stats()?;
                let users = self.access.roster()?;
                let message = render::stats(stats, self.knowledge.len(), &users);
                self.reply(sender.id, &message).await;
                Ok(())
            },
            Command::Users => {
                let users = self.access.roster()?;
                self.reply(sender.id, &render::roster(&users)).await;
                Ok(())
            },
            Command::Reload => {
                let (new_keys, delivered) = self.reload_and_announce().await;
                self.reply(sender.id, &render::reload_report(&new_keys, delivered))
                    .await;
                Ok(())
            },
        }
    }

    async fn handle_start(&self, sender: &Sender) -> Result<()> {
        if self.access.is_admin(sender.id) {
            self.reply(sender.id, &render::admin_welcome()).await;
            return Ok(());
        }

        let reply = match self.access.request_access(sender.id, sender.display_name())? {
            AccessOutcome::AlreadyApproved => render::welcome(),
            AccessOutcome::AlreadyBlocked => render::access_denied(),
            AccessOutcome::NewlyPending => {
                self.fanout
                    .notify(self.access.admin(), &render::access_request(sender))
                    .await;
                render::request_sent()
            },
            AccessOutcome::StillPending => render::request_sent(),
        };
        self.reply(sender.id, &reply).await;
        Ok(())
    }

    async fn begin_flow(&self, user: UserId, flow: Flow) {
        let reply = match self.conversations.begin(user, flow) {
            Ok(step) => render::prompt(flow, &step),
            Err(busy) => render::busy(busy.open),
        };
        self.reply(user, &reply).await;
    }

    #[instrument(skip(self, sender, text), fields(user.id = %sender.id))]
    async fn handle_search(&self, sender: &Sender, text: &str) -> Result<()> {
        if !self.access.is_authorized(sender.id) {
            self.reply(sender.id, &render::no_access()).await;
            return Ok(());
        }

        let query = normalize_key(text);
        if query.is_empty() {
            self.reply(sender.id, &render::empty_query()).await;
            return Ok(());
        }

        let results = self.knowledge.with_entries(|entries| search(entries, &query));
        if let Err(e) = self.history.record(sender.id, sender.display_name(), &query) {
            tracing::warn!(user.id = %sender.id, error = %e, "Failed to record search history");
        }
        tracing::debug!(user.id = %sender.id, results = results.entries.len(), "Search served");

        let reply = if results.is_empty() {
            render::nothing_found()
        } else {
            render::search_results(&results)
        };
        self.reply(sender.id, &reply).await;
        Ok(())
    }

    async fn handle_flow_input(&self, sender: &Sender, text: &str) -> Result<()> {
        if !self.access.is_authorized(sender.id) {
            self.conversations.cancel(sender.id);
            self.reply(sender.id, &render::no_access()).await;
            return Ok(());
        }

        let Some(flow) = self.conversations.current(sender.id).map(|s| s.flow) else {
            return self.handle_search(sender, text).await;
        };
        let transition = self
            .conversations
            .advance(sender.id, text, |key| self.knowledge.contains(key));

        match transition {
            None => self.handle_search(sender, text).await,
            Some(Transition::Next(step)) => {
                self.reply(sender.id, &render::prompt(flow, &step)).await;
                Ok(())
            },
            Some(Transition::Retry(rejection)) => {
                self.reply(sender.id, &render::rejection(&rejection)).await;
                Ok(())
            },
            Some(Transition::Done(completed)) => self.complete(sender, completed).await,
        }
    }

    async fn complete(&self, sender: &Sender, completed: Completed) -> Result<()> {
        let change = match completed {
            Completed::AddEntry { key, description } => self.knowledge.add(&key, &description)?,
            Completed::EditEntry { key, description } => {
                self.knowledge.update(&key, &description)?
            },
            Completed::DeleteEntry { key } => self.knowledge.delete(&key)?,
            Completed::Broadcast { text } => {
                let recipients = self.access.approved_users()?;
                let delivered = self
                    .fanout
                    .broadcast(&recipients, &render::broadcast(&text))
                    .await;
                self.reply(sender.id, &render::broadcast_done(delivered, recipients.len()))
                    .await;
                return Ok(());
            },
            Completed::Feedback { text } => {
                self.fanout
                    .notify(self.access.admin(), &render::feedback(sender, &text))
                    .await;
                self.reply(sender.id, &render::feedback_sent()).await;
                return Ok(());
            },
        };

        let delivered = self.announce(&change).await;
        self.reply(sender.id, &render::change_applied(&change, delivered))
            .await;
        Ok(())
    }

    #[instrument(skip(self, sender), fields(user.id = %sender.id))]
    async fn handle_callback(&self, sender: &Sender, message_id: Option<i64>, data: &str) -> Result<()> {
        if !self.access.is_admin(sender.id) {
            tracing::debug!(user.id = %sender.id, "Ignoring callback from non-administrator");
            return Ok(());
        }
        let Some(action) = CallbackAction::parse(data) else {
            tracing::warn!(data, "Unrecognized callback payload");
            return Ok(());
        };

        match action {
            CallbackAction::Approve(user) => {
                self.access.approve(user)?;
                self.update_prompt(sender.id, message_id, render::status_changed(UserStatus::Approved))
                    .await;
                self.fanout.notify(user, &render::approved_notice()).await;
            },
            CallbackAction::Toggle(user) => {
                let status = self.access.toggle(user)?;
                self.update_prompt(sender.id, message_id, render::status_changed(status))
                    .await;
                let notice = if status == UserStatus::Blocked {
                    render::revoked_notice()
                } else {
                    render::approved_notice()
                };
                self.fanout.notify(user, &notice).await;
            },
            CallbackAction::EditEntry(token) => {
                let Some(key) = self.knowledge.key_for_token(&token) else {
                    self.reply(sender.id, &render::entry_gone()).await;
                    return Ok(());
                };
                let reply = match self.conversations.begin_edit_of(sender.id, &key) {
                    Ok(step) => render::prompt(Flow::Edit, &step),
                    Err(busy) => render::busy(busy.open),
                };
                self.reply(sender.id, &reply).await;
            },
            CallbackAction::DeleteEntry(token) => {
                let Some(key) = self.knowledge.key_for_token(&token) else {
                    self.reply(sender.id, &render::entry_gone()).await;
                    return Ok(());
                };
                let change = self.knowledge.delete(&key)?;
                let delivered = self.announce(&change).await;
                self.reply(sender.id, &render::change_applied(&change, delivered))
                    .await;
            },
        }
        Ok(())
    }

    /// Announces a knowledge base change to every approved user.
    ///
    /// Returns the number of successful deliveries.
    pub async fn announce(&self, change: &KnowledgeChange) -> usize {
        let Some(message) = render::change_notice(change) else {
            return 0;
        };
        let recipients = match self.access.approved_users() {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::error!(error = %e, "Cannot load notification audience");
                return 0;
            },
        };
        tracing::info!(
            change = change.event_type(),
            recipients = recipients.len(),
            "Announcing knowledge change"
        );
        self.fanout.broadcast(&recipients, &message).await
    }

    /// Re-reads the backing document and announces keys it introduced.
    ///
    /// Returns the new keys and the number of successful deliveries.
    pub async fn reload_and_announce(&self) -> (Vec<String>, usize) {
        let new_keys = self.knowledge.reload_and_diff();
        if new_keys.is_empty() {
            return (new_keys, 0);
        }
        let change = KnowledgeChange::Discovered {
            keys: new_keys.clone(),
        };
        let delivered = self.announce(&change).await;
        (new_keys, delivered)
    }

    /// Tells `user` their last request failed unexpectedly.
    pub async fn apologize(&self, user: UserId) {
        self.reply(user, &render::apology()).await;
    }

    /// Rewrites the message holding the pressed button, or sends a new one.
    async fn update_prompt(&self, chat: UserId, message_id: Option<i64>, text: &str) {
        if let Some(message_id) = message_id {
            match self.fanout.transport().edit(chat, message_id, text).await {
                Ok(()) => return,
                Err(e) => tracing::debug!(error = %e, "Failed to edit message, sending instead"),
            }
        }
        self.reply(chat, &OutboundMessage::plain(text)).await;
    }

    async fn reply(&self, chat: UserId, message: &OutboundMessage) {
        self.fanout.notify(chat, message).await;
    }
}

fn error_reply(error: &Error) -> OutboundMessage {
    match error {
        Error::NotFound { kind, id } => render::not_found(kind, id),
        Error::InvalidInput(detail) => render::invalid_input(detail),
        Error::AccessDenied => render::no_access(),
        Error::DeliveryFailed { .. } | Error::OperationFailed { .. } => render::apology(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use crate::transport::RecordingTransport;
    use std::time::Duration;
    use tempfile::TempDir;

    const ADMIN: UserId = UserId::new(1);

    struct Harness {
        router: Router,
        transport: Arc<RecordingTransport>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let transport = Arc::new(RecordingTransport::new());
        let knowledge = Arc::new(KnowledgeBase::open(dir.path().join("data.kb")));
        let router = Router::new(
            AccessControl::new(store.clone(), ADMIN),
            knowledge,
            SearchHistoryLog::new(store),
            NotificationFanout::new(
                transport.clone(),
                Duration::ZERO,
                Duration::from_secs(1),
            ),
        );
        Harness {
            router,
            transport,
            _dir: dir,
        }
    }

    fn admin() -> Sender {
        Sender::new(ADMIN, "Admin")
    }

    #[tokio::test]
    async fn test_non_admin_commands_are_silent() {
        let h = harness();
        let user = Sender::new(5, "Eve");
        h.router.handle(Inbound::message(user, "/users")).await;
        h.router.handle(Inbound::callback(Sender::new(5, "Eve"), "approve_5")).await;
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_reply() {
        let h = harness();
        h.router.handle(Inbound::message(Sender::new(5, "Eve"), "/nope")).await;
        assert_eq!(
            h.transport.last_text(UserId::new(5)).as_deref(),
            Some("🤷 Unknown command. Send /start")
        );
    }

    #[tokio::test]
    async fn test_unknown_user_is_named_to_admin() {
        let h = harness();
        h.router.handle(Inbound::callback(admin(), "toggle_404")).await;
        assert_eq!(
            h.transport.last_text(ADMIN).as_deref(),
            Some("❌ User not found: 404")
        );
    }

    #[tokio::test]
    async fn test_invalid_ids_get_corrective_reply() {
        let h = harness();
        h.router.handle(Inbound::message(admin(), "/adduser abc")).await;
        let text = h.transport.last_text(ADMIN).expect("reply");
        assert!(text.starts_with("⚠️ Invalid input"));
    }

    #[tokio::test]
    async fn test_adduser_approves() {
        let h = harness();
        h.router.handle(Inbound::message(admin(), "/addusers 7, 8")).await;
        assert!(h.router.access().is_approved(UserId::new(7)));
        assert!(h.router.access().is_approved(UserId::new(8)));
    }

    #[tokio::test]
    async fn test_second_flow_refused_until_cancel() {
        let h = harness();
        h.router.handle(Inbound::message(admin(), "/add")).await;
        h.router.handle(Inbound::message(admin(), "/del")).await;
        let text = h.transport.last_text(ADMIN).expect("reply");
        assert!(text.contains("Finish or /cancel the current action first"));

        h.router.handle(Inbound::message(admin(), "/cancel")).await;
        assert!(!h.router.conversations().is_active(ADMIN));
        h.router.handle(Inbound::message(admin(), "/del")).await;
        assert!(h.router.conversations().is_active(ADMIN));
    }

    #[tokio::test]
    async fn test_list_buttons_edit_and_delete() {
        let h = harness();
        h.router.knowledge().add("apple", "A fruit.").expect("add");
        let token = crate::models::callback_token("apple");

        h.router
            .handle(Inbound::callback(admin(), format!("e_{token}")))
            .await;
        h.router.handle(Inbound::message(admin(), "Red fruit.")).await;
        assert_eq!(h.router.knowledge().get("apple").as_deref(), Some("Red fruit."));

        h.router
            .handle(Inbound::callback(admin(), format!("d_{token}")))
            .await;
        assert!(!h.router.knowledge().contains("apple"));
    }

    #[tokio::test]
    async fn test_stale_entry_buttons_say_entry_is_gone() {
        let h = harness();
        let token = crate::models::callback_token("apple");
        let before = h.router.knowledge().len();

        for data in [format!("e_{token}"), format!("d_{token}")] {
            h.router.handle(Inbound::callback(admin(), data)).await;
            assert_eq!(
                h.transport.last_text(ADMIN).as_deref(),
                Some("🗑 This entry no longer exists.")
            );
        }
        assert_eq!(h.router.knowledge().len(), before);
        assert!(!h.router.conversations().is_active(ADMIN));
    }

    #[tokio::test]
    async fn test_feedback_reaches_admin() {
        let h = harness();
        let user = UserId::new(9);
        h.router.access().force_approve(&[user]).expect("approve");

        h.router.handle(Inbound::message(Sender::new(9, "Fay"), "/feedback")).await;
        h.router.handle(Inbound::message(Sender::new(9, "Fay"), "Great bot")).await;

        let forwarded = h.transport.last_text(ADMIN).expect("forwarded");
        assert!(forwarded.contains("Great bot"));
        assert!(forwarded.contains("Fay"));
    }

    #[tokio::test]
    async fn test_toggle_notifies_user() {
        let h = harness();
        let user = UserId::new(3);
        h.router.access().force_approve(&[user]).expect("approve");

        h.router.handle(Inbound::callback(admin(), "toggle_3")).await;
        assert_eq!(
            h.router.access().get(user).expect("get").map(|r| r.status),
            Some(UserStatus::Blocked)
        );
        assert_eq!(
            h.transport.last_text(user).as_deref(),
            Some("❌ Your access has been revoked.")
        );
    }
}
