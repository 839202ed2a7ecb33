//! The per-user conversation state machine.

use super::session::{Flow, Session, Step};
use crate::models::{UserId, normalize_key};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::instrument;

/// A flow is already open for this user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy {
    /// The flow that is still open.
    pub open: Flow,
}

/// Why a message did not advance the flow. The session stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The message was blank.
    EmptyInput,
    /// Edit or delete named a keyword that does not exist.
    UnknownKey(String),
}

/// The terminal action of a finished flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completed {
    /// Add (or overwrite) an entry.
    AddEntry {
        /// Normalized keyword.
        key: String,
        /// Trimmed description.
        description: String,
    },
    /// Replace the description of an existing entry.
    EditEntry {
        /// Normalized keyword.
        key: String,
        /// Trimmed description.
        description: String,
    },
    /// Remove an entry.
    DeleteEntry {
        /// Normalized keyword.
        key: String,
    },
    /// Send text to every approved user.
    Broadcast {
        /// Message body.
        text: String,
    },
    /// Forward text to the administrator.
    Feedback {
        /// Message body.
        text: String,
    },
}

/// Result of feeding one message into an open flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Moved to the next step.
    Next(Step),
    /// Input rejected; still waiting in the same step.
    Retry(Rejection),
    /// Flow finished and the session is gone; the caller runs the action.
    Done(Completed),
}

/// Owns every open session, at most one per user.
///
/// Sessions live only in memory and vanish on restart. Starting a flow while
/// another is open is refused; [`ConversationStateMachine::cancel`] is the
/// way out.
#[derive(Debug, Default)]
pub struct ConversationStateMachine {
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl ConversationStateMachine {
    /// Creates an empty state machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `flow` for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`Busy`] if the user already has an open flow; it is left untouched.
    #[instrument(skip(self))]
    pub fn begin(&self, user: UserId, flow: Flow) -> Result<Step, Busy> {
        self.open(user, Session::new(flow))
    }

    /// Opens an edit flow with the keyword already chosen.
    ///
    /// # Errors
    ///
    /// Returns [`Busy`] if the user already has an open flow.
    pub fn begin_edit_of(&self, user: UserId, key: &str) -> Result<Step, Busy> {
        self.open(
            user,
            Session {
                flow: Flow::Edit,
                step: Step::AwaitingDescription {
                    key: normalize_key(key),
                },
            },
        )
    }

    fn open(&self, user: UserId, session: Session) -> Result<Step, Busy> {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(&user) {
            return Err(Busy {
                open: existing.flow,
            });
        }
        let step = session.step.clone();
        metrics::counter!("conversation_flows_total", "flow" => session.flow.as_str(), "event" => "started")
            .increment(1);
        sessions.insert(user, session);
        Ok(step)
    }

    /// Discards the user's open flow. A no-op without one.
    ///
    /// Returns the flow that was cancelled.
    pub fn cancel(&self, user: UserId) -> Option<Flow> {
        let cancelled = self.lock().remove(&user).map(|s| s.flow);
        if let Some(flow) = cancelled {
            tracing::debug!(user.id = %user, flow = %flow, "Conversation cancelled");
            metrics::counter!("conversation_flows_total", "flow" => flow.as_str(), "event" => "cancelled")
                .increment(1);
        }
        cancelled
    }

    /// Returns true if `user` has an open flow.
    #[must_use]
    pub fn is_active(&self, user: UserId) -> bool {
        self.lock().contains_key(&user)
    }

    /// A copy of the user's open session.
    #[must_use]
    pub fn current(&self, user: UserId) -> Option<Session> {
        self.lock().get(&user).cloned()
    }

    /// Feeds the next message from `user` into their open flow.
    ///
    /// `key_exists` is consulted when an edit or delete flow receives its
    /// keyword. Returns `None` if the user has no open flow.
    pub fn advance(
        &self,
        user: UserId,
        text: &str,
        key_exists: impl FnOnce(&str) -> bool,
    ) -> Option<Transition> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&user)?;
        let flow = session.flow;

        let transition = match &session.step {
            Step::AwaitingKey => {
                let key = normalize_key(text);
                if key.is_empty() {
                    Transition::Retry(Rejection::EmptyInput)
                } else if flow != Flow::Add && !key_exists(&key) {
                    Transition::Retry(Rejection::UnknownKey(key))
                } else if flow == Flow::Delete {
                    Transition::Done(Completed::DeleteEntry { key })
                } else {
                    Transition::Next(Step::AwaitingDescription { key })
                }
            },
            Step::AwaitingDescription { key } => {
                let description = text.trim();
                if description.is_empty() {
                    Transition::Retry(Rejection::EmptyInput)
                } else {
                    let key = key.clone();
                    let description = description.to_string();
                    Transition::Done(if flow == Flow::Add {
                        Completed::AddEntry { key, description }
                    } else {
                        Completed::EditEntry { key, description }
                    })
                }
            },
            Step::AwaitingText => {
                let body = text.trim();
                if body.is_empty() {
                    Transition::Retry(Rejection::EmptyInput)
                } else if flow == Flow::Broadcast {
                    Transition::Done(Completed::Broadcast {
                        text: body.to_string(),
                    })
                } else {
                    Transition::Done(Completed::Feedback {
                        text: body.to_string(),
                    })
                }
            },
        };

        match &transition {
            Transition::Next(step) => session.step = step.clone(),
            Transition::Done(_) => {
                sessions.remove(&user);
                metrics::counter!("conversation_flows_total", "flow" => flow.as_str(), "event" => "completed")
                    .increment(1);
            },
            Transition::Retry(_) => {},
        }
        Some(transition)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
