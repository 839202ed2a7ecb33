//! Session types for multi-step flows.

use std::fmt;

/// A multi-step interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Add a knowledge entry: key, then description.
    Add,
    /// Edit a knowledge entry: existing key, then new description.
    Edit,
    /// Delete a knowledge entry: existing key.
    Delete,
    /// Administrator message to every approved user.
    Broadcast,
    /// User message to the administrator.
    Feedback,
}

impl Flow {
    /// The step a freshly opened flow waits in.
    #[must_use]
    pub const fn first_step(self) -> Step {
        match self {
            Self::Add | Self::Edit | Self::Delete => Step::AwaitingKey,
            Self::Broadcast | Self::Feedback => Step::AwaitingText,
        }
    }

    /// Returns the flow name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Broadcast => "broadcast",
            Self::Feedback => "feedback",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the open flow expects next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A keyword.
    AwaitingKey,
    /// A description for the keyword already collected.
    AwaitingDescription {
        /// Normalized keyword from the previous step.
        key: String,
    },
    /// Free text (broadcast or feedback body).
    AwaitingText,
}

/// One user's open flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The flow being run.
    pub flow: Flow,
    /// Current step, carrying any input collected so far.
    pub step: Step,
}

impl Session {
    /// Opens `flow` at its first step.
    #[must_use]
    pub const fn new(flow: Flow) -> Self {
        Self {
            flow,
            step: flow.first_step(),
        }
    }
}
