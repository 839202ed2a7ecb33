//! Multi-step conversations.
//!
//! Administrative edits, broadcasts and feedback need more than one message.
//! Each user has at most one open [`Session`]; the [`ConversationStateMachine`]
//! advances it on the user's next message and hands back the terminal action
//! once the flow completes.

mod machine;
mod session;

pub use machine::{Busy, Completed, ConversationStateMachine, Rejection, Transition};
pub use session::{Flow, Session, Step};
