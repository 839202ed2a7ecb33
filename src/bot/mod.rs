//! The chat bot: inbound events, routing, and replies.
//!
//! Events arrive from the transport's receive loop and are handed to the
//! [`WorkerPool`], which runs them through the [`Router`] one at a time per
//! user. The [`watch_knowledge`] task reloads the knowledge document when it
//! changes on disk.

mod event;
pub mod render;
mod router;
mod watcher;
mod worker;

pub use event::{Inbound, Sender};
pub use render::escape_html;
pub use router::Router;
pub use watcher::watch_knowledge;
pub use worker::WorkerPool;
