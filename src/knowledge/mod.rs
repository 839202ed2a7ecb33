//! The knowledge base and its backing document.
//!
//! - [`document`]: line-oriented codec for the backing document and its checksum
//! - [`base`]: the [`KnowledgeBase`] service guarding the in-memory map

pub mod document;
mod base;

pub use base::KnowledgeBase;
pub use document::{DecodedDocument, KnowledgeMap};
