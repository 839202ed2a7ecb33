//! Knowledge entries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the hex token used to address an entry from a callback button.
const TOKEN_LEN: usize = 12;

/// A single keyword → description pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Normalized (trimmed, lower-cased) keyword.
    pub key: String,
    /// Free-text description.
    pub description: String,
}

impl KnowledgeEntry {
    /// Creates an entry, normalizing the key.
    #[must_use]
    pub fn new(key: &str, description: impl Into<String>) -> Self {
        Self {
            key: normalize_key(key),
            description: description.into(),
        }
    }

    /// The key with its first character upper-cased, for display.
    #[must_use]
    pub fn display_key(&self) -> String {
        display_key(&self.key)
    }
}

/// Upper-cases the first character of a keyword for display.
#[must_use]
pub fn display_key(key: &str) -> String {
    let mut chars = key.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Normalizes a keyword or query: trims whitespace and lower-cases.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Short stable token addressing a key in callback payloads.
///
/// Chat transports cap callback payloads at a few dozen bytes, which long or
/// non-ASCII keywords would exceed.
#[must_use]
pub fn callback_token(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut token = hex::encode(digest);
    token.truncate(TOKEN_LEN);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Apple Pie \n"), "apple pie");
        assert_eq!(normalize_key("ПРИМЕР"), "пример");
        assert_eq!(normalize_key("   "), "");
    }

    #[test]
    fn test_display_key() {
        assert_eq!(KnowledgeEntry::new("apple", "").display_key(), "Apple");
        assert_eq!(KnowledgeEntry::new("пример", "").display_key(), "Пример");
        assert_eq!(KnowledgeEntry::new("", "").display_key(), "");
    }

    #[test]
    fn test_callback_token_is_short_and_stable() {
        let token = callback_token("очень длинное ключевое слово с пробелами");
        assert_eq!(token.len(), TOKEN_LEN);
        assert_eq!(token, callback_token("очень длинное ключевое слово с пробелами"));
        assert_ne!(callback_token("apple"), callback_token("banana"));
    }
}
