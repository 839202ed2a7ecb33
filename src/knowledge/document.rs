//! Backing document codec.
//!
//! The document is UTF-8 text with one paragraph per line. A record is a
//! keyword line immediately followed by a description line:
//!
//! ```text
//! Keyword: apple
//! Description: A fruit.
//! ```
//!
//! Decoding never fails. Records that break the keyword/description
//! alternation are dropped and counted; lines that carry neither prefix are
//! ignored. The Russian prefixes `Ключевое слово:` / `Описание:` are accepted
//! on decode; encode always writes the English ones.

use crate::models::normalize_key;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

/// Ordered keyword → description map. Iteration order is insertion order.
pub type KnowledgeMap = IndexMap<String, String>;

const KEYWORD_PREFIXES: [&str; 2] = ["Keyword:", "Ключевое слово:"];
const DESCRIPTION_PREFIXES: [&str; 2] = ["Description:", "Описание:"];

/// Result of decoding a backing document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedDocument {
    /// Recognized records in document order.
    pub entries: KnowledgeMap,
    /// Records dropped because they broke the keyword/description alternation.
    pub dropped: usize,
    /// Non-empty lines carrying neither prefix.
    pub ignored: usize,
}

enum Line<'a> {
    Keyword(&'a str),
    Description(&'a str),
    Other,
    Blank,
}

fn classify(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if let Some(rest) = KEYWORD_PREFIXES.iter().find_map(|p| line.strip_prefix(p)) {
        return Line::Keyword(rest);
    }
    if let Some(rest) = DESCRIPTION_PREFIXES
        .iter()
        .find_map(|p| line.strip_prefix(p))
    {
        return Line::Description(rest);
    }
    Line::Other
}

/// Decodes a document.
///
/// A later duplicate keyword overwrites the earlier description but keeps the
/// earlier position.
#[must_use]
pub fn decode(text: &str) -> DecodedDocument {
    let mut doc = DecodedDocument::default();
    let mut pending: Option<String> = None;

    for line in text.lines() {
        match classify(line) {
            Line::Keyword(raw) => {
                if pending.take().is_some() {
                    doc.dropped += 1;
                }
                let key = normalize_key(raw);
                if key.is_empty() {
                    doc.dropped += 1;
                } else {
                    pending = Some(key);
                }
            },
            Line::Description(raw) => match pending.take() {
                Some(key) => {
                    doc.entries.insert(key, raw.trim().to_string());
                },
                None => doc.dropped += 1,
            },
            Line::Other => doc.ignored += 1,
            Line::Blank => {},
        }
    }
    if pending.is_some() {
        doc.dropped += 1;
    }
    doc
}

/// Encodes entries in map order.
#[must_use]
pub fn encode(entries: &KnowledgeMap) -> String {
    let mut out = String::new();
    for (key, description) in entries {
        out.push_str(KEYWORD_PREFIXES[0]);
        out.push(' ');
        out.push_str(key);
        out.push('\n');
        out.push_str(DESCRIPTION_PREFIXES[0]);
        out.push(' ');
        out.push_str(description);
        out.push('\n');
    }
    out
}

/// Lowercase hex SHA-256 of the document bytes.
#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Collapses line breaks so a value stays on a single document line.
#[must_use]
pub fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Contents written when no backing document exists yet.
#[must_use]
pub fn sample() -> KnowledgeMap {
    let mut entries = KnowledgeMap::new();
    entries.insert(
        "пример".to_string(),
        "Это тестовое описание.".to_string(),
    );
    entries
}
