//! Substring search over the knowledge map.

use crate::knowledge::KnowledgeMap;
use crate::models::{KnowledgeEntry, normalize_key};

/// Maximum number of entries returned by one search.
pub const MAX_RESULTS: usize = 7;

/// Ordered, capped search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    /// Matching entries in knowledge base order.
    pub entries: Vec<KnowledgeEntry>,
}

impl SearchResults {
    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the result list is full.
    ///
    /// This is a result-count check: it is true whenever exactly
    /// [`MAX_RESULTS`] entries are returned, whether or not more matched.
    #[must_use]
    pub fn is_capped(&self) -> bool {
        self.entries.len() == MAX_RESULTS
    }
}

/// Searches `map` for `raw_query`.
///
/// The query is trimmed and lower-cased. An entry matches when the query is
/// a substring of its key or its key is a substring of the query. Matches are
/// returned in map order, no re-ranking, truncated to [`MAX_RESULTS`].
///
/// Empty queries are rejected by the caller; here an empty query matches
/// every key.
#[must_use]
pub fn search(map: &KnowledgeMap, raw_query: &str) -> SearchResults {
    let query = normalize_key(raw_query);
    let entries = map
        .iter()
        .filter(|(key, _)| key.contains(query.as_str()) || query.contains(key.as_str()))
        .take(MAX_RESULTS)
        .map(|(key, description)| KnowledgeEntry {
            key: key.clone(),
            description: description.clone(),
        })
        .collect();
    metrics::counter!("search_queries_total").increment(1);
    SearchResults { entries }
}
