//! The [`KnowledgeBase`] service.

use super::document::{self, DecodedDocument, KnowledgeMap};
use crate::models::{KnowledgeChange, KnowledgeEntry, callback_token, normalize_key};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::instrument;

#[derive(Debug, Default)]
struct State {
    entries: KnowledgeMap,
    /// Checksum of the document as last loaded or persisted.
    checksum: Option<String>,
}

/// Authoritative keyword → description map, persisted to a backing document.
///
/// # Concurrency Model
///
/// The map sits behind a `RwLock`: searches take the read side and never
/// block each other; mutations take the write side. A mutation builds the
/// next map, persists it, and only then swaps it in. Replacing the document
/// is the commit point: if it fails, both the document and the in-memory map
/// stay unchanged; once it succeeds the map is swapped even if the companion
/// checksum artifact could not be written.
#[derive(Debug)]
pub struct KnowledgeBase {
    path: PathBuf,
    state: RwLock<State>,
}

impl KnowledgeBase {
    /// Opens the knowledge base at `path`, loading it immediately.
    ///
    /// Never fails: an unreadable document degrades to an empty base
    /// (see [`KnowledgeBase::load`]).
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let kb = Self {
            path: path.into(),
            state: RwLock::new(State::default()),
        };
        match kb.read_document() {
            Ok((doc, sum)) => {
                let mut state = kb.write_state();
                state.entries = doc.entries;
                state.checksum = Some(sum);
            },
            Err(e) => {
                tracing::error!(path = %kb.path.display(), error = %e, "Failed to load knowledge base, starting empty");
            },
        }
        tracing::info!(path = %kb.path.display(), entries = kb.len(), "Knowledge base loaded");
        kb
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the companion checksum artifact (`<document>.sha256`).
    #[must_use]
    pub fn checksum_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".sha256");
        PathBuf::from(name)
    }

    /// Checksum of the document as last loaded or persisted.
    #[must_use]
    pub fn checksum(&self) -> Option<String> {
        self.read_state().checksum.clone()
    }

    /// Parses the backing document into a key → description map.
    ///
    /// Creates a sample document when none exists. Read failures are logged
    /// and yield an empty map.
    #[must_use]
    pub fn load(&self) -> KnowledgeMap {
        match self.read_document() {
            Ok((doc, _)) => doc.entries,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to read knowledge document");
                KnowledgeMap::new()
            },
        }
    }

    /// Writes the in-memory map back to the document and refreshes the checksum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the document cannot be written.
    pub fn persist(&self) -> Result<()> {
        let mut state = self.write_state();
        let sum = self.write_document(&state.entries)?;
        state.checksum = Some(sum);
        Ok(())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_state().entries.is_empty()
    }

    /// Returns true if the (normalized) key exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.read_state().entries.contains_key(&normalize_key(key))
    }

    /// Looks up a description by (normalized) key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.read_state().entries.get(&normalize_key(key)).cloned()
    }

    /// Resolves a callback token back to its key.
    #[must_use]
    pub fn key_for_token(&self, token: &str) -> Option<String> {
        self.read_state()
            .entries
            .keys()
            .find(|key| callback_token(key) == token)
            .cloned()
    }

    /// Copies all entries in canonical order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<KnowledgeEntry> {
        self.read_state()
            .entries
            .iter()
            .map(|(key, description)| KnowledgeEntry {
                key: key.clone(),
                description: description.clone(),
            })
            .collect()
    }

    /// Runs `f` against the map under the read lock.
    pub fn with_entries<T>(&self, f: impl FnOnce(&KnowledgeMap) -> T) -> T {
        f(&self.read_state().entries)
    }

    /// Adds an entry, or replaces the description of an existing key in place.
    ///
    /// Returns [`KnowledgeChange::Added`] for a new key and
    /// [`KnowledgeChange::Updated`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty key or description, or
    /// [`Error::OperationFailed`] if the document cannot be written.
    #[instrument(skip(self, description))]
    pub fn add(&self, key: &str, description: &str) -> Result<KnowledgeChange> {
        let (key, description) = validated(key, description)?;
        self.mutate(|entries| {
            let existed = entries.insert(key.clone(), description).is_some();
            Ok(if existed {
                KnowledgeChange::Updated { key }
            } else {
                KnowledgeChange::Added { key }
            })
        })
    }

    /// Replaces the description of an existing key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key is absent, [`Error::InvalidInput`]
    /// for an empty description, or [`Error::OperationFailed`] on write failure.
    #[instrument(skip(self, description))]
    pub fn update(&self, key: &str, description: &str) -> Result<KnowledgeChange> {
        let (key, description) = validated(key, description)?;
        self.mutate(|entries| {
            let slot = entries
                .get_mut(&key)
                .ok_or_else(|| Error::keyword_not_found(key.clone()))?;
            *slot = description;
            Ok(KnowledgeChange::Updated { key })
        })
    }

    /// Removes a key, preserving the order of the remaining entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key is absent, or
    /// [`Error::OperationFailed`] on write failure.
    #[instrument(skip(self))]
    pub fn delete(&self, key: &str) -> Result<KnowledgeChange> {
        let key = normalize_key(key);
        self.mutate(|entries| {
            entries
                .shift_remove(&key)
                .ok_or_else(|| Error::keyword_not_found(key.clone()))?;
            Ok(KnowledgeChange::Deleted { key })
        })
    }

    /// Re-reads the document and replaces the in-memory map with it.
    ///
    /// Returns the keys present after the reload but absent before, in
    /// document order. Removed keys are not reported. If the document cannot
    /// be read the current map is kept and no keys are returned.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn reload_and_diff(&self) -> Vec<String> {
        let (doc, sum) = match self.read_document() {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(error = %e, "Reload failed, keeping current knowledge base");
                return Vec::new();
            },
        };

        let mut state = self.write_state();
        let new_keys: Vec<String> = doc
            .entries
            .keys()
            .filter(|key| !state.entries.contains_key(*key))
            .cloned()
            .collect();
        state.entries = doc.entries;
        state.checksum = Some(sum);

        tracing::info!(
            entries = state.entries.len(),
            new_keys = new_keys.len(),
            "Knowledge base reloaded"
        );
        metrics::counter!("knowledge_reloads_total").increment(1);
        new_keys
    }

    /// Returns true if the document on disk no longer matches the last
    /// loaded or persisted checksum.
    #[must_use]
    pub fn has_external_changes(&self) -> bool {
        let Ok(bytes) = fs::read(&self.path) else {
            return false;
        };
        let current = document::checksum(&bytes);
        self.read_state().checksum.as_deref() != Some(current.as_str())
    }

    fn mutate(
        &self,
        f: impl FnOnce(&mut KnowledgeMap) -> Result<KnowledgeChange>,
    ) -> Result<KnowledgeChange> {
        let mut state = self.write_state();
        let mut next = state.entries.clone();
        let change = f(&mut next)?;
        let sum = self.write_document(&next)?;
        state.entries = next;
        state.checksum = Some(sum);

        metrics::counter!("knowledge_mutations_total", "change" => change.event_type())
            .increment(1);
        tracing::info!(change = change.event_type(), entries = state.entries.len(), "Knowledge base updated");
        Ok(change)
    }

    /// Reads and decodes the document, creating the sample one if missing.
    fn read_document(&self) -> Result<(DecodedDocument, String)> {
        if !self.path.exists() {
            self.write_document(&document::sample())?;
            tracing::info!(path = %self.path.display(), "Created sample knowledge document");
        }
        let bytes = fs::read(&self.path).map_err(|e| Error::OperationFailed {
            operation: "read_knowledge_document".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let doc = document::decode(&text);
        if doc.dropped > 0 {
            tracing::warn!(
                path = %self.path.display(),
                dropped = doc.dropped,
                "Dropped misaligned knowledge records"
            );
            metrics::counter!("knowledge_dropped_records_total").increment(doc.dropped as u64);
        }
        Ok((doc, document::checksum(&bytes)))
    }

    /// Writes the document atomically, then best-effort its checksum artifact.
    ///
    /// Fails only if the document itself was not replaced.
    fn write_document(&self, entries: &KnowledgeMap) -> Result<String> {
        let encoded = document::encode(entries);
        let sum = document::checksum(encoded.as_bytes());
        let write_failed = |operation| io_failed(operation, &self.path);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_failed("create_knowledge_dir"))?;
        }
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, encoded.as_bytes()).map_err(write_failed("write_knowledge_document"))?;
        fs::rename(&tmp, &self.path).map_err(write_failed("replace_knowledge_document"))?;

        // Committed. The artifact write is best-effort from here on.
        if let Err(e) = self.write_checksum_artifact(&sum) {
            tracing::warn!(error = %e, "Failed to write knowledge checksum artifact");
            metrics::counter!("knowledge_checksum_write_failures_total").increment(1);
        }
        Ok(sum)
    }

    fn write_checksum_artifact(&self, sum: &str) -> Result<()> {
        let path = self.checksum_path();
        fs::write(&path, format!("{sum}\n")).map_err(io_failed("write_knowledge_checksum", &path))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Knowledge base lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Knowledge base lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn io_failed(operation: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.display().to_string();
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{path}: {e}"),
    }
}

/// Normalizes a key/description pair for storage.
fn validated(key: &str, description: &str) -> Result<(String, String)> {
    let key = normalize_key(&document::single_line(key));
    if key.is_empty() {
        return Err(Error::InvalidInput("keyword must not be empty".to_string()));
    }
    let description = document::single_line(description);
    if description.is_empty() {
        return Err(Error::InvalidInput(
            "description must not be empty".to_string(),
        ));
    }
    Ok((key, description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_with(contents: &str) -> (TempDir, KnowledgeBase) {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("data.kb");
        fs::write(&path, contents).expect("write fixture");
        let kb = KnowledgeBase::open(&path);
        (dir, kb)
    }

    #[test]
    fn test_missing_document_creates_sample() {
        let dir = TempDir::new().expect("tempdir");
        let kb = KnowledgeBase::open(dir.path().join("data.kb"));
        assert_eq!(kb.len(), 1);
        assert!(kb.contains("Пример"));
        assert!(kb.path().exists());
        let artifact = fs::read_to_string(kb.checksum_path()).expect("checksum file");
        assert_eq!(Some(artifact.trim().to_string()), kb.checksum());
    }

    #[test]
    fn test_unreadable_document_degrades_to_empty() {
        let dir = TempDir::new().expect("tempdir");
        // A directory at the document path cannot be read as a file.
        let path = dir.path().join("data.kb");
        fs::create_dir(&path).expect("mkdir");
        let kb = KnowledgeBase::open(&path);
        assert!(kb.is_empty());
        assert!(kb.load().is_empty());
    }

    #[test]
    fn test_add_update_delete_persist() {
        let (_dir, kb) = open_with("Keyword: apple\nDescription: A fruit.\n");

        let change = kb.add(" Banana ", "A yellow fruit.").expect("add");
        assert_eq!(change, KnowledgeChange::Added { key: "banana".to_string() });
        assert_eq!(kb.load(), kb.with_entries(Clone::clone));

        let change = kb.update("APPLE", "A red fruit.").expect("update");
        assert_eq!(change, KnowledgeChange::Updated { key: "apple".to_string() });
        assert_eq!(kb.get("apple").as_deref(), Some("A red fruit."));

        let change = kb.delete("apple").expect("delete");
        assert_eq!(change, KnowledgeChange::Deleted { key: "apple".to_string() });
        assert!(!kb.contains("apple"));
        assert!(!kb.load().contains_key("apple"));
    }

    #[test]
    fn test_add_existing_key_is_update_in_place() {
        let (_dir, kb) = open_with("Keyword: a\nDescription: 1\nKeyword: b\nDescription: 2\n");
        let change = kb.add("a", "one").expect("add");
        assert!(matches!(change, KnowledgeChange::Updated { .. }));
        let keys: Vec<_> = kb.snapshot().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_keys_are_not_found() {
        let (_dir, kb) = open_with("");
        assert!(matches!(kb.delete("ghost"), Err(Error::NotFound { kind: "keyword", .. })));
        assert!(matches!(kb.update("ghost", "x"), Err(Error::NotFound { .. })));
        assert!(matches!(kb.add("  ", "x"), Err(Error::InvalidInput(_))));
        assert!(matches!(kb.add("k", "\n"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_multiline_description_is_folded() {
        let (_dir, kb) = open_with("");
        kb.add("k", "line one\nline two").expect("add");
        assert_eq!(kb.load()["k"], "line one line two");
    }

    #[test]
    fn test_reload_and_diff_reports_only_new_keys() {
        let (_dir, kb) = open_with("Keyword: a\nDescription: 1\nKeyword: b\nDescription: 2\n");
        fs::write(
            kb.path(),
            "Keyword: b\nDescription: 2\nKeyword: c\nDescription: 3\nKeyword: d\nDescription: 4\n",
        )
        .expect("rewrite");

        assert!(kb.has_external_changes());
        let new_keys = kb.reload_and_diff();
        assert_eq!(new_keys, vec!["c".to_string(), "d".to_string()]);
        assert!(!kb.contains("a"));
        assert!(!kb.has_external_changes());
        assert!(kb.reload_and_diff().is_empty());
    }

    #[test]
    fn test_persist_does_not_flag_external_change() {
        let (_dir, kb) = open_with("Keyword: a\nDescription: 1\n");
        kb.add("b", "2").expect("add");
        assert!(!kb.has_external_changes());
        kb.persist().expect("persist");
        assert!(!kb.has_external_changes());
    }

    #[test]
    fn test_checksum_artifact_failure_still_commits() {
        let (_dir, kb) = open_with("Keyword: apple\nDescription: A fruit.\n");
        // A directory at the artifact path cannot be written as a file.
        fs::remove_file(kb.checksum_path()).ok();
        fs::create_dir(kb.checksum_path()).expect("mkdir");

        let change = kb.add("banana", "A yellow fruit.").expect("document replaced");
        assert_eq!(change, KnowledgeChange::Added { key: "banana".to_string() });

        assert!(kb.contains("banana"));
        assert!(kb.load().contains_key("banana"));
        assert!(!kb.has_external_changes());
        assert!(kb.reload_and_diff().is_empty());
    }

    #[test]
    fn test_checksum_artifact_error_names_artifact_path() {
        let (_dir, kb) = open_with("");
        fs::remove_file(kb.checksum_path()).ok();
        fs::create_dir(kb.checksum_path()).expect("mkdir");

        let err = kb.write_checksum_artifact("abc").expect_err("directory in the way");
        let Error::OperationFailed { operation, cause } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(operation, "write_knowledge_checksum");
        assert!(cause.starts_with(&kb.checksum_path().display().to_string()));
    }

    #[test]
    fn test_key_for_token() {
        let (_dir, kb) = open_with("Keyword: apple\nDescription: A fruit.\n");
        let token = callback_token("apple");
        assert_eq!(kb.key_for_token(&token).as_deref(), Some("apple"));
        assert_eq!(kb.key_for_token("000000000000"), None);
    }
}
