//! Persistence port for the two conversations and the in-memory state
//! container that writes through to it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::mode::Mode;
use crate::state::{reserve_ids_after, ConversationHistory};

/// Fixed storage key; the file store names its file after it.
pub const STORAGE_KEY: &str = "guru_jyotish_history";

pub const CLEAR_PROMPT: &str = "Are you sure you want to clear this chat history?";

/// Interactive yes/no gate in front of irreversible actions
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Where a [`ConversationHistory`] lives between runs.
pub trait HistoryStore {
    /// Read the persisted snapshot. Never fails: a missing or unreadable
    /// blob yields an empty history.
    fn load(&self) -> ConversationHistory;

    /// Persist the full snapshot.
    fn save(&mut self, history: &ConversationHistory) -> Result<()>;
}

fn parse_or_default(blob: &str, source: &dyn std::fmt::Display) -> ConversationHistory {
    match serde_json::from_str(blob) {
        Ok(history) => history,
        Err(e) => {
            warn!("Discarding unreadable history in {}: {}", source, e);
            ConversationHistory::default()
        }
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn load(&self) -> ConversationHistory {
        (**self).load()
    }

    fn save(&mut self, history: &ConversationHistory) -> Result<()> {
        (**self).save(history)
    }
}

/// JSON file on disk, by default under the user's data directory
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.local/share/guru-jyotish/guru_jyotish_history.json` (platform equivalent)
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;

        Ok(data_dir
            .join("guru-jyotish")
            .join(format!("{}.json", STORAGE_KEY)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self) -> ConversationHistory {
        match fs::read_to_string(&self.path) {
            Ok(blob) => parse_or_default(&blob, &self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No saved history at {}", self.path.display());
                ConversationHistory::default()
            }
            Err(e) => {
                warn!("Could not read history {}: {}", self.path.display(), e);
                ConversationHistory::default()
            }
        }
    }

    fn save(&mut self, history: &ConversationHistory) -> Result<()> {
        // Create data directory if it doesn't exist
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let blob = serde_json::to_string(history)?;
        fs::write(&self.path, blob)?;
        Ok(())
    }
}

/// Keeps the serialized blob in memory. Used by tests and `--ephemeral` runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistoryStore {
    blob: Option<String>,
    saves: usize,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary persisted blob, valid or not
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Some(blob.into()),
            saves: 0,
        }
    }

    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    /// Number of successful saves so far
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> ConversationHistory {
        match &self.blob {
            Some(blob) => parse_or_default(blob, &"memory store"),
            None => ConversationHistory::default(),
        }
    }

    fn save(&mut self, history: &ConversationHistory) -> Result<()> {
        self.blob = Some(serde_json::to_string(history)?);
        self.saves += 1;
        Ok(())
    }
}

/// The live history plus the port it is written through to.
///
/// Every change goes through [`HistoryCache::publish`], which swaps in the
/// new snapshot and saves it immediately.
#[derive(Debug)]
pub struct HistoryCache<S> {
    history: ConversationHistory,
    store: S,
}

impl<S: HistoryStore> HistoryCache<S> {
    pub fn open(store: S) -> Self {
        let history = store.load();
        debug!(
            "Loaded history: {} teacher, {} astrologer messages",
            history.teacher.len(),
            history.astrologer.len()
        );
        reserve_ids_after(&history);
        Self { history, store }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publish(&mut self, next: ConversationHistory) {
        self.history = next;
        if let Err(e) = self.store.save(&self.history) {
            error!("Failed to save history: {}", e);
        }
    }

    /// Empty `mode`'s sequence, but only once `confirm` agrees. There is no undo.
    pub fn clear(&mut self, mode: Mode, confirm: &dyn Confirm) -> bool {
        if !confirm.confirm(CLEAR_PROMPT) {
            debug!("Clear of {} history cancelled", mode);
            return false;
        }

        let next = self.history.clone().clear_sequence(mode);
        self.publish(next);
        info!("Cleared {} history", mode);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Message;
    use tempfile::TempDir;

    fn sample_history() -> ConversationHistory {
        let mut reply = Message::placeholder();
        reply.content = "Beta, Shani ka samay dheere chalta hai.".to_string();
        ConversationHistory::default()
            .replace_sequence(Mode::Teacher, vec![Message::user("Photosynthesis kya hai?")])
            .replace_sequence(Mode::Astrologer, vec![Message::user("Mera career?"), reply])
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = FileHistoryStore::new(dir.path().join("nested").join("history.json"));
        let history = sample_history();

        store.save(&history).unwrap();
        assert_eq!(store.load(), history);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load(), ConversationHistory::default());
    }

    #[test]
    fn test_file_store_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileHistoryStore::new(&path);
        assert_eq!(store.load(), ConversationHistory::default());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryHistoryStore::new();
        let history = sample_history();
        store.save(&history).unwrap();
        assert_eq!(store.load(), history);
        assert_eq!(store.saves(), 1);
        assert!(store.blob().is_some_and(|blob| blob.contains("\"astrologer\"")));
    }

    #[test]
    fn test_memory_store_bad_blob_is_empty() {
        let store = MemoryHistoryStore::with_blob("[1, 2, 3]");
        assert_eq!(store.load(), ConversationHistory::default());
    }

    #[test]
    fn test_publish_writes_through() {
        let mut cache = HistoryCache::open(MemoryHistoryStore::new());
        let next = cache
            .history()
            .clone()
            .replace_sequence(Mode::Teacher, vec![Message::user("hello")]);

        cache.publish(next.clone());

        assert_eq!(cache.history(), &next);
        assert_eq!(cache.store().saves(), 1);
        assert_eq!(cache.store().load(), next);
    }

    #[test]
    fn test_clear_needs_confirmation() {
        let mut cache = HistoryCache::open(MemoryHistoryStore::new());
        let history = sample_history();
        cache.publish(history.clone());

        assert!(!cache.clear(Mode::Astrologer, &|_: &str| false));
        assert_eq!(cache.history(), &history);

        assert!(cache.clear(Mode::Astrologer, &|_: &str| true));
        assert!(cache.history().astrologer.is_empty());
        assert_eq!(cache.history().teacher.len(), 1);
        assert_eq!(cache.store().load(), *cache.history());
    }

    #[test]
    fn test_boxed_store_delegates() {
        let mut store: Box<dyn HistoryStore> = Box::new(MemoryHistoryStore::new());
        let history = sample_history();
        store.save(&history).unwrap();
        assert_eq!(store.load(), history);
    }
}
