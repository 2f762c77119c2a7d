//! Debounced saving.
//!
//! Every edit pushes the save deadline back by the configured delay, so a
//! burst of typing produces a single save once the user pauses. Closing the
//! document flushes whatever is pending right away. A failed save is
//! reported to the caller and not retried.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{PagenoteError, Result};
use crate::model::SavedDocument;

/// The persistence collaborator.
pub trait DocumentStore {
    fn save_document(&mut self, doc: &SavedDocument) -> Result<()>;
    fn load_document(&self, key: &str) -> Result<SavedDocument>;
}

/// Storage key for a document: its title reduced to lowercase ASCII
/// letters and digits, other runs replaced by `-`.
pub fn document_key(doc: &SavedDocument) -> String {
    let mut key = String::with_capacity(doc.title.len());
    for c in doc.title.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.ends_with('-') && !key.is_empty() {
            key.push('-');
        }
    }
    let key = key.trim_end_matches('-');
    if key.is_empty() {
        "untitled".to_string()
    } else {
        key.to_string()
    }
}

/// Debounce timer.
#[derive(Debug, Clone)]
pub struct Autosave {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Autosave {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Record an edit at `now`, restarting the quiet period.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Clear and return `true` when the quiet period has elapsed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Clear and return `true` when a save is pending, due or not.
    pub fn take_pending(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// Stores each document as `<key>.json` in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DocumentStore for JsonFileStore {
    fn save_document(&mut self, doc: &SavedDocument) -> Result<()> {
        let path = self.path_for(&document_key(doc));
        let json = serde_json::to_string_pretty(doc)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, json)?;
        info!("saved {}", path.display());
        Ok(())
    }

    fn load_document(&self, key: &str) -> Result<SavedDocument> {
        let path = self.path_for(key);
        let text = std::fs::read_to_string(&path)?;
        debug!("loaded {}", path.display());
        Ok(serde_json::from_str(&text)?)
    }
}

/// In-memory store. Can be told to fail, to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: HashMap<String, SavedDocument>,
    saves: usize,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every save.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, doc: SavedDocument) -> String {
        let key = document_key(&doc);
        self.docs.insert(key.clone(), doc);
        key
    }

    pub fn get(&self, key: &str) -> Option<&SavedDocument> {
        self.docs.get(key)
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl DocumentStore for MemoryStore {
    fn save_document(&mut self, doc: &SavedDocument) -> Result<()> {
        if self.failing {
            return Err(PagenoteError::Store(format!(
                "cannot save \"{}\": store is read-only",
                doc.title
            )));
        }
        self.docs.insert(document_key(doc), doc.clone());
        self.saves += 1;
        info!("saved \"{}\" to memory", doc.title);
        Ok(())
    }

    fn load_document(&self, key: &str) -> Result<SavedDocument> {
        self.docs
            .get(key)
            .cloned()
            .ok_or_else(|| PagenoteError::Store(format!("no document under key \"{key}\"")))
    }
}
