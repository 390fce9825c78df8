//! History persistence
//!
//! History lives in a single JSON slot, rewritten whole on every change.
//! Missing or malformed content loads as an empty history.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::PersistenceError;
use crate::message::History;

/// Durable slot for the conversation history
pub trait HistoryStore: Send {
    /// Read the stored history. Missing slot is an empty history.
    fn try_load(&self) -> Result<History, PersistenceError>;

    /// Replace the stored history
    fn save(&self, history: &History) -> Result<(), PersistenceError>;

    /// Read the stored history, falling back to empty on any failure
    fn load(&self) -> History {
        match self.try_load() {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(error = %e, "stored history unusable, starting empty");
                History::new()
            }
        }
    }
}

/// History stored as pretty JSON in one file
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl HistoryStore for JsonHistoryStore {
    fn try_load(&self) -> Result<History, PersistenceError> {
        if !self.path.exists() {
            return Ok(History::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        if content.trim().is_empty() {
            return Ok(History::new());
        }
        serde_json::from_str(&content).map_err(|source| PersistenceError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Save atomically (temp file + rename to prevent corruption)
    fn save(&self, history: &History) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let content = serde_json::to_string_pretty(history)?;
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, &content).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

/// In-memory slot holding the serialized form, for tests and dry runs
#[derive(Default)]
pub struct MemoryHistoryStore {
    slot: Mutex<Option<String>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with raw slot content, valid or not
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|s| s.clone())
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn try_load(&self) -> Result<History, PersistenceError> {
        let raw = self.raw();
        match raw {
            None => Ok(History::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|source| PersistenceError::Malformed {
                path: PathBuf::from("<memory>"),
                source,
            }),
        }
    }

    fn save(&self, history: &History) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(history)?;
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(raw);
        }
        Ok(())
    }
}
