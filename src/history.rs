//! History reconciliation
//!
//! Keeps the saved conversation list in step with the live message list.
//! `current` points at the entry the live list belongs to; `None` means
//! the live list has not been saved yet.

use crate::message::{Conversation, History, Message};
use crate::store::HistoryStore;

/// Saved conversations plus the binding to the live one
pub struct HistoryBook {
    entries: History,
    current: Option<usize>,
    title_len: usize,
    store: Box<dyn HistoryStore>,
}

impl HistoryBook {
    /// Load history from the store (empty if missing or unreadable)
    pub fn open(store: Box<dyn HistoryStore>, title_len: usize) -> Self {
        let entries = store.load();
        tracing::debug!(entries = entries.len(), "history loaded");
        Self {
            entries,
            current: None,
            title_len,
            store,
        }
    }

    pub fn entries(&self) -> &[Conversation] {
        &self.entries
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Bring history in line with the live list. Returns whether it changed.
    ///
    /// Messages whose attachment is still uploading are left out.
    pub fn reconcile(&mut self, live: &[Message]) -> bool {
        let durable: Vec<Message> = live.iter().filter(|m| !m.is_pending()).cloned().collect();

        match self.current {
            None => {
                if durable.is_empty() {
                    return false;
                }
                let entry = Conversation::new(durable, self.title_len);
                tracing::info!(title = %entry.title, "new conversation saved");
                self.entries.insert(0, entry);
                self.current = Some(0);
            }
            Some(index) => {
                let Some(entry) = self.entries.get_mut(index) else {
                    tracing::warn!(index, "live conversation missing from history");
                    self.current = None;
                    return self.reconcile(live);
                };
                if entry.messages == durable {
                    return false;
                }
                entry.messages = durable;
            }
        }

        self.persist();
        true
    }

    /// Bind to entry `index`; returns its messages for the live list
    pub fn select(&mut self, index: usize) -> Option<Vec<Message>> {
        let entry = self.entries.get(index)?;
        self.current = Some(index);
        Some(entry.messages.clone())
    }

    /// Unbind; the next non-empty reconcile creates a new entry
    pub fn start_new(&mut self) {
        self.current = None;
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.entries) {
            tracing::warn!(error = %e, "failed to save history");
        }
    }
}
