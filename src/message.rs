//! Conversation data model
//!
//! Messages, attachments and saved conversations. Everything here
//! serializes to the history file and to the `/chat` request body,
//! except the attachment preview, which only lives in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::AttachError;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Attachment>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            file: None,
        }
    }

    /// Empty assistant message, ready to receive fragments
    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: Attachment) -> Self {
        self.file = Some(file);
        self
    }

    /// Still waiting on its attachment upload
    pub fn is_pending(&self) -> bool {
        self.file.as_ref().is_some_and(|f| f.uploading)
    }
}

// ═══════════════════════════════════════════════════════════════
// ATTACHMENTS
// ═══════════════════════════════════════════════════════════════

/// Local copy of a chosen file, held until the attachment settles.
///
/// Clones share the buffer; the bytes are freed when the last clone drops.
#[derive(Clone)]
pub struct PreviewHandle {
    bytes: Arc<[u8]>,
}

impl PreviewHandle {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of live references to the buffer
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.bytes)
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PreviewHandle({} bytes)", self.bytes.len())
    }
}

impl PartialEq for PreviewHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

/// File attached to a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(skip)]
    pub preview: Option<PreviewHandle>,
    pub uploading: bool,
    #[serde(rename = "serverPath", default, skip_serializing_if = "Option::is_none")]
    pub server_path: Option<String>,
}

impl Attachment {
    /// Optimistic attachment from bytes already in memory
    pub fn optimistic(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            preview: Some(PreviewHandle::new(bytes)),
            uploading: true,
            server_path: None,
        }
    }

    /// Read a local file into an optimistic attachment
    pub fn stage(path: &Path) -> Result<Self, AttachError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = mime_for(path).ok_or_else(|| AttachError::Unsupported(name.clone()))?;
        let bytes = std::fs::read(path).map_err(|source| AttachError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::optimistic(name, mime, bytes))
    }

    /// Upload finished: record where the server put it, drop the local copy
    pub fn settle(&mut self, server_path: String) {
        self.uploading = false;
        self.server_path = Some(server_path);
        self.preview = None;
    }

    /// Upload failed: stop showing it as in progress, drop the local copy
    pub fn abandon(&mut self) {
        self.uploading = false;
        self.preview = None;
    }
}

/// MIME type for an accepted attachment, by extension.
/// Only types the backend can extract text from are accepted.
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════
// CONVERSATIONS
// ═══════════════════════════════════════════════════════════════

/// Default number of characters kept for a conversation title
pub const TITLE_LEN: usize = 30;

/// One saved conversation (one history entry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub title: String,
    pub messages: Vec<Message>,
    pub timestamp: DateTime<Utc>,
}

impl Conversation {
    /// New entry titled from the first message (its file name if it has no text)
    pub fn new(messages: Vec<Message>, title_len: usize) -> Self {
        let first = match messages.first() {
            Some(m) if m.content.trim().is_empty() => {
                m.file.as_ref().map(|f| f.name.as_str()).unwrap_or("")
            }
            Some(m) => m.content.as_str(),
            None => "",
        };
        Self {
            title: derive_title(first, title_len),
            messages,
            timestamp: Utc::now(),
        }
    }
}

/// Saved conversations, most recent first
pub type History = Vec<Conversation>;

/// First `len` characters followed by an ellipsis
pub fn derive_title(content: &str, len: usize) -> String {
    let mut title: String = content.chars().take(len).collect();
    title.push_str("...");
    title
}
