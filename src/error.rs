//! Error taxonomy for the chat core
//!
//! None of these are fatal. Each one degrades to a visible state change
//! (fallback text, a notice, an empty history) or to a silent no-op.

use std::path::PathBuf;
use thiserror::Error;

/// Network or stream failure on `/chat`.
///
/// Never reaches the caller of the transport: it is turned into a
/// fallback fragment (see [`TransportError::fallback_text`]).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned {status}")]
    Status { status: reqwest::StatusCode },
}

impl TransportError {
    /// Text shown in place of the assistant reply
    pub fn fallback_text(&self) -> String {
        format!("Error connecting to server. ({})", self)
    }
}

/// Attachment upload failed; the turn is aborted before an assistant
/// message exists.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upload rejected with status {status}")]
    Status { status: reqwest::StatusCode },

    #[error("upload rejected: {0}")]
    Rejected(String),
}

/// Stored history could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("history I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed history at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("history serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Submit rejected. Silently ignored by the UI.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("nothing to send")]
    Empty,

    #[error("a turn is already in flight")]
    Busy,
}

/// A file could not be staged as an attachment.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported file type: {0} (expected .pdf, .png, .jpg or .jpeg)")]
    Unsupported(String),
}

/// Face-lab / wan-analysis request failure.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Backend(String),
}
