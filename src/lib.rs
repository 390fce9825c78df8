//! talk - terminal client for the Talk backend
//!
//! Streaming chat with file attachments, locally persisted conversation
//! history, a backend health indicator, and the face-lab / wan-analysis
//! tools.

pub mod app;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod face;
pub mod health;
pub mod history;
pub mod message;
pub mod router;
pub mod store;

pub use app::{App, AppEvent};
pub use client::{Backend, BackendClient, StreamEvent};
pub use conversation::{ChatNotice, ChatSession, ChatState};
pub use history::HistoryBook;
pub use message::{Attachment, Conversation, History, Message, Role};
pub use router::View;
pub use store::{HistoryStore, JsonHistoryStore, MemoryHistoryStore};
