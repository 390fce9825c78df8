//! Live conversation state machine
//!
//! Owns the message list for the chat view. A submit opens a turn; the
//! turn's id is carried by every upload/stream result so a result that
//! arrives after the user moved on (new chat, other conversation) is
//! dropped instead of landing in the wrong list.
//!
//! Nothing here does I/O. Operations return an [`Effect`] describing the
//! network work the driver has to start.

use crate::client::{StreamEvent, UploadFile, UploadReceipt};
use crate::error::{UploadError, ValidationError};
use crate::message::{Attachment, Message, PreviewHandle, Role};

/// Monotonic id of one submit-to-completion cycle
pub type TurnId = u64;

/// Where the live conversation is in its current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    AwaitingUpload { turn: TurnId },
    Streaming { turn: TurnId },
}

impl ChatState {
    pub fn is_busy(&self) -> bool {
        !matches!(self, ChatState::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChatState::Idle => "idle",
            ChatState::AwaitingUpload { .. } => "uploading",
            ChatState::Streaming { .. } => "streaming",
        }
    }
}

/// Network work requested by the state machine
#[derive(Debug)]
pub enum Effect {
    Upload { turn: TurnId, file: UploadFile },
    Stream { turn: TurnId, message: String, history: Vec<Message> },
}

/// Something to show the user once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatNotice {
    Info(String),
    Error(String),
}

#[derive(Debug)]
struct OpenTurn {
    id: TurnId,
    /// Position of this turn's user message
    user_index: usize,
    /// Position of the open assistant message, once appended
    assistant_index: Option<usize>,
    /// Trimmed user text
    text: String,
    response: String,
}

/// The live message list and its turn bookkeeping
#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<Message>,
    state: ChatState,
    next_turn: TurnId,
    turn: Option<OpenTurn>,
    notice: Option<ChatNotice>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            state: ChatState::Idle,
            next_turn: 1,
            turn: None,
            notice: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    /// Index of the assistant message currently receiving fragments
    pub fn open_assistant(&self) -> Option<usize> {
        match self.state {
            ChatState::Streaming { .. } => self.turn.as_ref().and_then(|t| t.assistant_index),
            _ => None,
        }
    }

    pub fn take_notice(&mut self) -> Option<ChatNotice> {
        self.notice.take()
    }

    /// Replace the live list wholesale (new chat, history selection).
    /// Any turn in flight is abandoned; its late results are ignored.
    pub fn reset(&mut self, messages: Vec<Message>) {
        if let Some(turn) = self.turn.take() {
            tracing::info!(turn = turn.id, "abandoning turn in flight");
        }
        self.messages = messages;
        self.state = ChatState::Idle;
    }

    /// Start a turn: append the user message and say what to do next
    pub fn submit(&mut self, text: &str, file: Option<Attachment>) -> Result<Effect, ValidationError> {
        if self.state.is_busy() {
            return Err(ValidationError::Busy);
        }
        let trimmed = text.trim();
        if trimmed.is_empty() && file.is_none() {
            return Err(ValidationError::Empty);
        }

        let id = self.next_turn;
        self.next_turn += 1;

        let upload = file.as_ref().map(|f| UploadFile {
            name: f.name.clone(),
            mime_type: f.mime_type.clone(),
            bytes: f
                .preview
                .clone()
                .unwrap_or_else(|| PreviewHandle::new(Vec::new())),
        });

        let mut user = Message::user(text);
        user.file = file;
        self.messages.push(user);

        self.turn = Some(OpenTurn {
            id,
            user_index: self.messages.len() - 1,
            assistant_index: None,
            text: trimmed.to_string(),
            response: String::new(),
        });

        match upload {
            Some(file) => {
                tracing::info!(turn = id, file = %file.name, "turn waiting on upload");
                self.state = ChatState::AwaitingUpload { turn: id };
                Ok(Effect::Upload { turn: id, file })
            }
            None => Ok(self.begin_stream()),
        }
    }

    /// Upload result for `turn`. Returns the stream to start, if any.
    pub fn upload_finished(
        &mut self,
        turn: TurnId,
        result: Result<UploadReceipt, UploadError>,
    ) -> Option<Effect> {
        if self.state != (ChatState::AwaitingUpload { turn }) {
            tracing::debug!(turn, "discarding upload result for stale turn");
            return None;
        }
        let user_index = self.turn.as_ref()?.user_index;
        let file = self.messages.get_mut(user_index)?.file.as_mut()?;

        match result {
            Ok(receipt) => {
                tracing::info!(turn, path = %receipt.server_path, "upload complete");
                file.settle(receipt.server_path);
                if let Some(message) = receipt.message {
                    self.notice = Some(ChatNotice::Info(message));
                }
                Some(self.begin_stream())
            }
            Err(e) => {
                tracing::warn!(turn, error = %e, "upload failed, turn aborted");
                file.abandon();
                self.notice = Some(ChatNotice::Error(format!("Upload failed: {}", e)));
                self.turn = None;
                self.state = ChatState::Idle;
                None
            }
        }
    }

    /// Apply one stream event for `turn`. Returns whether the list changed.
    pub fn apply(&mut self, turn: TurnId, event: StreamEvent) -> bool {
        if self.state != (ChatState::Streaming { turn }) {
            tracing::debug!(turn, "discarding stream event for stale turn");
            return false;
        }

        match event {
            StreamEvent::Fragment(text) => {
                let Some(open) = self.turn.as_mut() else {
                    return false;
                };
                open.response.push_str(&text);
                let Some(index) = open.assistant_index else {
                    return false;
                };
                match self.messages.get_mut(index) {
                    Some(msg) if msg.role == Role::Assistant => {
                        msg.content.clone_from(&open.response);
                        true
                    }
                    _ => false,
                }
            }
            StreamEvent::Done => {
                if let Some(open) = self.turn.take() {
                    tracing::info!(turn, chars = open.response.len(), "turn complete");
                }
                self.state = ChatState::Idle;
                false
            }
        }
    }

    /// Append the open assistant message and build the outbound request
    fn begin_stream(&mut self) -> Effect {
        // History as it stands before the assistant placeholder
        let history = self.messages.clone();
        let message = match self.turn.as_ref() {
            Some(open) => outbound_text(&open.text, self.messages.get(open.user_index)),
            None => String::new(),
        };

        self.messages.push(Message::assistant());
        let index = self.messages.len() - 1;

        let id = match self.turn.as_mut() {
            Some(open) => {
                open.assistant_index = Some(index);
                open.id
            }
            None => 0,
        };
        self.state = ChatState::Streaming { turn: id };
        tracing::debug!(turn = id, history = history.len(), "turn streaming");

        Effect::Stream {
            turn: id,
            message,
            history,
        }
    }
}

/// Text sent to `/chat`: what the user typed, or a request about the file
fn outbound_text(trimmed: &str, user: Option<&Message>) -> String {
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    match user.and_then(|m| m.file.as_ref()) {
        Some(file) => format!(
            "I have uploaded a file named \"{}\". Please analyze its contents and summarize it.",
            file.name
        ),
        None => String::new(),
    }
}
