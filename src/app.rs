//! Application driver
//!
//! Owns the live conversation, the history book and the view router on a
//! single task. Uploads and streams run on spawned tasks and report back
//! through one channel; every result is tagged with its turn id and
//! applied here, in arrival order.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::client::{Backend, StreamEvent, UploadReceipt};
use crate::conversation::{ChatNotice, ChatSession, Effect, TurnId};
use crate::error::{AttachError, UploadError, ValidationError};
use crate::history::HistoryBook;
use crate::message::Attachment;
use crate::router::{ChatReset, View, ViewRouter};

/// Result of background work, delivered to the owning task
#[derive(Debug)]
pub enum AppEvent {
    Upload {
        turn: TurnId,
        result: Result<UploadReceipt, UploadError>,
    },
    Stream {
        turn: TurnId,
        event: StreamEvent,
    },
}

pub struct App<B: Backend> {
    backend: Arc<B>,
    chat: ChatSession,
    history: HistoryBook,
    router: ViewRouter,
    /// File picked for the next submit
    staged: Option<Attachment>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl<B: Backend> App<B> {
    pub fn new(backend: Arc<B>, history: HistoryBook) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            chat: ChatSession::new(),
            history,
            router: ViewRouter::new(),
            staged: None,
            events_tx,
            events_rx,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn history(&self) -> &HistoryBook {
        &self.history
    }

    pub fn view(&self) -> View {
        self.router.view()
    }

    pub fn staged(&self) -> Option<&Attachment> {
        self.staged.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<ChatNotice> {
        self.chat.take_notice()
    }

    // ───────────────────────────────────────────────────────────
    // Attachments
    // ───────────────────────────────────────────────────────────

    /// Read a file and hold it for the next submit
    pub fn stage_file(&mut self, path: &Path) -> Result<&Attachment, AttachError> {
        let file = Attachment::stage(path)?;
        tracing::debug!(name = %file.name, bytes = file.preview.as_ref().map_or(0, |p| p.len()), "file staged");
        Ok(self.staged.insert(file))
    }

    pub fn clear_staged(&mut self) {
        self.staged = None;
    }

    // ───────────────────────────────────────────────────────────
    // Chat
    // ───────────────────────────────────────────────────────────

    /// Submit text together with the staged file, if any
    pub fn submit(&mut self, text: &str) -> Result<TurnId, ValidationError> {
        let file = self.staged.take();
        match self.submit_with(text, file.clone()) {
            Ok(turn) => Ok(turn),
            Err(e) => {
                // Keep the file for the next attempt
                self.staged = file;
                Err(e)
            }
        }
    }

    pub fn submit_with(&mut self, text: &str, file: Option<Attachment>) -> Result<TurnId, ValidationError> {
        let effect = self.chat.submit(text, file)?;
        let turn = self.run(effect);
        self.sync_history();
        Ok(turn)
    }

    /// Apply one background result
    pub fn handle(&mut self, event: AppEvent) {
        match event {
            AppEvent::Upload { turn, result } => {
                if let Some(effect) = self.chat.upload_finished(turn, result) {
                    self.run(effect);
                }
            }
            AppEvent::Stream { turn, event } => {
                self.chat.apply(turn, event);
            }
        }
        self.sync_history();
    }

    /// Apply every result already waiting. Never blocks.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next background result
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.events_rx.recv().await
    }

    /// Run events until the current turn (if any) is over
    pub async fn settle(&mut self) {
        while self.chat.state().is_busy() {
            match self.events_rx.recv().await {
                Some(event) => self.handle(event),
                None => break,
            }
        }
    }

    // ───────────────────────────────────────────────────────────
    // Navigation
    // ───────────────────────────────────────────────────────────

    /// Sidebar "new": fresh chat, or a tool view
    pub fn new_session(&mut self, view: View) {
        let reset = self.router.new_session(view);
        self.apply_reset(reset);
    }

    /// Open history entry `index` in the chat view
    pub fn select_chat(&mut self, index: usize) -> bool {
        if index >= self.history.entries().len() {
            return false;
        }
        let reset = self.router.select_history(index);
        self.apply_reset(reset);
        true
    }

    /// Switch views without resetting
    pub fn show(&mut self, view: View) {
        let reset = self.router.show(view);
        self.apply_reset(reset);
        // Catch up on anything that streamed in while away
        self.sync_history();
    }

    fn apply_reset(&mut self, reset: ChatReset) {
        match reset {
            ChatReset::Keep => {}
            ChatReset::Fresh => {
                self.history.start_new();
                self.chat.reset(Vec::new());
                self.staged = None;
            }
            ChatReset::Restore(index) => {
                if let Some(messages) = self.history.select(index) {
                    self.chat.reset(messages);
                }
            }
        }
    }

    // ───────────────────────────────────────────────────────────
    // Internals
    // ───────────────────────────────────────────────────────────

    fn sync_history(&mut self) {
        if self.router.in_chat() {
            self.history.reconcile(self.chat.messages());
        }
    }

    /// Start the network work for an effect
    fn run(&mut self, effect: Effect) -> TurnId {
        match effect {
            Effect::Upload { turn, file } => {
                let backend = self.backend.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = backend.upload(file).await;
                    let _ = tx.send(AppEvent::Upload { turn, result });
                });
                turn
            }
            Effect::Stream { turn, message, history } => {
                let mut rx = self.backend.chat_stream(message, history);
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let mut done = false;
                    while let Some(event) = rx.recv().await {
                        done = event == StreamEvent::Done;
                        if tx.send(AppEvent::Stream { turn, event }).is_err() || done {
                            break;
                        }
                    }
                    if !done {
                        let _ = tx.send(AppEvent::Stream {
                            turn,
                            event: StreamEvent::Done,
                        });
                    }
                });
                turn
            }
        }
    }
}
