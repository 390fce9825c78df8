//! User Story Integration Tests
//!
//! These tests trace complete user workflows with logging to verify
//! the system behaves correctly from the user's perspective.
//!
//! Each test represents a real user story:
//! - "As a user, I want to..."
//! - Tests verify the expected output/behavior
//! - Logs are captured for debugging
//!
//! The backend is a fake whose streams are fed by the test, so every
//! intermediate state of a turn can be observed.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use talk::app::App;
use talk::client::{Backend, StreamEvent, UploadFile, UploadReceipt};
use talk::conversation::{ChatNotice, ChatState};
use talk::error::UploadError;
use talk::history::HistoryBook;
use talk::message::{Attachment, Message, Role};
use talk::router::View;
use talk::store::{HistoryStore, JsonHistoryStore};

/// Test helper to capture and display trace logs
struct TestTracer {
    name: String,
    logs: Vec<String>,
}

impl TestTracer {
    fn new(name: &str) -> Self {
        eprintln!("\n╔═══════════════════════════════════════════════════════════════");
        eprintln!("║ USER STORY: {}", name);
        eprintln!("╚═══════════════════════════════════════════════════════════════\n");
        Self {
            name: name.to_string(),
            logs: vec![],
        }
    }

    fn step(&mut self, description: &str) {
        let msg = format!("  → {}", description);
        eprintln!("{}", msg);
        self.logs.push(msg);
    }

    fn expect(&mut self, condition: bool, description: &str) {
        let status = if condition { "✓" } else { "✗" };
        let msg = format!("    {} {}", status, description);
        eprintln!("{}", msg);
        self.logs.push(msg);
        assert!(condition, "FAILED: {}", description);
    }

    fn done(&self) {
        eprintln!("\n  ══════════════════════════════════════════════════════");
        eprintln!("  ✓ Story completed: {} ({} steps)", self.name, self.logs.len());
        eprintln!();
    }
}

// ═══════════════════════════════════════════════════════════════
// FAKE BACKEND
// ═══════════════════════════════════════════════════════════════

/// Backend whose chat streams are driven by the test
#[derive(Default)]
struct FakeBackend {
    streams: Mutex<Vec<mpsc::Sender<StreamEvent>>>,
    requests: Mutex<Vec<(String, Vec<Message>)>>,
    reject_uploads: bool,
}

impl FakeBackend {
    fn rejecting_uploads() -> Self {
        Self {
            reject_uploads: true,
            ..Default::default()
        }
    }

    /// Sender feeding the `n`th chat stream
    fn stream(&self, n: usize) -> mpsc::Sender<StreamEvent> {
        self.streams.lock().unwrap()[n].clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn chat_stream(&self, message: String, history: Vec<Message>) -> mpsc::Receiver<StreamEvent> {
        self.requests.lock().unwrap().push((message, history));
        let (tx, rx) = mpsc::channel(64);
        self.streams.lock().unwrap().push(tx);
        rx
    }

    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, UploadError> {
        if self.reject_uploads {
            return Err(UploadError::Rejected("Unsupported file type".into()));
        }
        Ok(UploadReceipt {
            server_path: format!("uploads/{}", file.name),
            message: Some(format!("Processed 2 chunks from {}", file.name)),
        })
    }

    async fn check_health(&self) -> bool {
        true
    }
}

fn new_app(backend: &Arc<FakeBackend>, store: Box<dyn HistoryStore>) -> App<FakeBackend> {
    App::new(backend.clone(), HistoryBook::open(store, 30))
}

fn memory_app(backend: &Arc<FakeBackend>) -> App<FakeBackend> {
    new_app(backend, Box::new(talk::store::MemoryHistoryStore::new()))
}

/// Apply the next background result
async fn pump(app: &mut App<FakeBackend>) {
    let event = tokio::time::timeout(Duration::from_secs(2), app.next_event())
        .await
        .expect("background result in time")
        .expect("event channel open");
    app.handle(event);
}

async fn feed(app: &mut App<FakeBackend>, tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) {
    tx.send(event).await.unwrap();
    pump(app).await;
}

fn pdf() -> Attachment {
    Attachment::optimistic("report.pdf", "application/pdf", b"%PDF-1.7".to_vec())
}

// ═══════════════════════════════════════════════════════════════
// STORY: User chats with the assistant
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_hello_streams_into_open_reply() {
    let mut t = TestTracer::new("Hello is answered fragment by fragment");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    t.step("When the user sends \"Hello\"");
    app.submit("Hello").unwrap();

    let messages = app.chat().messages();
    t.expect(messages.len() == 2, "Two messages in the live list");
    t.expect(messages[0] == Message::user("Hello"), "First is the user message");
    t.expect(
        messages[1].role == Role::Assistant && messages[1].content.is_empty(),
        "Second is an empty assistant message",
    );
    t.expect(app.chat().open_assistant() == Some(1), "Assistant message is open");

    t.step("When fragments \"Hi\" and \" there\" arrive");
    let tx = backend.stream(0);
    feed(&mut app, &tx, StreamEvent::Fragment("Hi".into())).await;
    t.expect(app.chat().messages()[1].content == "Hi", "Partial reply shown");
    feed(&mut app, &tx, StreamEvent::Fragment(" there".into())).await;
    t.expect(app.chat().messages()[1].content == "Hi there", "Reply is \"Hi there\"");

    t.step("When the stream ends");
    feed(&mut app, &tx, StreamEvent::Done).await;
    t.expect(app.chat().state() == ChatState::Idle, "Back to idle");
    t.expect(app.chat().open_assistant().is_none(), "No open assistant message");

    t.done();
}

#[tokio::test]
async fn story_reply_is_concatenation_of_fragments() {
    let mut t = TestTracer::new("Open reply always equals fragments so far");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    app.submit("Tell me something").unwrap();
    let tx = backend.stream(0);

    let fragments = ["Rust", " ", "is", "", " 🦀", " fast", ".\n", "Done"];
    let mut expected = String::new();

    for fragment in fragments {
        t.step(&format!("Fragment {:?} arrives", fragment));
        feed(&mut app, &tx, StreamEvent::Fragment(fragment.to_string())).await;
        expected.push_str(fragment);
        t.expect(
            app.chat().messages()[1].content == expected,
            "Content equals concatenation so far",
        );
    }

    feed(&mut app, &tx, StreamEvent::Done).await;
    t.expect(app.chat().messages().len() == 2, "No extra messages appended");

    t.done();
}

#[tokio::test]
async fn story_blank_submit_is_ignored() {
    let mut t = TestTracer::new("Whitespace-only message does nothing");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    t.step("When the user sends only whitespace");
    let result = app.submit("   \n\t ");

    t.expect(result.is_err(), "Submit is refused");
    t.expect(app.chat().messages().is_empty(), "Live list unchanged");
    t.expect(app.chat().state() == ChatState::Idle, "Still idle");
    t.expect(backend.request_count() == 0, "Nothing sent to the backend");
    t.expect(app.history().entries().is_empty(), "History untouched");

    t.done();
}

#[tokio::test]
async fn story_second_submit_while_streaming_is_refused() {
    let mut t = TestTracer::new("Input is blocked while a reply streams");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    app.submit("first").unwrap();

    t.step("When the user sends again before the reply finishes");
    t.expect(app.submit("second").is_err(), "Second submit refused");
    t.expect(app.chat().messages().len() == 2, "Only the first turn is in the list");

    let tx = backend.stream(0);
    feed(&mut app, &tx, StreamEvent::Done).await;

    t.step("After the reply finishes");
    t.expect(app.submit("second").is_ok(), "Submit accepted again");
    t.expect(app.chat().messages().len() == 4, "Second turn appended");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: User sends a file
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_file_send_settles_attachment() {
    let mut t = TestTracer::new("File is uploaded before the question is asked");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    t.step("When the user sends a PDF with a question");
    app.submit_with("What is this about?", Some(pdf())).unwrap();

    let user = &app.chat().messages()[0];
    t.expect(app.chat().messages().len() == 1, "Only the user message so far");
    t.expect(
        user.file.as_ref().is_some_and(|f| f.uploading),
        "Attachment shown optimistically as uploading",
    );
    t.expect(app.history().entries().is_empty(), "Pending upload not saved");
    t.expect(backend.request_count() == 0, "Chat waits for the upload");

    t.step("When the upload completes");
    pump(&mut app).await;
    t.expect(
        matches!(app.take_notice(), Some(ChatNotice::Info(m)) if m.contains("report.pdf")),
        "Upload status message surfaced",
    );

    let messages = app.chat().messages();
    t.expect(messages.len() == 2, "Exactly one user and one assistant message");
    t.expect(messages[0].role == Role::User, "User first");
    t.expect(messages[1].role == Role::Assistant, "Assistant second");
    let file = messages[0].file.as_ref().unwrap();
    t.expect(!file.uploading, "Attachment no longer uploading");
    t.expect(
        file.server_path.as_deref().is_some_and(|p| !p.is_empty()),
        "Attachment has a server path",
    );
    t.expect(file.preview.is_none(), "Local preview released");

    let tx = backend.stream(0);
    feed(&mut app, &tx, StreamEvent::Fragment("A quarterly report.".into())).await;
    feed(&mut app, &tx, StreamEvent::Done).await;

    let saved = &app.history().entries()[0];
    t.expect(saved.messages.len() == 2, "Turn saved to history");
    t.expect(
        saved.messages[0].file.as_ref().is_some_and(|f| !f.uploading),
        "Saved attachment is settled",
    );

    t.done();
}

#[tokio::test]
async fn story_file_only_message_names_the_file() {
    let mut t = TestTracer::new("File without text still gives the model context");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    app.submit_with("", Some(pdf())).unwrap();
    pump(&mut app).await;

    let requests = backend.requests.lock().unwrap();
    let (message, history) = &requests[0];
    t.expect(message.contains("report.pdf"), "Outbound text names the file");
    t.expect(history.len() == 1, "History carries the user message only");
    t.expect(app.history().entries()[0].title.starts_with("report.pdf"), "Title from file name");

    t.done();
}

#[tokio::test]
async fn story_upload_failure_returns_to_idle() {
    let mut t = TestTracer::new("Rejected upload ends the turn");
    let backend = Arc::new(FakeBackend::rejecting_uploads());
    let mut app = memory_app(&backend);

    t.step("When the user sends a file the backend rejects");
    app.submit_with("summarize", Some(pdf())).unwrap();
    pump(&mut app).await;

    t.expect(app.chat().state() == ChatState::Idle, "State machine is idle");
    t.expect(
        app.chat().messages().iter().all(|m| m.role != Role::Assistant),
        "No assistant message appended",
    );
    t.expect(
        matches!(app.take_notice(), Some(ChatNotice::Error(_))),
        "User is told the upload failed",
    );
    t.expect(backend.request_count() == 0, "Chat never called");

    t.step("The user can try again with text");
    t.expect(app.submit("never mind").is_ok(), "Next submit accepted");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: User manages conversation history
// ═══════════════════════════════════════════════════════════════

async fn complete_turn(app: &mut App<FakeBackend>, backend: &FakeBackend, text: &str, reply: &str) {
    let n = backend.streams.lock().unwrap().len();
    app.submit(text).unwrap();
    let tx = backend.stream(n);
    feed(app, &tx, StreamEvent::Fragment(reply.into())).await;
    feed(app, &tx, StreamEvent::Done).await;
}

#[tokio::test]
async fn story_new_chat_creates_entry_at_top() {
    let mut t = TestTracer::new("First message of a new chat creates one entry");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    complete_turn(&mut app, &backend, "An older conversation", "ok").await;
    let before = app.history().entries().to_vec();

    t.step("When the user starts a new chat");
    app.new_session(View::Chat);
    t.expect(app.chat().messages().is_empty(), "Live list cleared");
    t.expect(app.history().current().is_none(), "No conversation selected");
    t.expect(app.history().entries() == before.as_slice(), "Existing entries untouched");

    t.step("When the first message is sent");
    complete_turn(&mut app, &backend, "How do lifetimes work in practice?", "Like this.").await;

    let entries = app.history().entries();
    t.expect(entries.len() == 2, "Exactly one new entry");
    t.expect(entries[0].title == "How do lifetimes work in pract...", "Titled from message prefix");
    t.expect(entries[1] == before[0], "Older entry moved down unchanged");
    t.expect(app.history().current() == Some(0), "New entry is current");

    t.done();
}

#[tokio::test]
async fn story_selected_history_is_updated() {
    let mut t = TestTracer::new("Continuing an old conversation updates it in place");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    complete_turn(&mut app, &backend, "alpha", "a").await;
    app.new_session(View::Chat);
    complete_turn(&mut app, &backend, "beta", "b").await;

    t.step("When the user opens history entry 1 (alpha)");
    t.expect(app.select_chat(1), "Entry selected");
    t.expect(app.chat().messages()[0].content == "alpha", "Its messages are live");

    t.step("When the user sends a follow-up");
    complete_turn(&mut app, &backend, "more alpha", "aa").await;

    let entries = app.history().entries();
    t.expect(entries.len() == 2, "No new entry created");
    t.expect(entries[1].messages.len() == 4, "Entry 1 gained the turn");
    t.expect(entries[1].title == "alpha...", "Title kept");
    t.expect(entries[0].messages.len() == 2, "Other entry untouched");

    let requests = backend.requests.lock().unwrap();
    let (_, sent_history) = requests.last().unwrap();
    t.expect(sent_history.len() == 3, "Full prior conversation sent with the message");

    t.done();
}

#[tokio::test]
async fn story_navigating_away_discards_late_fragments() {
    let mut t = TestTracer::new("Results of an abandoned turn are dropped");
    let backend = Arc::new(FakeBackend::default());
    let mut app = memory_app(&backend);

    complete_turn(&mut app, &backend, "saved chat", "yes").await;
    app.submit("slow question").unwrap();
    let slow = backend.stream(1);

    t.step("When the user starts a new chat mid-stream");
    app.new_session(View::Chat);
    t.expect(app.chat().state() == ChatState::Idle, "New chat is idle");

    t.step("When the old stream keeps talking");
    feed(&mut app, &slow, StreamEvent::Fragment("too late".into())).await;
    feed(&mut app, &slow, StreamEvent::Done).await;

    t.expect(app.chat().messages().is_empty(), "New chat unaffected");
    t.expect(
        app.history().entries().iter().all(|c| c.messages.iter().all(|m| m.content != "too late")),
        "Late fragment reaches no saved conversation",
    );

    t.step("The new chat works normally");
    complete_turn(&mut app, &backend, "fresh start", "hello").await;
    t.expect(app.chat().messages()[1].content == "hello", "Fresh reply shown");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: History survives restarts
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_malformed_history_starts_empty() {
    let mut t = TestTracer::new("Corrupt history file does not crash the app");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, "[{\"title\": \"broken\", \"messages\": ").unwrap();

    t.step("When the app loads the corrupt file");
    let store = JsonHistoryStore::new(&path);
    t.expect(store.try_load().is_err(), "Strict load reports the problem");
    t.expect(store.load().is_empty(), "Lenient load yields empty history");

    let backend = Arc::new(FakeBackend::default());
    let mut app = new_app(&backend, Box::new(JsonHistoryStore::new(&path)));
    t.expect(app.history().entries().is_empty(), "App starts with empty history");

    t.step("When the user chats");
    complete_turn(&mut app, &backend, "start over", "sure").await;

    let reloaded = JsonHistoryStore::new(&path).try_load().unwrap();
    t.expect(reloaded.len() == 1, "File replaced with valid history");

    t.done();
}

#[tokio::test]
async fn story_history_persists_across_restart() {
    let mut t = TestTracer::new("Conversations are there after restart");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let backend = Arc::new(FakeBackend::default());

    t.step("Given a session with a text turn and a file turn");
    {
        let mut app = new_app(&backend, Box::new(JsonHistoryStore::new(&path)));
        complete_turn(&mut app, &backend, "remember me", "I will").await;
        app.submit_with("and this", Some(pdf())).unwrap();
        pump(&mut app).await;
        let tx = backend.stream(1);
        feed(&mut app, &tx, StreamEvent::Fragment("noted".into())).await;
        feed(&mut app, &tx, StreamEvent::Done).await;
    }

    t.step("When the app starts again");
    let app = new_app(&backend, Box::new(JsonHistoryStore::new(&path)));
    let entries = app.history().entries();

    t.expect(entries.len() == 1, "One conversation restored");
    t.expect(entries[0].messages.len() == 4, "All four messages restored");
    let file = entries[0].messages[2].file.as_ref().unwrap();
    t.expect(file.name == "report.pdf", "Attachment name restored");
    t.expect(file.server_path.as_deref() == Some("uploads/report.pdf"), "Server path restored");
    t.expect(file.preview.is_none(), "Local preview not persisted");
    t.expect(app.history().current().is_none(), "Nothing selected on start");

    t.done();
}
