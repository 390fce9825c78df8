//! Terminal UI
//!
//! Features:
//! - Chat view with streaming replies and file attachments
//! - History sidebar (open / new conversation)
//! - Face Lab and WAN Analysis tool views
//! - Backend online/offline indicator
//! - In-app log

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

use talk::app::App;
use talk::client::BackendClient;
use talk::config::Config;
use talk::conversation::ChatNotice;
use talk::face::{self, ToolOutcome, ToolPanel};
use talk::health::HealthMonitor;
use talk::history::HistoryBook;
use talk::message::Role;
use talk::router::View;
use talk::store::JsonHistoryStore;

const SIDEBAR_WIDTH: u16 = 30;

/// Main TUI state (everything that is not chat state)
struct TuiState {
    input: String,
    log: Vec<String>,
    tick: usize,
    show_log: bool,
    online: bool,
    /// Highlighted sidebar row
    selected: usize,
    notice: Option<ChatNotice>,
    face_lab: ToolPanel,
    wan: ToolPanel,
}

impl TuiState {
    fn new() -> Self {
        Self {
            input: String::new(),
            log: Vec::new(),
            tick: 0,
            show_log: false,
            online: false,
            selected: 0,
            notice: None,
            face_lab: ToolPanel {
                status: "Enter: <source image> <target image or video>".into(),
                ..Default::default()
            },
            wan: ToolPanel {
                status: "Enter: <image>".into(),
                ..Default::default()
            },
        }
    }

    fn log(&mut self, msg: impl Into<String>) {
        let now = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("[{}] {}", now, msg.into()));
    }
}

/// Run the main TUI
pub async fn run_tui(cfg: &Config, backend_url: &str) -> Result<()> {
    let client = Arc::new(BackendClient::new(backend_url));
    let store = JsonHistoryStore::new(talk::config::history_path()?);
    let book = HistoryBook::open(Box::new(store), cfg.title_len);
    let mut app = App::new(client.clone(), book);
    let health = HealthMonitor::start(client, cfg.health_interval());

    let mut terminal = setup_terminal()?;
    let result = run_tui_loop(&mut terminal, &mut app, &health).await;
    restore_terminal(terminal)?;
    health.stop().await;
    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App<BackendClient>,
    health: &HealthMonitor,
) -> Result<()> {
    let mut state = TuiState::new();
    state.log(format!("Backend: {}", app.backend().base_url()));
    state.log(format!("{} saved conversations", app.history().entries().len()));

    let (tool_tx, mut tool_rx) = mpsc::unbounded_channel::<ToolOutcome>();

    loop {
        state.tick += 1;

        // Apply stream/upload results
        app.drain();

        if let Some(notice) = app.take_notice() {
            match &notice {
                ChatNotice::Info(m) => state.log(m.clone()),
                ChatNotice::Error(m) => state.log(format!("Error: {}", m)),
            }
            state.notice = Some(notice);
        }

        while let Ok(outcome) = tool_rx.try_recv() {
            match outcome {
                ToolOutcome::Swap(_) => state.face_lab.finish(outcome),
                ToolOutcome::Analysis(_) => state.wan.finish(outcome),
            }
        }

        let online = health.is_online();
        if online != state.online {
            state.online = online;
            state.log(if online { "System Online" } else { "System Offline" });
        }

        // Render
        terminal.draw(|f| render_tui(f, &state, app))?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if !handle_key(key, &mut state, app, &tool_tx) {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Returns false when the user asked to quit
fn handle_key(
    key: KeyEvent,
    state: &mut TuiState,
    app: &mut App<BackendClient>,
    tool_tx: &mpsc::UnboundedSender<ToolOutcome>,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global controls
    match key.code {
        KeyCode::Esc => return false,
        KeyCode::Tab => {
            app.show(app.view().next());
            return true;
        }
        KeyCode::Char('n') if ctrl => {
            app.new_session(View::Chat);
            state.notice = None;
            state.log("New chat");
            return true;
        }
        KeyCode::Char('f') if ctrl => {
            app.new_session(View::FaceLab);
            return true;
        }
        KeyCode::Char('w') if ctrl => {
            app.new_session(View::WanAnalysis);
            return true;
        }
        KeyCode::Char('l') if ctrl => {
            state.show_log = !state.show_log;
            return true;
        }
        KeyCode::Char('o') if ctrl => {
            if app.select_chat(state.selected) {
                state.notice = None;
                state.log(format!("Opened conversation {}", state.selected));
            }
            return true;
        }
        KeyCode::Up if ctrl => {
            state.selected = state.selected.saturating_sub(1);
            return true;
        }
        KeyCode::Down if ctrl => {
            let last = app.history().entries().len().saturating_sub(1);
            state.selected = (state.selected + 1).min(last);
            return true;
        }
        _ => {}
    }

    match key.code {
        KeyCode::Enter => {
            let line = state.input.trim().to_string();
            match app.view() {
                View::Chat => submit_chat(&line, state, app),
                View::FaceLab => start_face_swap(&line, state, app, tool_tx),
                View::WanAnalysis => start_analysis(&line, state, app, tool_tx),
            }
        }
        KeyCode::Char(c) if !ctrl => state.input.push(c),
        KeyCode::Backspace => {
            state.input.pop();
        }
        _ => {}
    }

    true
}

fn submit_chat(line: &str, state: &mut TuiState, app: &mut App<BackendClient>) {
    if let Some(path) = line.strip_prefix("/attach ") {
        match app.stage_file(&PathBuf::from(path.trim())) {
            Ok(file) => {
                let msg = format!("Attached {}", file.name);
                state.log(msg);
                state.input.clear();
            }
            Err(e) => {
                state.log(format!("Attach failed: {}", e));
                state.notice = Some(ChatNotice::Error(e.to_string()));
            }
        }
        return;
    }
    if line == "/detach" {
        app.clear_staged();
        state.input.clear();
        return;
    }

    match app.submit(line) {
        Ok(turn) => {
            state.log(format!("Turn {} sent: {}", turn, preview(line, 50)));
            state.input.clear();
            state.notice = None;
        }
        Err(e) => tracing::debug!(error = %e, "submit ignored"),
    }
}

fn start_face_swap(
    line: &str,
    state: &mut TuiState,
    app: &App<BackendClient>,
    tool_tx: &mpsc::UnboundedSender<ToolOutcome>,
) {
    if state.face_lab.busy {
        return;
    }
    let (source, target) = match face::parse_swap_args(line) {
        Ok(paths) => paths,
        Err(reason) => {
            state.face_lab.reject(reason);
            return;
        }
    };

    let status = if face::is_video(&target) {
        "Processing video face swap... This may take a while."
    } else {
        "Processing Face Swap... This may take a moment."
    };
    state.face_lab.begin(status);
    state.log(format!("Face swap: {} -> {}", source.display(), target.display()));
    state.input.clear();

    let client = app.backend().clone();
    let tx = tool_tx.clone();
    tokio::spawn(async move {
        let result = client.face_swap(&source, &target).await;
        let _ = tx.send(ToolOutcome::Swap(result));
    });
}

fn start_analysis(
    line: &str,
    state: &mut TuiState,
    app: &App<BackendClient>,
    tool_tx: &mpsc::UnboundedSender<ToolOutcome>,
) {
    if state.wan.busy {
        return;
    }
    if line.is_empty() {
        state.wan.reject("Please provide an image.");
        return;
    }
    let image = PathBuf::from(line);
    state.wan.begin("Analyzing...");
    state.log(format!("WAN analysis: {}", image.display()));
    state.input.clear();

    let client = app.backend().clone();
    let tx = tool_tx.clone();
    tokio::spawn(async move {
        let result = client.analyze_face(&image).await;
        let _ = tx.send(ToolOutcome::Analysis(result));
    });
}

// ═══════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════

fn render_tui(f: &mut Frame, state: &TuiState, app: &App<BackendClient>) {
    let area = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Header + tabs
            Constraint::Min(5),     // Sidebar + main content
            Constraint::Length(3),  // Input
            Constraint::Length(1),  // Status
        ])
        .split(area);

    // Header with views and backend status
    let status = if state.online { "System Online" } else { "System Offline" };
    let tabs = Tabs::new(View::all().iter().map(|v| v.name()))
        .select(View::all().iter().position(|v| *v == app.view()).unwrap_or(0))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("talk | {}", status))
                .border_style(Style::default().fg(if state.online { Color::Green } else { Color::Red })),
        );
    f.render_widget(tabs, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)])
        .split(chunks[1]);

    render_sidebar(f, state, app, body[0]);

    if state.show_log {
        render_log(f, state, body[1]);
    } else {
        match app.view() {
            View::Chat => render_chat(f, state, app, body[1]),
            View::FaceLab => render_panel(f, &state.face_lab, "Face Lab", body[1]),
            View::WanAnalysis => render_panel(f, &state.wan, "WAN Analysis", body[1]),
        }
    }

    render_input(f, state, app, chunks[2]);

    let busy = app.chat().state().is_busy() || state.face_lab.busy || state.wan.busy;
    let status = format!(
        " {} | {} | ^N new ^O open ^↑/^↓ pick ^F face ^W wan ^L log Tab:switch Esc:quit",
        if busy { spinner_char(state.tick) } else { ' ' },
        app.chat().state().name(),
    );
    let status = Paragraph::new(status).style(Style::default().fg(Color::DarkGray));
    f.render_widget(status, chunks[3]);
}

fn render_sidebar(f: &mut Frame, state: &TuiState, app: &App<BackendClient>, area: Rect) {
    let width = area.width.saturating_sub(6) as usize;
    let current = app.history().current();

    let items: Vec<ListItem> = app
        .history()
        .entries()
        .iter()
        .enumerate()
        .map(|(i, chat)| {
            let marker = if Some(i) == current { "•" } else { " " };
            ListItem::new(format!("{} {}", marker, fit(&chat.title, width)))
        })
        .collect();

    let mut list_state = ListState::default();
    if !items.is_empty() {
        list_state.select(Some(state.selected.min(items.len() - 1)));
    }

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("History"))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol(">");
    f.render_stateful_widget(list, area, &mut list_state);
}

fn render_chat(f: &mut Frame, state: &TuiState, app: &App<BackendClient>, area: Rect) {
    let messages = app.chat().messages();
    let mut lines: Vec<String> = Vec::new();

    if messages.is_empty() {
        lines.push("Talk".into());
        lines.push("Your private, local AI companion.".into());
        lines.push(String::new());
        lines.push("Talk can make mistakes. Consider checking important information.".into());
    }

    let open = app.chat().open_assistant();
    for (i, msg) in messages.iter().enumerate() {
        lines.push(match msg.role {
            Role::User => "You".into(),
            Role::Assistant => "Talk".into(),
        });
        if let Some(file) = &msg.file {
            let note = match (&file.server_path, file.uploading) {
                (_, true) => "uploading...".to_string(),
                (Some(path), false) => path.clone(),
                (None, false) => "upload failed".to_string(),
            };
            lines.push(format!("  [{}: {}]", file.name, note));
        }
        let mut content = msg.content.clone();
        if open == Some(i) {
            content.push('▌');
        }
        for line in content.lines() {
            lines.push(format!("  {}", line));
        }
        lines.push(String::new());
    }

    if let Some(notice) = &state.notice {
        lines.push(match notice {
            ChatNotice::Info(m) => format!("[{}]", m),
            ChatNotice::Error(m) => format!("[Error: {}]", m),
        });
    }

    // Keep the newest text in view
    let inner_width = area.width.saturating_sub(2).max(1) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    let total: usize = lines.iter().map(|l| wrapped_rows(l, inner_width)).sum();
    let scroll = total.saturating_sub(inner_height) as u16;

    let para = Paragraph::new(lines.join("\n"))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(Block::default().borders(Borders::ALL).title("Chat"));
    f.render_widget(para, area);
}

fn render_panel(f: &mut Frame, panel: &ToolPanel, title: &str, area: Rect) {
    let mut lines = vec![panel.status.clone(), String::new()];
    lines.extend(panel.lines.iter().cloned());

    let para = Paragraph::new(lines.join("\n"))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title.to_string()));
    f.render_widget(para, area);
}

fn render_input(f: &mut Frame, state: &TuiState, app: &App<BackendClient>, area: Rect) {
    let chat_busy = app.chat().state().is_busy();
    let title = match app.view() {
        View::Chat if chat_busy => "Generating...".to_string(),
        View::Chat => match app.staged() {
            Some(file) => format!("Message Talk... [+ {}]  (/detach to remove)", file.name),
            None => "Message Talk... (Enter to send, /attach <path>)".to_string(),
        },
        View::FaceLab => "Source and target paths".to_string(),
        View::WanAnalysis => "Image path".to_string(),
    };
    let style = if app.view() == View::Chat && chat_busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };

    let input = Paragraph::new(state.input.as_str())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(input, area);
}

fn render_log(f: &mut Frame, state: &TuiState, area: Rect) {
    let text: String = state.log.iter().rev().take(50).cloned().collect::<Vec<_>>().join("\n");
    let para = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(para, area);
}

fn spinner_char(tick: usize) -> char {
    const SPINNER: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
    SPINNER[tick % SPINNER.len()]
}

/// Rows a line takes once wrapped at `width` columns
fn wrapped_rows(line: &str, width: usize) -> usize {
    let w = UnicodeWidthStr::width(line);
    if w == 0 {
        1
    } else {
        w.div_ceil(width)
    }
}

/// Cut a string to `width` display columns
fn fit(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + cw + 1 > width {
            break;
        }
        used += cw;
        out.push(c);
    }
    out.push('…');
    out
}

fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ═══════════════════════════════════════════════════════════════
// TERMINAL SETUP
// ═══════════════════════════════════════════════════════════════

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
