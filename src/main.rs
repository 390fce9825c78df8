//! talk - terminal client for a local Talk backend
//!
//! USAGE:
//!   talk                          # interactive chat (TUI)
//!   talk ask "..." [--file PATH]  # one-shot: stream a single reply
//!   talk history                  # list saved conversations
//!   talk doctor                   # check config, history, backend
//!   talk face-swap <src> <tgt>    # swap a face onto an image or video
//!   talk analyze <image>          # face realness report
//!   talk config set <key> <value> # non-interactive config

mod ui;

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use talk::app::{App, AppEvent};
use talk::client::{Backend, BackendClient, StreamEvent};
use talk::config::{self, Config};
use talk::conversation::ChatNotice;
use talk::face;
use talk::history::HistoryBook;
use talk::store::{HistoryStore, JsonHistoryStore};

/// Log filter variable (tracing EnvFilter syntax)
const LOG_ENV: &str = "TALK_LOG";

// ═══════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, PartialEq)]
enum Command {
    Interactive,
    Ask {
        text: String,
        file: Option<PathBuf>,
    },
    History,
    Doctor,
    FaceSwap {
        source: PathBuf,
        target: PathBuf,
    },
    Analyze {
        image: PathBuf,
    },
    ConfigSet {
        key: String,
        value: String,
    },
    Help,
}

fn parse_args(args: &[String]) -> Command {
    if args.is_empty() {
        return Command::Interactive;
    }

    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Command::Help;
    }

    match args[0].as_str() {
        "history" => Command::History,
        "doctor" => Command::Doctor,
        "face-swap" => match (args.get(1), args.get(2)) {
            (Some(source), Some(target)) => Command::FaceSwap {
                source: PathBuf::from(source),
                target: PathBuf::from(target),
            },
            _ => Command::Help,
        },
        "analyze" => match args.get(1) {
            Some(image) => Command::Analyze {
                image: PathBuf::from(image),
            },
            None => Command::Help,
        },
        "config" if args.get(1).map(|s| s.as_str()) == Some("set") => Command::ConfigSet {
            key: args.get(2).cloned().unwrap_or_default(),
            value: args.get(3).cloned().unwrap_or_default(),
        },
        "ask" => {
            let mut text = Vec::new();
            let mut file = None;
            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--file" | "-f" => {
                        i += 1;
                        file = args.get(i).map(PathBuf::from);
                    }
                    s => text.push(s.to_string()),
                }
                i += 1;
            }
            Command::Ask {
                text: text.join(" "),
                file,
            }
        }
        _ => Command::Help,
    }
}

fn print_help() {
    println!(r#"talk - terminal client for a local Talk backend

USAGE:
    talk                          # interactive chat
    talk ask "..." [--file PATH]  # one-shot question, reply streamed to stdout
    talk history                  # list saved conversations
    talk doctor                   # check config, history, backend
    talk face-swap <src> <tgt>    # swap face from <src> onto image/video <tgt>
    talk analyze <image>          # face realness / deepfake report
    talk config set <key> <value> # keys: url, interval, title-len

FLAGS:
    -f, --file <path>       Attach a pdf/png/jpg to `ask`
    -h, --help              Show this help

CONFIG:
    ~/.config/talk/config.json    Backend URL, preferences
    ~/.local/state/talk/          history.json, talk.log

ENVIRONMENT:
    TALK_BACKEND_URL              Override backend URL from config
    TALK_LOG                      Log filter (default: warn)

CONTROLS (interactive mode):
    Enter         Send / run tool
    /attach PATH  Attach a file to the next message
    /detach       Drop the attached file
    Ctrl-N        New chat
    Ctrl-F        Face Lab
    Ctrl-W        WAN Analysis
    Ctrl-Up/Down  Pick a saved conversation
    Ctrl-O        Open the picked conversation
    Ctrl-L        Toggle log
    Tab           Switch views
    Esc           Quit
"#);
}

/// Logs go to a file: the TUI owns the terminal
fn init_logging() -> Result<()> {
    config::ensure_dirs()?;
    let log_file = std::fs::File::create(config::log_path()?)?;

    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args);

    if command == Command::Help {
        print_help();
        return Ok(());
    }

    if let Err(e) = init_logging() {
        eprintln!("warning: file logging disabled: {}", e);
    }
    tracing::debug!(?command, "starting");

    match command {
        Command::Help => Ok(()),
        Command::Interactive => run_interactive().await,
        Command::Ask { text, file } => run_ask(&text, file).await,
        Command::History => run_history(),
        Command::Doctor => run_doctor().await,
        Command::FaceSwap { source, target } => run_face_swap(source, target).await,
        Command::Analyze { image } => run_analyze(image).await,
        Command::ConfigSet { key, value } => run_config_set(&key, &value),
    }
}

// ═══════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════

fn open_history(cfg: &Config) -> Result<HistoryBook> {
    let store = JsonHistoryStore::new(config::history_path()?);
    Ok(HistoryBook::open(Box::new(store), cfg.title_len))
}

async fn run_interactive() -> Result<()> {
    let cfg = Config::load()?;
    let url = config::backend_url(&cfg);
    ui::run_tui(&cfg, &url).await
}

async fn run_ask(text: &str, file: Option<PathBuf>) -> Result<()> {
    let cfg = Config::load()?;
    let client = Arc::new(BackendClient::new(config::backend_url(&cfg)));
    let mut app = App::new(client, open_history(&cfg)?);

    if let Some(path) = file {
        let staged = app
            .stage_file(&path)
            .with_context(|| format!("Cannot attach {}", path.display()))?;
        println!("Attached {} ({})", staged.name, staged.mime_type);
    }

    app.submit(text).context("Nothing to send: give a message or --file")?;

    let mut out = std::io::stdout();
    while app.chat().state().is_busy() {
        let Some(event) = app.next_event().await else {
            break;
        };
        if let AppEvent::Stream {
            event: StreamEvent::Fragment(fragment),
            ..
        } = &event
        {
            print!("{}", fragment);
            out.flush()?;
        }
        app.handle(event);

        match app.take_notice() {
            Some(ChatNotice::Info(msg)) => eprintln!("[{}]", msg),
            Some(ChatNotice::Error(msg)) => eprintln!("Error: {}", msg),
            None => {}
        }
    }
    println!();

    Ok(())
}

fn run_history() -> Result<()> {
    let cfg = Config::load()?;
    let book = open_history(&cfg)?;

    if book.entries().is_empty() {
        println!("No saved conversations.");
        return Ok(());
    }

    for (i, chat) in book.entries().iter().enumerate() {
        println!(
            "{:>3}  {}  {:<34} ({} messages)",
            i,
            chat.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            chat.title,
            chat.messages.len()
        );
    }
    Ok(())
}

async fn run_doctor() -> Result<()> {
    println!("talk doctor\n");

    // Check config
    let config_path = config::config_path()?;
    let cfg = Config::load()?;
    println!("[{}] Config: {}",
        if config_path.exists() { "✓" } else { "-" },
        config_path.display()
    );

    // Check history
    let history_path = config::history_path()?;
    match JsonHistoryStore::new(&history_path).try_load() {
        Ok(history) => println!("[✓] History: {} conversations ({})", history.len(), history_path.display()),
        Err(e) => println!("[✗] History: {} (will start empty)", e),
    }

    println!("[-] Log: {}", config::log_path()?.display());

    // Check backend
    let url = config::backend_url(&cfg);
    print!("[?] Backend {}: checking...", url);
    std::io::stdout().flush()?;
    let client = BackendClient::new(&url);
    if client.check_health().await {
        println!("\r[✓] Backend {}: online         ", url);
    } else {
        println!("\r[✗] Backend {}: offline        ", url);
    }

    Ok(())
}

async fn run_face_swap(source: PathBuf, target: PathBuf) -> Result<()> {
    let cfg = Config::load()?;
    let client = BackendClient::new(config::backend_url(&cfg));

    if face::is_video(&target) {
        println!("Processing video face swap... This may take a while.");
    } else {
        println!("Processing Face Swap... This may take a moment.");
    }

    let result = client.face_swap(&source, &target).await?;
    if let Some(message) = &result.message {
        println!("{}", message);
    }
    println!("Output: {}", result.output_url);
    Ok(())
}

async fn run_analyze(image: PathBuf) -> Result<()> {
    let cfg = Config::load()?;
    let client = BackendClient::new(config::backend_url(&cfg));

    println!("Analyzing {}...\n", image.display());
    let analysis = client.analyze_face(&image).await?;
    for line in analysis.report() {
        println!("  {}", line);
    }
    Ok(())
}

fn run_config_set(key: &str, value: &str) -> Result<()> {
    let mut cfg = Config::load()?;
    cfg.set(key, value)?;
    cfg.save()?;
    println!("{} set to {} ({})", key, value, config::config_path()?.display());
    Ok(())
}
