use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use hej::config::Config;
use hej::service::NoteService;
use hej::storage::{GraphQlStore, MemoryStore, NoteStore};

mod tui;

use tui::app::App;

const TICK: Duration = Duration::from_millis(50);
const OFFLINE_LATENCY: Duration = Duration::from_millis(150);

/// Terminal notes client with debounced autosave
#[derive(Parser, Debug)]
#[command(name = "hej", author, version, about)]
struct Args {
    /// Config file (default: <config dir>/hej/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// GraphQL endpoint, overrides the config file
    #[arg(long)]
    endpoint: Option<String>,

    /// Keep notes in memory instead of talking to a server
    #[arg(long)]
    offline: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Log to a file; the terminal belongs to the UI
fn init_logging(config: &Config, verbose: u8) -> Result<WorkerGuard> {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory {}", config.log_dir.display()))?;
    let appender = tracing_appender::rolling::never(&config.log_dir, "hej.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("hej={}", level).parse()?),
        )
        .init();
    Ok(guard)
}

fn build_service(config: &Config, offline: bool) -> Result<NoteService> {
    let (store, logged_in): (Arc<dyn NoteStore>, bool) = if offline {
        tracing::info!("running offline with an in-memory store");
        (Arc::new(MemoryStore::new().with_latency(OFFLINE_LATENCY)), true)
    } else {
        let store = GraphQlStore::new(&config.endpoint, config.session_key.clone())?;
        tracing::info!(endpoint = store.endpoint(), logged_in = store.is_logged_in(), "using remote note store");
        let logged_in = store.is_logged_in();
        (Arc::new(store), logged_in)
    };
    Ok(NoteService::new(store, logged_in)
        .with_debounce(config.debounce())
        .with_refetch_interval(config.refetch_interval()))
}

async fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    app.tick().await;
    while !app.should_quit {
        terminal.draw(|f| app.render(f))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code, key.modifiers).await?;
                }
            }
        }
        app.tick().await;
    }
    app.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    let _log_guard = init_logging(&config, args.verbose)?;
    let service = build_service(&config, args.offline)?;

    // Setup terminal
    enable_raw_mode().map_err(|e| anyhow::anyhow!("Failed to enable raw mode: {}. Make sure you're running in a terminal.", e))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(|e| anyhow::anyhow!("Failed to enter alternate screen: {}. Make sure you're running in a terminal.", e))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).map_err(|e| anyhow::anyhow!("Failed to create terminal: {}. Make sure you're running in a terminal.", e))?;

    let mut app = App::new(service);
    let result = run(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    result
}
