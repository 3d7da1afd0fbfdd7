use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event;
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use shadowread_core::{Command, FileStateStore, ReaderConfig, Session, StateStore};
use shadowread_source::SourceFactory;
use shadowread_tty::{write_status_line, EventMapper, StatusLine, UiEvent};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "shadowread",
    version,
    about = "read a novel one status line at a time"
)]
struct Args {
    /// Characters per page (overrides the config file)
    #[arg(short = 'p', long = "page-size")]
    page_size: Option<usize>,

    /// Config file to use instead of the platform default
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Print the chapter outline and exit
    #[arg(long)]
    outline: bool,

    /// Print the outline as a JSON array
    #[arg(long, requires = "outline")]
    json: bool,

    /// UTF-32LE encoded book to read
    file: PathBuf,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "shadowread", "shadowread")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, args.outline)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| ReaderConfig::default_path(&project_dirs));
    let mut config = ReaderConfig::load_or_default(&config_path)?;
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    config.validate()?;
    info!(?config_path, page_size = config.page_size, "loaded configuration");

    let state_dir = project_dirs.data_local_dir().join("state");
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(state_dir)?);
    let mut session = Session::new(store, config.clone());

    let provider = SourceFactory::new();
    let first = session.open_with(&provider, args.file.clone()).await?;

    if args.outline {
        let outline = session.outline()?;
        let mut stdout = io::stdout().lock();
        if args.json {
            serde_json::to_writer_pretty(&mut stdout, &outline)?;
            writeln!(stdout)?;
        } else {
            for heading in outline {
                writeln!(stdout, "{}", heading)?;
            }
        }
        return Ok(());
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;

    let mut mapper = EventMapper::new();
    let mut status = StatusLine::new(config.hidden_after());
    status.set_message(first, Instant::now());
    let mut dirty = true;

    loop {
        if status.tick(Instant::now()) {
            dirty = true;
        }
        if dirty {
            draw_status(&mut stdout, &status, mapper.pending_input().as_deref())?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ui_event = mapper.map_event(event::read()?);
            match handle_event(ui_event, &mut session, &mut status) {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }
    }

    crossterm::execute!(stdout, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    session.persist()?;
    Ok(())
}

fn handle_event(event: UiEvent, session: &mut Session, status: &mut StatusLine) -> LoopAction {
    let now = Instant::now();
    match event {
        UiEvent::Command(cmd) => {
            run_command(session, status, cmd, now);
            LoopAction::ContinueRedraw
        }
        UiEvent::SearchSubmit { query } => {
            run_command(session, status, Command::Search { keyword: query }, now);
            LoopAction::ContinueRedraw
        }
        UiEvent::BeginSearch | UiEvent::SearchQueryChanged { .. } | UiEvent::SearchCancel => {
            LoopAction::ContinueRedraw
        }
        UiEvent::ToggleDecoy => {
            status.toggle(now);
            LoopAction::ContinueRedraw
        }
        UiEvent::Quit => LoopAction::Quit,
        UiEvent::None => LoopAction::Continue,
    }
}

/// Runs a reading command; failures are shown on the status line.
fn run_command(session: &mut Session, status: &mut StatusLine, cmd: Command, now: Instant) {
    match session.apply(cmd) {
        Ok(text) => status.set_message(text, now),
        Err(err) => {
            warn!("command failed: {err:#}");
            status.set_message(format!("error: {err:#}"), now);
        }
    }
}

fn draw_status(stdout: &mut io::Stdout, status: &StatusLine, pending: Option<&str>) -> Result<()> {
    let (_, rows) = terminal::size()?;
    crossterm::queue!(stdout, cursor::MoveTo(0, rows.saturating_sub(1)))?;
    let line = match pending {
        Some(pending) if !status.is_hidden() => format!("{}  {}", status.text(), pending),
        _ => status.text().to_string(),
    };
    write_status_line(stdout, &line)?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs, console: bool) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "shadowread.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // the interactive loop owns the terminal, so only batch modes log to stderr
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_outline_flags() {
        let args = Args::try_parse_from(["shadowread", "--outline", "--json", "book.txt"]).unwrap();
        assert!(args.outline);
        assert!(args.json);
        assert_eq!(args.file, PathBuf::from("book.txt"));
        assert_eq!(args.page_size, None);
    }

    #[test]
    fn json_requires_outline() {
        assert!(Args::try_parse_from(["shadowread", "--json", "book.txt"]).is_err());
    }

    #[test]
    fn page_size_override_is_parsed() {
        let args = Args::try_parse_from(["shadowread", "-p", "30", "book.txt"]).unwrap();
        assert_eq!(args.page_size, Some(30));
    }
}
