use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    queue,
    terminal::{Clear, ClearType},
};
use shadowread_core::Command;
use tracing::trace;

/// Shown instead of the page while the reader is hidden.
pub const DECOY_TEXT: &str = "Hello world";

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    BeginSearch,
    SearchQueryChanged { query: String },
    SearchSubmit { query: String },
    SearchCancel,
    ToggleDecoy,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    search_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.search_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Search => self.map_event_search(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };

        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Char(' '), KeyModifiers::NONE)
            | (KeyCode::Down, _)
            | (KeyCode::Right, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::NextPage { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) | (KeyCode::Left, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::PrevPage { count })
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Search);
                UiEvent::BeginSearch
            }
            (KeyCode::Char('b'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::ToggleDecoy
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_search(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };

        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::SearchCancel
            }
            (KeyCode::Enter, _) => {
                let query = std::mem::take(&mut self.search_buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::SearchSubmit { query }
            }
            (KeyCode::Backspace, _) => {
                self.search_buffer.pop();
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.search_buffer.push(c);
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if matches!(self.mode, InputMode::Search) {
            return Some(format!("/{}", self.search_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

/// What the single status line currently shows.
///
/// A page stays visible for `hidden_after`, then the decoy text takes its
/// place until the reader reveals it again.
#[derive(Debug)]
pub struct StatusLine {
    last_text: String,
    showing_decoy: bool,
    hidden_after: Option<Duration>,
    deadline: Option<Instant>,
}

impl StatusLine {
    pub fn new(hidden_after: Option<Duration>) -> Self {
        Self {
            last_text: String::new(),
            showing_decoy: false,
            hidden_after,
            deadline: None,
        }
    }

    pub fn text(&self) -> &str {
        if self.showing_decoy {
            DECOY_TEXT
        } else {
            &self.last_text
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.showing_decoy
    }

    pub fn set_message(&mut self, text: impl Into<String>, now: Instant) {
        self.last_text = text.into();
        self.reveal(now);
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.showing_decoy {
            self.reveal(now);
        } else {
            self.hide();
        }
    }

    /// Applies the auto-hide deadline. Returns true when the text changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline && !self.showing_decoy => {
                trace!("hiding status line");
                self.hide();
                true
            }
            _ => false,
        }
    }

    fn reveal(&mut self, now: Instant) {
        self.showing_decoy = false;
        self.deadline = self.hidden_after.map(|after| now + after);
    }

    fn hide(&mut self) {
        self.showing_decoy = true;
        self.deadline = None;
    }
}

/// Replaces the current terminal line with `label`.
pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    queue!(writer, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    write!(writer, "{}", label)?;
    writer.flush()
}
