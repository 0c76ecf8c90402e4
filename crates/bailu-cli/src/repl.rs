//! The terminal binary's REPL: a `crossterm` raw-mode line editor,
//! bounded history, paste-burst coalescing, a slash-command dispatcher, and
//! the approval prompt's raw-mode handle.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bailu_core::mediator::{ApprovalDecision, ApprovalPrompt, ApprovalRequest};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal;

static RAW_MODE_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// RAII handle over `crossterm`'s raw mode, reference-counted so the REPL's
/// own read loop and the approval prompt borrowing the same handle mid-turn
/// restore exactly the state found on entry, rather than an inner guard's
/// drop clobbering an outer one still in scope — the approval prompt must be
/// able to temporarily detach the REPL's line-editor listeners and restore
/// them exactly as found on return.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn acquire() -> io::Result<Self> {
        if RAW_MODE_DEPTH.fetch_add(1, Ordering::SeqCst) == 0 {
            terminal::enable_raw_mode()?;
        }
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if RAW_MODE_DEPTH.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// One submitted line of input. `is_paste` is set when several full lines
/// arrived within one poll window and were coalesced into one event.
#[derive(Debug, Clone)]
pub struct InputLine {
    pub text: String,
    pub is_paste: bool,
}

/// What the REPL's read loop produced.
#[derive(Debug, Clone)]
pub enum ReplSignal {
    Line(InputLine),
    /// First `Ctrl-C` within the double-tap window: a hint was shown, the
    /// loop should keep going.
    Interrupted,
    /// Second `Ctrl-C` within the window, or `Ctrl-D` on an empty line.
    Quit,
}

/// Bounded command history, persisted one entry per line.
pub struct History {
    entries: VecDeque<String>,
    cursor: Option<usize>,
    limit: usize,
}

impl History {
    pub const DEFAULT_LIMIT: usize = 1000;

    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            entries,
            cursor: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn push(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        self.entries.push_back(line.to_string());
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        self.cursor = None;
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let joined: Vec<&str> = self.entries.iter().map(String::as_str).collect();
        std::fs::write(path, joined.join("\n"))
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    fn up(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let next = match self.cursor {
            None => self.entries.len() - 1,
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.cursor = Some(next);
        self.entries.get(next).map(String::as_str)
    }

    fn down(&mut self) -> Option<&str> {
        match self.cursor {
            None => None,
            Some(i) if i + 1 < self.entries.len() => {
                self.cursor = Some(i + 1);
                self.entries.get(i + 1).map(String::as_str)
            }
            Some(_) => {
                self.cursor = None;
                None
            }
        }
    }
}

/// Minimum time between two `Ctrl-C` presses for the second to count as the
/// "I mean it" tap.
const INTERRUPT_WINDOW: Duration = Duration::from_secs(3);

/// A raw-mode line editor: backspace/left/right/history navigation, paste
/// coalescing, and SIGINT double-tap handling.
pub struct LineEditor {
    prompt: String,
    last_interrupt: Option<Instant>,
}

impl LineEditor {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            last_interrupt: None,
        }
    }

    /// Read one logical input event from the TTY.
    pub fn read_line(&mut self, history: &mut History) -> io::Result<ReplSignal> {
        let _guard = RawModeGuard::acquire()?;
        print!("{}", self.prompt);
        io::stdout().flush()?;

        let mut buf = String::new();
        let mut cursor = 0usize;
        let mut completed_lines: Vec<String> = Vec::new();

        loop {
            let key = match event::read()? {
                Event::Key(k) => k,
                _ => continue,
            };
            let KeyEvent { code, modifiers, .. } = key;

            match code {
                KeyCode::Enter => {
                    completed_lines.push(std::mem::take(&mut buf));
                    cursor = 0;
                    println!("\r");

                    // More input already queued right after this Enter means
                    // this was one line of a multi-line paste, not a
                    // deliberate single-line submit — keep accumulating.
                    if event::poll(Duration::from_millis(0))? {
                        print!("{}", self.prompt);
                        io::stdout().flush()?;
                        continue;
                    }

                    let is_paste = completed_lines.len() > 1;
                    let text = completed_lines.join("\n");
                    if !is_paste {
                        history.push(&text);
                    }
                    return Ok(ReplSignal::Line(InputLine { text, is_paste }));
                }
                KeyCode::Backspace => {
                    if cursor > 0 {
                        cursor -= 1;
                        buf.remove(cursor);
                        redraw(&self.prompt, &buf, cursor)?;
                    }
                }
                KeyCode::Left => {
                    if cursor > 0 {
                        cursor -= 1;
                        redraw(&self.prompt, &buf, cursor)?;
                    }
                }
                KeyCode::Right => {
                    if cursor < buf.len() {
                        cursor += 1;
                        redraw(&self.prompt, &buf, cursor)?;
                    }
                }
                KeyCode::Up => {
                    if let Some(entry) = history.up() {
                        buf = entry.to_string();
                        cursor = buf.len();
                        redraw(&self.prompt, &buf, cursor)?;
                    }
                }
                KeyCode::Down => {
                    buf = history.down().unwrap_or("").to_string();
                    cursor = buf.len();
                    redraw(&self.prompt, &buf, cursor)?;
                }
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    let now = Instant::now();
                    let double_tap = self
                        .last_interrupt
                        .map(|t| now.duration_since(t) < INTERRUPT_WINDOW)
                        .unwrap_or(false);
                    self.last_interrupt = Some(now);
                    if double_tap {
                        return Ok(ReplSignal::Quit);
                    }
                    println!("\r\n(^C again within 3s to exit)");
                    return Ok(ReplSignal::Interrupted);
                }
                KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) && buf.is_empty() => {
                    return Ok(ReplSignal::Quit);
                }
                KeyCode::Char(c) => {
                    buf.insert(cursor, c);
                    cursor += 1;
                    redraw(&self.prompt, &buf, cursor)?;
                }
                _ => {}
            }
        }
    }
}

fn redraw(prompt: &str, buf: &str, cursor: usize) -> io::Result<()> {
    let mut out = io::stdout();
    write!(out, "\r{prompt}{buf}\x1b[K")?;
    let back = buf.chars().count() - cursor;
    if back > 0 {
        write!(out, "\x1b[{back}D")?;
    }
    out.flush()
}

/// A slash command recognized by the REPL instead of being forwarded to the
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Model(Option<String>),
    Compress,
    Safety(Option<String>),
    Quit,
    History,
}

/// Parse a `/`-prefixed line into a [`SlashCommand`], or `None` for ordinary
/// input (including input that merely starts with `/` but names no known
/// command — treated as regular text to avoid swallowing legitimate model
/// input about paths like `/etc/passwd`... no: unknown `/word` still routes
/// to the model, since the dispatcher table is small and fixed).
pub fn parse_slash_command(line: &str) -> Option<SlashCommand> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    let mut parts = line[1..].splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    match cmd {
        "model" => Some(SlashCommand::Model(arg)),
        "compress" => Some(SlashCommand::Compress),
        "safety" => Some(SlashCommand::Safety(arg)),
        "quit" | "exit" => Some(SlashCommand::Quit),
        "history" => Some(SlashCommand::History),
        _ => None,
    }
}

/// Colorize a unified diff by prefix: green for additions, red for removals,
/// passed through otherwise. Used by the approval prompt.
pub fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with('+') && !line.starts_with("+++") {
                format!("\x1b[32m{line}\x1b[0m")
            } else if line.starts_with('-') && !line.starts_with("---") {
                format!("\x1b[31m{line}\x1b[0m")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// The approval prompt's TTY implementation. Borrows the same
/// [`RawModeGuard`] depth counter the [`LineEditor`] uses, so raw mode is
/// acquired/released correctly regardless of nesting.
pub struct TerminalApprovalPrompt;

#[async_trait]
impl ApprovalPrompt for TerminalApprovalPrompt {
    async fn ask(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let request = request.clone();
        tokio::task::spawn_blocking(move || prompt_approval(&request))
            .await
            .unwrap_or(ApprovalDecision::Reject)
    }

    async fn offer_rollback(&self, path: &str, error: &str) -> bool {
        let path = path.to_string();
        let error = error.to_string();
        tokio::task::spawn_blocking(move || prompt_rollback(&path, &error))
            .await
            .unwrap_or(false)
    }
}

fn prompt_approval(request: &ApprovalRequest) -> ApprovalDecision {
    let _guard = RawModeGuard::acquire().ok();
    println!("\r\n--- {} ---", request.tool);
    if let Some(path) = &request.path {
        println!("path: {path}\r");
    }
    println!("{}\r", colorize_diff(&request.diff_preview));
    println!("[y] accept  [n] reject  [d] show full diff  [q] quit\r");

    loop {
        match read_key_char() {
            Some('y') | Some('Y') => return ApprovalDecision::Accept,
            Some('n') | Some('N') => return ApprovalDecision::Reject,
            Some('d') | Some('D') => return ApprovalDecision::ShowDiff,
            Some('q') | Some('Q') => return ApprovalDecision::Quit,
            None => return ApprovalDecision::Reject,
            _ => continue,
        }
    }
}

fn prompt_rollback(path: &str, error: &str) -> bool {
    let _guard = RawModeGuard::acquire().ok();
    println!("\r\n{path} failed to apply: {error}\r");
    println!("Roll back to the pre-mutation backup? [y/N]\r");
    matches!(read_key_char(), Some('y') | Some('Y'))
}

fn read_key_char() -> Option<char> {
    loop {
        match event::read().ok()? {
            Event::Key(KeyEvent {
                code: KeyCode::Char(c), ..
            }) => return Some(c),
            Event::Key(KeyEvent { code: KeyCode::Esc, .. }) => return None,
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_slash_command_recognizes_known_commands() {
        assert_eq!(parse_slash_command("/quit"), Some(SlashCommand::Quit));
        assert_eq!(parse_slash_command("/exit"), Some(SlashCommand::Quit));
        assert_eq!(
            parse_slash_command("/model anthropic/claude-opus"),
            Some(SlashCommand::Model(Some("anthropic/claude-opus".to_string())))
        );
        assert_eq!(parse_slash_command("/model"), Some(SlashCommand::Model(None)));
        assert_eq!(
            parse_slash_command("/safety auto-apply"),
            Some(SlashCommand::Safety(Some("auto-apply".to_string())))
        );
        assert_eq!(parse_slash_command("/compress"), Some(SlashCommand::Compress));
        assert_eq!(parse_slash_command("/history"), Some(SlashCommand::History));
    }

    #[test]
    fn parse_slash_command_returns_none_for_ordinary_text() {
        assert_eq!(parse_slash_command("how many files are in src/?"), None);
        assert_eq!(parse_slash_command("/nonsense"), None);
    }

    #[test]
    fn history_push_bounds_to_limit() {
        let mut history = History {
            entries: VecDeque::new(),
            cursor: None,
            limit: 3,
        };
        for line in ["a", "b", "c", "d"] {
            history.push(line);
        }
        assert_eq!(history.entries().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[test]
    fn history_up_and_down_navigate_entries() {
        let mut history = History {
            entries: VecDeque::from(vec!["one".to_string(), "two".to_string()]),
            cursor: None,
            limit: History::DEFAULT_LIMIT,
        };
        assert_eq!(history.up(), Some("two"));
        assert_eq!(history.up(), Some("one"));
        assert_eq!(history.down(), Some("two"));
        assert_eq!(history.down(), None);
    }

    #[test]
    fn history_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.txt");
        let mut history = History {
            entries: VecDeque::from(vec!["first".to_string(), "second".to_string()]),
            cursor: None,
            limit: History::DEFAULT_LIMIT,
        };
        history.save(&path).unwrap();

        let loaded = History::load(&path);
        assert_eq!(loaded.entries().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn colorize_diff_wraps_additions_and_removals() {
        let colored = colorize_diff("+added\n-removed\n context");
        assert!(colored.contains("\x1b[32m+added\x1b[0m"));
        assert!(colored.contains("\x1b[31m-removed\x1b[0m"));
        assert!(colored.contains(" context"));
    }

    #[test]
    fn colorize_diff_leaves_hunk_markers_alone() {
        let colored = colorize_diff("--- a/file\n+++ b/file");
        assert!(!colored.contains("\x1b[31m--- a/file"));
        assert!(!colored.contains("\x1b[32m+++ b/file"));
    }
}
