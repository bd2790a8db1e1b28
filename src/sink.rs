use std::io::{IsTerminal, Write};
use std::sync::{Mutex, MutexGuard};

use anstream::{AutoStream, ColorChoice};
use anstyle::{AnsiColor, Color, Style};

/// Receives the human-readable progress of test runs, one line at a time.
///
/// Implementations are shared between the stdout and stderr reader threads of
/// a run, so they serialize internally.
pub trait LineSink: Send + Sync {
    fn line(&self, text: &str);

    /// Called whenever the number of in-flight test processes changes. Zero
    /// means nothing is left to cancel.
    fn busy(&self, _running: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Auto,
    Always,
    Never,
}

impl OutputMode {
    pub fn from_env() -> Self {
        match std::env::var("GOTEST_RELAY_COLOR").ok().as_deref() {
            Some("always") => OutputMode::Always,
            Some("never") => OutputMode::Never,
            _ => OutputMode::Auto,
        }
    }
}

pub fn resolve_color_enabled(mode: OutputMode, is_tty: bool) -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match mode {
        OutputMode::Always => true,
        OutputMode::Never => false,
        OutputMode::Auto => is_tty,
    }
}

#[derive(Debug, Clone, Copy)]
struct Theme {
    pass: Style,
    fail: Style,
    muted: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            pass: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Green)))
                .bold(),
            fail: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Red)))
                .bold(),
            muted: Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
        }
    }
}

/// Writes lines to a terminal-like writer, colouring package verdicts.
pub struct ConsoleSink<W: Write + Send> {
    writer: Mutex<W>,
    color_enabled: bool,
    theme: Theme,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W, color_enabled: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            color_enabled,
            theme: Theme::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn style_for(&self, text: &str) -> Option<Style> {
        if !self.color_enabled {
            return None;
        }
        if text.starts_with("ok ") || text.starts_with("--- PASS") || text == "PASS" {
            Some(self.theme.pass)
        } else if text.starts_with("FAIL") || text.starts_with("--- FAIL") {
            Some(self.theme.fail)
        } else if text.starts_with("Running tool:") {
            Some(self.theme.muted)
        } else {
            None
        }
    }
}

impl ConsoleSink<AutoStream<std::io::Stdout>> {
    pub fn stdout(mode: OutputMode) -> Self {
        let choice = match mode {
            OutputMode::Auto => ColorChoice::Auto,
            OutputMode::Always => ColorChoice::AlwaysAnsi,
            OutputMode::Never => ColorChoice::Never,
        };
        let stream = AutoStream::new(std::io::stdout(), choice);
        let color_enabled = resolve_color_enabled(mode, std::io::stdout().is_terminal());
        Self::new(stream, color_enabled)
    }
}

impl<W: Write + Send> LineSink for ConsoleSink<W> {
    fn line(&self, text: &str) {
        let mut writer = lock(&self.writer);
        let _ = match self.style_for(text) {
            Some(style) => writeln!(writer, "{}{text}{}", style.render(), style.render_reset()),
            None => writeln!(writer, "{text}"),
        };
        let _ = writer.flush();
    }
}

/// Keeps every line in memory. Used in tests and by callers that want the
/// output of a run instead of a terminal.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    busy: Mutex<Vec<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    /// Every busy count reported so far, oldest first.
    pub fn busy_history(&self) -> Vec<usize> {
        lock(&self.busy).clone()
    }
}

impl LineSink for MemorySink {
    fn line(&self, text: &str) {
        lock(&self.lines).push(text.to_owned());
    }

    fn busy(&self, running: usize) {
        lock(&self.busy).push(running);
    }
}

/// A titled message for the terminal, optionally with a hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    pub title: String,
    pub body: String,
    pub hint: Option<String>,
}

impl MessageBlock {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub fn write_error_block<W: Write>(
    writer: &mut W,
    color_enabled: bool,
    block: &MessageBlock,
) -> std::io::Result<()> {
    let theme = Theme::default();
    let styled = |style: Style, text: &str| {
        if color_enabled {
            format!("{}{text}{}", style.render(), style.render_reset())
        } else {
            text.to_owned()
        }
    };
    writeln!(writer, "{} {}", styled(theme.fail, "[error]"), block.title)?;
    writeln!(writer, "  {}", block.body)?;
    if let Some(hint) = &block.hint {
        writeln!(writer, "  {}: {hint}", styled(theme.muted, "hint"))?;
    }
    Ok(())
}

/// Writes an error block to stderr, coloured per `mode`.
pub fn error_block(mode: OutputMode, block: &MessageBlock) {
    let choice = match mode {
        OutputMode::Auto => ColorChoice::Auto,
        OutputMode::Always => ColorChoice::AlwaysAnsi,
        OutputMode::Never => ColorChoice::Never,
    };
    let mut stream = AutoStream::new(std::io::stderr(), choice);
    let color_enabled = resolve_color_enabled(mode, std::io::stderr().is_terminal());
    let _ = write_error_block(&mut stream, color_enabled, block);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[path = "tests/sink_tests.rs"]
mod tests;
