//! Centralized shell output and progress management.
//!
//! The Shell module provides a unified API for all CLI output, including:
//! - Status messages with consistent formatting
//! - A phase progress bar (via indicatif)
//! - JSON output mode for machine-readable output
//!
//! # Design Principles
//!
//! 1. **Commands never manage spacing/indentation directly** - Shell handles all formatting
//! 2. **JSON mode is mutually exclusive** - No human output when JSON mode is enabled
//! 3. **Tool output never interleaves with the bar** - lines are printed above it

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::core::job::JobKind;

/// Shell output mode - Human and Json are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellMode {
    /// Human-readable output with optional colors and progress bars.
    Human {
        verbosity: Verbosity,
        color: ColorChoice,
    },
    /// Machine-readable JSON output only.
    Json,
}

impl Default for ShellMode {
    fn default() -> Self {
        ShellMode::Human {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
        }
    }
}

/// Output verbosity level (Human mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, no progress
    Quiet,
    /// Default: status messages + progress bar
    #[default]
    Normal,
    /// --verbose: tool output streamed, no progress bar
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Detect TTY and use colors if available.
    #[default]
    Auto,
    /// Always use ANSI colors.
    Always,
    /// Never use ANSI colors.
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(format!(
                "invalid color choice '{}'; expected 'auto', 'always', or 'never'",
                s
            )),
        }
    }
}

/// Status types for output messages.
///
/// Shell handles all formatting - callers just specify the semantic status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Finished,
    Launched,
    Saved,

    // In-progress statuses (cyan)
    Building,
    Cleaning,
    Cooking,
    Packaging,
    Generating,
    Launching,

    // Info statuses (blue/default)
    Info,

    // Warning statuses (yellow)
    Retrying,
    Cancelled,
    Warning,

    // Error status (red)
    Error,
}

impl Status {
    /// In-progress status for a job kind.
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::Build => Status::Building,
            JobKind::Clean => Status::Cleaning,
            JobKind::Cook => Status::Cooking,
            JobKind::Package => Status::Packaging,
            JobKind::Generate => Status::Generating,
            JobKind::Editor => Status::Launching,
        }
    }

    /// Get the display text for this status.
    fn as_str(&self) -> &'static str {
        match self {
            Status::Finished => "Finished",
            Status::Launched => "Launched",
            Status::Saved => "Saved",
            Status::Building => "Building",
            Status::Cleaning => "Cleaning",
            Status::Cooking => "Cooking",
            Status::Packaging => "Packaging",
            Status::Generating => "Generating",
            Status::Launching => "Launching",
            Status::Info => "Info",
            Status::Retrying => "Retrying",
            Status::Cancelled => "Cancelled",
            Status::Warning => "Warning",
            Status::Error => "error",
        }
    }

    /// Get the ANSI color code for this status.
    fn color_code(&self) -> &'static str {
        match self {
            // Success: bold green
            Status::Finished | Status::Launched | Status::Saved => "\x1b[1;32m",
            // In-progress: bold cyan
            Status::Building
            | Status::Cleaning
            | Status::Cooking
            | Status::Packaging
            | Status::Generating
            | Status::Launching => "\x1b[1;36m",
            // Info: bold blue
            Status::Info => "\x1b[1;34m",
            // Warning: bold yellow
            Status::Retrying | Status::Cancelled | Status::Warning => "\x1b[1;33m",
            // Error: bold red
            Status::Error => "\x1b[1;31m",
        }
    }

    /// Get the width for alignment (12 characters).
    fn width(&self) -> usize {
        12
    }
}

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    mode: ShellMode,
    use_color: bool,
}

impl Shell {
    /// Create a new shell with the given mode.
    pub fn new(mode: ShellMode) -> Self {
        let use_color = match &mode {
            ShellMode::Json => false,
            ShellMode::Human { color, .. } => match color {
                ColorChoice::Auto => io::stderr().is_terminal(),
                ColorChoice::Always => true,
                ColorChoice::Never => false,
            },
        };

        Shell { mode, use_color }
    }

    /// Create a shell from CLI flags with proper precedence.
    ///
    /// JSON mode takes precedence over quiet/verbose.
    pub fn from_flags(
        quiet: bool,
        verbose: bool,
        color: ColorChoice,
        message_format_json: bool,
    ) -> Self {
        let mode = if message_format_json {
            ShellMode::Json
        } else {
            let verbosity = if quiet {
                Verbosity::Quiet
            } else if verbose {
                Verbosity::Verbose
            } else {
                Verbosity::Normal
            };
            ShellMode::Human { verbosity, color }
        };

        Shell::new(mode)
    }

    /// Get the current shell mode.
    pub fn mode(&self) -> &ShellMode {
        &self.mode
    }

    /// Check if shell is in quiet mode.
    pub fn is_quiet(&self) -> bool {
        matches!(
            self.mode,
            ShellMode::Human {
                verbosity: Verbosity::Quiet,
                ..
            }
        )
    }

    /// Check if shell is in verbose mode.
    pub fn is_verbose(&self) -> bool {
        matches!(
            self.mode,
            ShellMode::Human {
                verbosity: Verbosity::Verbose,
                ..
            }
        )
    }

    /// Check if shell is in JSON mode.
    pub fn is_json(&self) -> bool {
        matches!(self.mode, ShellMode::Json)
    }

    /// Check if colors are enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print a status message.
    ///
    /// Format: `{status:>12} {message}`
    ///
    /// In quiet mode, only Error status is printed.
    /// In JSON mode, messages are silently ignored (use json_event for JSON output).
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_json() {
            return;
        }

        if self.is_quiet() && status != Status::Error {
            return;
        }

        let prefix = self.format_status(status);
        eprintln!("{} {}", prefix, msg);
    }

    /// Print an info message.
    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// Print an error message.
    ///
    /// In JSON mode, this outputs a JSON error event.
    pub fn error(&self, msg: impl Display) {
        if self.is_json() {
            let event = serde_json::json!({
                "reason": "error",
                "message": msg.to_string()
            });
            self.json_event(&event);
        } else {
            self.status(Status::Error, msg);
        }
    }

    /// Print a JSON event to stdout.
    ///
    /// Only works in JSON mode; silently ignored in human mode.
    pub fn json_event(&self, event: &impl Serialize) {
        if !self.is_json() {
            return;
        }

        let json_str = serde_json::to_string(event).unwrap_or_default();
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", json_str);
        let _ = stdout.flush();
    }

    /// Format a status prefix with optional color.
    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();
        let width = status.width();

        if self.use_color {
            let color = status.color_code();
            format!("{}{:>width$}\x1b[0m", color, text, width = width)
        } else {
            format!("{:>width$}", text, width = width)
        }
    }

    /// Create a phase progress bar (0-100%).
    ///
    /// In quiet, verbose or JSON mode, returns a no-op progress bar.
    pub fn progress(self: &Arc<Self>, msg: impl Display) -> Progress {
        Progress::new(Arc::clone(self), msg.to_string())
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(ShellMode::default())
    }
}

/// Phase progress bar wrapper that respects shell mode.
pub struct Progress {
    shell: Arc<Shell>,
    pb: Option<ProgressBar>,
    percent: u8,
    phase: String,
}

impl Progress {
    /// Create a new progress bar.
    fn new(shell: Arc<Shell>, message: String) -> Self {
        let pb = if shell.is_quiet() || shell.is_verbose() || shell.is_json() {
            None
        } else {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos:>3}% {elapsed}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message(message.clone());
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        };

        Progress {
            shell,
            pb,
            percent: 0,
            phase: message,
        }
    }

    /// Show a new phase label and percentage.
    pub fn set_phase(&mut self, phase: &str, percent: u8) {
        self.percent = percent.min(100);
        self.phase = phase.to_string();

        if let Some(pb) = &self.pb {
            pb.set_position(u64::from(self.percent));
            pb.set_message(self.phase.clone());
        }

        if self.shell.is_verbose() {
            self.shell
                .note(format!("{} ({}%)", self.phase, self.percent));
        }
    }

    /// Print a line above the bar without garbling it.
    pub fn println(&self, line: impl Display) {
        match &self.pb {
            Some(pb) => pb.suspend(|| eprintln!("{}", line)),
            None => eprintln!("{}", line),
        }
    }

    /// Print a status message above the bar.
    pub fn status(&self, status: Status, msg: impl Display) {
        match &self.pb {
            Some(pb) => pb.suspend(|| self.shell.status(status, msg)),
            None => self.shell.status(status, msg),
        }
    }

    /// Remove the bar.
    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }

    /// Get the current percentage.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Get the current phase label.
    pub fn phase(&self) -> &str {
        &self.phase
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Format a duration in a human-readable way.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        let mins = secs / 60.0;
        format!("{:.1}m", mins)
    }
}
