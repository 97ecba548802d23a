//! User-friendly diagnostic messages.
//!
//! Every failure shown to the user carries the likely cause, the context it
//! happened in, and what to try next.

use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::outcome::{Cause, ClassifiedResult};
use crate::toolchain::ResolveError;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when no engine root is configured.
    pub const NO_ENGINE: &str =
        "Set `root` under [engine] in ~/.stagehand/config.toml, or pass --engine";

    /// Suggestion when no project file is found.
    pub const NO_PROJECT: &str =
        "Run from a directory containing a .uproject file, or pass --project";

    /// Suggestion for environment problems.
    pub const RUN_DOCTOR: &str = "Run `stagehand doctor` to check the engine install";

    /// Suggestion when a job timed out.
    pub const RAISE_TIMEOUT: &str =
        "Raise `timeout_secs` under [defaults], or pass a larger --timeout";

    /// Suggestion for rerunning with more output.
    pub const VERBOSE: &str = "Rerun with --verbose for more details";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Create a new note diagnostic.
    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = match (color, self.severity) {
            (true, Severity::Error) => "\x1b[1;31merror\x1b[0m",
            (true, Severity::Warning) => "\x1b[1;33mwarning\x1b[0m",
            (true, Severity::Note) => "\x1b[1;36mnote\x1b[0m",
            (false, Severity::Error) => "error",
            (false, Severity::Warning) => "warning",
            (false, Severity::Note) => "note",
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  → {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Suggestion for a failure cause, if there is a concrete one.
pub fn suggestion_for(cause: Cause) -> Option<&'static str> {
    match cause {
        Cause::MissingInput => Some(suggestions::NO_PROJECT),
        Cause::MissingToolchain | Cause::LaunchFailure => Some(suggestions::RUN_DOCTOR),
        Cause::CompileFailure => Some("Fix the first compile error in the log and rebuild"),
        Cause::ContentFailure => Some("Open the assets named in the log in the editor and resave them"),
        Cause::Timeout => Some(suggestions::RAISE_TIMEOUT),
        Cause::InternalToolException | Cause::Unspecified | Cause::Cancelled => None,
    }
}

/// Diagnostic for a failed or cancelled job.
///
/// `log_path` is the persisted log, offered as "view full log".
pub fn job_diagnostic(result: &ClassifiedResult, log_path: Option<&Path>) -> Diagnostic {
    let label = result.kind.label();

    if result.is_cancelled() {
        let mut diag = Diagnostic::note(format!("{}: {}", label, Cause::Cancelled.template()));
        if let Some(path) = log_path {
            diag = diag.with_location(path);
        }
        return diag;
    }

    let message = match &result.error {
        Some(error) => format!("{} failed: {}", label, error),
        None => format!("{} failed", label),
    };
    let mut diag = Diagnostic::error(message);

    if let Some(cause) = result.cause {
        diag = diag.with_context(format!("cause: {}", cause));
    }
    if result.attempts > 1 {
        diag = diag.with_context("the fallback command failed too");
    }
    if let Some(path) = log_path {
        diag = diag.with_location(path);
    }

    match result.cause.and_then(suggestion_for) {
        Some(suggestion) => diag = diag.with_suggestion(suggestion),
        None => {
            if let Some(path) = log_path {
                diag = diag.with_suggestion(format!("View the full log: {}", path.display()));
            }
            diag = diag.with_suggestion(suggestions::VERBOSE);
        }
    }
    diag
}

/// Diagnostic for a request that could not be resolved to commands.
pub fn resolve_diagnostic(err: &ResolveError) -> Diagnostic {
    let diag = Diagnostic::error(err.to_string());
    match err {
        ResolveError::MissingEngine => diag.with_suggestion(suggestions::NO_ENGINE),
        ResolveError::MissingProject { .. } => diag.with_suggestion(suggestions::NO_PROJECT),
        ResolveError::Unsupported { kind } => diag.with_suggestion(format!(
            "Add a [commands.{}] table to .stagehand/config.toml",
            kind
        )),
        ResolveError::UnknownPlaceholder { .. } => diag.with_context(
            "known placeholders: {project} {project_dir} {engine} {target} {platform} {configuration}",
        ),
    }
}

/// A job ended without success.
///
/// Returned by the CLI operations so the binary can pick the exit status.
#[derive(Debug, Error)]
#[error("{kind} {state}", kind = .result.kind.label(), state = .result.state)]
pub struct JobFailedError {
    pub result: ClassifiedResult,
    pub log_path: Option<PathBuf>,
}

impl JobFailedError {
    pub fn new(result: ClassifiedResult, log_path: Option<PathBuf>) -> Self {
        JobFailedError { result, log_path }
    }

    /// Process exit status: 130 for cancellation, 1 otherwise.
    pub fn exit_status(&self) -> i32 {
        if self.result.is_cancelled() {
            130
        } else {
            1
        }
    }
}

impl MietteDiagnostic for JobFailedError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let cause = self.result.cause.unwrap_or(Cause::Unspecified);
        Some(Box::new(format!("stagehand::{}", cause)))
    }

    fn severity(&self) -> Option<miette::Severity> {
        if self.result.is_cancelled() {
            Some(miette::Severity::Advice)
        } else {
            Some(miette::Severity::Error)
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let cause = self.result.cause?;
        suggestion_for(cause)
            .map(|s| Box::new(s) as Box<dyn fmt::Display>)
            .or_else(|| {
                self.log_path
                    .as_ref()
                    .map(|p| Box::new(format!("view full log: {}", p.display())) as Box<dyn fmt::Display>)
            })
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
