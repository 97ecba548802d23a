//! Heuristic failure classification.
//!
//! Misclassification is an accepted outcome: the table only has to be right
//! often enough to turn a bare exit code into an actionable message, and
//! anything it does not recognize falls through to [`Cause::Unspecified`].

use crate::core::log_sink::LogRef;
use crate::core::outcome::{Cause, ClassifiedError};

use super::RuleTable;

/// Default rules, in priority order.
pub fn default_rules() -> RuleTable<Cause> {
    RuleTable::new()
        .rule(
            [
                "couldn't find target rules",
                "could not find target rules",
                "project file not found",
                "could not find project",
                "unable to find project",
                ".uproject does not exist",
                "no project file specified",
            ],
            Cause::MissingInput,
        )
        .rule(
            [
                "no valid visual c++ toolchain",
                "visual studio toolchain not found",
                "platform sdk not found",
                "sdk is not installed",
                "unable to find a valid toolchain",
                "no compiler toolchain found",
                "could not find netfxsdk",
                "clang toolchain not found",
                "the .net sdk could not be found",
            ],
            Cause::MissingToolchain,
        )
        .rule(
            [
                "): error c",
                "error lnk",
                ": fatal error",
                "error: use of undeclared",
                "error: unknown type name",
                "error: no member named",
                "error: expected",
                "ld.lld: error:",
                "compilation failed",
                "unable to compile",
                "undefined reference to",
            ],
            Cause::CompileFailure,
        )
        .rule(
            [
                "logcook: error",
                "cook failed",
                "cookresults: error",
                "failed to cook",
                "content errors",
                "failed to save package",
            ],
            Cause::ContentFailure,
        )
        .rule(
            [
                "unhandled exception",
                "automationexception",
                "system.nullreferenceexception",
                "system.invalidoperationexception",
                "automationtool exiting with exitcode=1 (error_unknown)",
                "assertion failed",
            ],
            Cause::InternalToolException,
        )
        .rule(
            [
                "enoent",
                "command not found",
                "no such file or directory",
                "is not recognized as an internal or external command",
                "permission denied",
                "cannot execute binary file",
            ],
            Cause::LaunchFailure,
        )
}

/// Maps captured output to a [`Cause`].
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: RuleTable<Cause>,
}

impl ErrorClassifier {
    /// Create a classifier with the default rule table.
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Create a classifier with a custom rule table.
    pub fn with_rules(rules: RuleTable<Cause>) -> Self {
        ErrorClassifier { rules }
    }

    /// First matching cause for `text`, if any rule matches.
    pub fn scan(&self, text: &str) -> Option<Cause> {
        self.rules.first_match(text).copied()
    }

    /// Classify a failed attempt from its exit code and combined output.
    pub fn classify(
        &self,
        exit_code: Option<i32>,
        combined_output: &str,
        log_ref: LogRef,
    ) -> ClassifiedError {
        let cause = self.scan(combined_output).unwrap_or(Cause::Unspecified);
        tracing::debug!(?exit_code, %cause, "classified failure");
        ClassifiedError::new(cause, exit_code, log_ref)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
