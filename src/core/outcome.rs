//! Failure causes and job results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::job::{JobKind, JobState};
use super::log_sink::LogRef;

/// Likely cause of a failed job.
///
/// The text-derived causes are listed in the priority order the classifier
/// checks them; `Timeout` and `Cancelled` come from the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cause {
    /// Target project or descriptor file not found
    MissingInput,
    /// Required compiler or SDK component absent
    MissingToolchain,
    /// The build step reported compile or link errors
    CompileFailure,
    /// The cook step reported content errors
    ContentFailure,
    /// The automation driver crashed internally
    InternalToolException,
    /// The executable could not be found or started
    LaunchFailure,
    Timeout,
    Cancelled,
    /// Nothing recognizable in the output
    Unspecified,
}

impl Cause {
    /// Kebab-case identifier, stable for JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cause::MissingInput => "missing-input",
            Cause::MissingToolchain => "missing-toolchain",
            Cause::CompileFailure => "compile-failure",
            Cause::ContentFailure => "content-failure",
            Cause::InternalToolException => "internal-tool-exception",
            Cause::LaunchFailure => "launch-failure",
            Cause::Timeout => "timeout",
            Cause::Cancelled => "cancelled",
            Cause::Unspecified => "unspecified",
        }
    }

    /// Fixed human-readable message for this cause.
    pub fn template(&self) -> &'static str {
        match self {
            Cause::MissingInput => {
                "The project or target descriptor could not be found. Check the project path."
            }
            Cause::MissingToolchain => {
                "A required compiler or platform SDK is missing. Install the toolchain for this platform."
            }
            Cause::CompileFailure => "The build failed with compile errors. See the log for details.",
            Cause::ContentFailure => "Cooking content failed. Check the asset errors in the log.",
            Cause::InternalToolException => {
                "The automation tool crashed internally. This is likely not caused by your code."
            }
            Cause::LaunchFailure => {
                "The build tool could not be started. Check the engine path and permissions."
            }
            Cause::Timeout => "The job exceeded its time limit and was stopped.",
            Cause::Cancelled => "Cancelled by user.",
            Cause::Unspecified => "The tool failed for an unrecognized reason.",
        }
    }

    /// Whether the UI should offer "view full log" as the remediation.
    pub fn offers_full_log(&self) -> bool {
        matches!(self, Cause::InternalToolException | Cause::Unspecified)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of failure analysis. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    /// Raw exit code, absent when the process never exited normally
    pub exit_code: Option<i32>,
    pub cause: Cause,
    pub summary: String,
    pub log_ref: LogRef,
}

impl ClassifiedError {
    /// Build an error from a cause using its template summary.
    pub fn new(cause: Cause, exit_code: Option<i32>, log_ref: LogRef) -> Self {
        ClassifiedError {
            exit_code,
            cause,
            summary: cause.template().to_string(),
            log_ref,
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} (exit code {})", self.summary, code),
            None => f.write_str(&self.summary),
        }
    }
}

/// Terminal result of a job, handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedResult {
    pub job_id: u64,
    pub kind: JobKind,
    pub success: bool,
    pub state: JobState,
    pub exit_code: Option<i32>,
    /// Failure cause; `Cancelled` for user cancellation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
    /// Present for failures only; cancellation is not an error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    pub log_ref: LogRef,
    /// Number of processes spawned (2 when the fallback ran)
    pub attempts: u8,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ClassifiedResult {
    pub fn is_cancelled(&self) -> bool {
        self.state == JobState::Cancelled
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_ref() -> LogRef {
        LogRef {
            job_id: 1,
            first_seq: 0,
            end_seq: 10,
        }
    }

    #[test]
    fn test_cause_serializes_kebab_case() {
        let json = serde_json::to_string(&Cause::InternalToolException).unwrap();
        assert_eq!(json, "\"internal-tool-exception\"");
        assert_eq!(Cause::CompileFailure.to_string(), "compile-failure");
    }

    #[test]
    fn test_full_log_affordance() {
        assert!(Cause::InternalToolException.offers_full_log());
        assert!(Cause::Unspecified.offers_full_log());
        assert!(!Cause::CompileFailure.offers_full_log());
        assert!(!Cause::Cancelled.offers_full_log());
    }

    #[test]
    fn test_classified_error_display() {
        let err = ClassifiedError::new(Cause::CompileFailure, Some(6), log_ref());
        assert!(err.to_string().contains("compile errors"));
        assert!(err.to_string().ends_with("(exit code 6)"));

        let err = ClassifiedError::new(Cause::Timeout, None, log_ref());
        assert_eq!(err.to_string(), Cause::Timeout.template());
    }

    #[test]
    fn test_result_json_omits_absent_cause() {
        let result = ClassifiedResult {
            job_id: 3,
            kind: JobKind::Build,
            success: true,
            state: JobState::Completed,
            exit_code: Some(0),
            cause: None,
            error: None,
            log_ref: log_ref(),
            attempts: 1,
            elapsed: Duration::from_millis(1500),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["state"], "completed");
        assert_eq!(value["elapsed"], 1500);
        assert!(value.get("cause").is_none());
        assert!(value.get("error").is_none());
    }
}
