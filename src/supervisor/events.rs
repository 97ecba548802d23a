//! Job event types.
//!
//! Events are pushed to subscribers while a job runs and are also the JSON
//! schema printed with `--message-format=json`, one object per line.
//!
//! # Event Types
//!
//! - `job-started`: The supervisor accepted a job
//! - `state-changed`: The job moved to a new lifecycle state
//! - `log`: A line was appended to the job log
//! - `phase`: The inferred phase or percentage changed
//! - `job-finished`: The job reached a terminal state
//!
//! New fields may be added, but existing fields should not be removed or
//! renamed.

use serde::Serialize;

use crate::core::job::{JobKey, JobKind, JobState};
use crate::core::log_sink::{LogClass, LogEntry};
use crate::core::outcome::ClassifiedResult;
use crate::scan::PhaseUpdate;

/// An event emitted while a job is supervised.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum JobEvent {
    #[serde(rename = "job-started")]
    Started {
        job_id: u64,
        kind: JobKind,
        key: JobKey,
        /// Primary command line
        command: String,
    },

    #[serde(rename = "state-changed")]
    State { job_id: u64, state: JobState },

    #[serde(rename = "log")]
    Log {
        job_id: u64,
        seq: u64,
        class: LogClass,
        text: String,
    },

    #[serde(rename = "phase")]
    Phase {
        job_id: u64,
        phase: String,
        percent: u8,
    },

    #[serde(rename = "job-finished")]
    Finished {
        #[serde(flatten)]
        result: ClassifiedResult,
    },
}

impl JobEvent {
    pub fn log(job_id: u64, entry: &LogEntry) -> Self {
        JobEvent::Log {
            job_id,
            seq: entry.seq,
            class: entry.class,
            text: entry.text.clone(),
        }
    }

    pub fn phase(job_id: u64, update: &PhaseUpdate) -> Self {
        JobEvent::Phase {
            job_id,
            phase: update.phase.clone(),
            percent: update.percent,
        }
    }

    /// Job the event belongs to.
    pub fn job_id(&self) -> u64 {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::State { job_id, .. }
            | JobEvent::Log { job_id, .. }
            | JobEvent::Phase { job_id, .. } => *job_id,
            JobEvent::Finished { result } => result.job_id,
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::log_sink::LogRef;
    use crate::core::outcome::Cause;

    #[test]
    fn test_state_serialization() {
        let json = JobEvent::State {
            job_id: 4,
            state: JobState::RunningFallback,
        }
        .to_json();
        assert!(json.contains("\"reason\":\"state-changed\""));
        assert!(json.contains("\"state\":\"running-fallback\""));
    }

    #[test]
    fn test_phase_serialization() {
        let json = JobEvent::Phase {
            job_id: 1,
            phase: "Cooking content…".to_string(),
            percent: 40,
        }
        .to_json();
        assert!(json.contains("\"reason\":\"phase\""));
        assert!(json.contains("\"percent\":40"));
    }

    #[test]
    fn test_finished_is_flattened() {
        let result = ClassifiedResult {
            job_id: 9,
            kind: JobKind::Cook,
            success: false,
            state: JobState::Cancelled,
            exit_code: None,
            cause: Some(Cause::Cancelled),
            error: None,
            log_ref: LogRef {
                job_id: 9,
                first_seq: 0,
                end_seq: 2,
            },
            attempts: 1,
            elapsed: Duration::from_millis(20),
        };
        let event = JobEvent::Finished { result };
        assert_eq!(event.job_id(), 9);

        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["reason"], "job-finished");
        assert_eq!(value["state"], "cancelled");
        assert_eq!(value["cause"], "cancelled");
        assert!(value.get("error").is_none());
    }
}
