//! Core data structures for Stagehand.
//!
//! This module contains the foundational types used throughout Stagehand:
//! - Job requests, resolved jobs and lifecycle states
//! - The bounded log sink shared by supervised jobs
//! - Classified job outcomes

pub mod job;
pub mod log_sink;
pub mod outcome;

pub use job::{Invocation, Job, JobKey, JobKind, JobRequest, JobState};
pub use log_sink::{LogClass, LogEntry, LogRef, LogSink};
pub use outcome::{Cause, ClassifiedError, ClassifiedResult};
