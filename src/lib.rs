//! Stagehand - a supervisor for long-running engine build tool jobs
//!
//! This crate provides the core library functionality for Stagehand,
//! including process supervision, log capture, phase tracking, and
//! failure classification.

pub mod core;
pub mod ops;
pub mod scan;
pub mod supervisor;
pub mod toolchain;
pub mod util;

pub use core::{
    job::{Job, JobKind, JobRequest, JobState},
    log_sink::LogSink,
    outcome::{Cause, ClassifiedResult},
};

pub use scan::{ErrorClassifier, PhaseProgressTracker};
pub use supervisor::{JobEvent, JobHandle, JobSupervisor};
pub use util::context::GlobalContext;
