//! High-level operations.
//!
//! This module contains the implementation of Stagehand commands.

pub mod doctor;
pub mod run_job;

pub use doctor::{doctor, format_report, CheckResult, DoctorReport};
pub use run_job::{job_request, job_resolver, prepare_job, run_job, JobOptions};
