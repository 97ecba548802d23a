//! `stagehand doctor` command

use anyhow::{bail, Result};

use crate::cli::DoctorArgs;
use stagehand::ops::{doctor, format_report};
use stagehand::util::{GlobalContext, Shell};

pub fn execute(_args: DoctorArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let report = doctor(&ctx);

    if shell.is_json() {
        let mut event = serde_json::to_value(&report)?;
        event["reason"] = serde_json::Value::from("doctor-report");
        shell.json_event(&event);
    } else if !shell.is_quiet() {
        print!("{}", format_report(&report, shell.is_verbose()));
    }

    if !report.all_required_passed() {
        bail!(
            "{} required check(s) failed",
            report.required_failed_count()
        );
    }

    Ok(())
}
