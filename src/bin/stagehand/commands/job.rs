//! Job commands: `build`, `clean`, `cook`, `package`, `generate`, `editor`

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::JobArgs;
use stagehand::core::job::JobKind;
use stagehand::ops::run_job;
use stagehand::util::{GlobalContext, Shell};

pub fn execute(kind: JobKind, args: JobArgs, shell: &Arc<Shell>) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let options = args.into_options(kind);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(run_job(&ctx, shell, &options))?;
    Ok(())
}
