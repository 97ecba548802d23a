//! Stagehand CLI - supervised engine build tool jobs

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, MessageFormat};
use stagehand::core::job::JobKind;
use stagehand::toolchain::ResolveError;
use stagehand::util::diagnostic::{emit, resolve_diagnostic, JobFailedError};
use stagehand::util::Shell;

fn main() {
    let cli = Cli::parse();

    let shell = Arc::new(Shell::from_flags(
        cli.quiet,
        cli.verbose,
        cli.color,
        cli.message_format == MessageFormat::Json,
    ));

    // Set up logging
    let default_filter = if cli.verbose {
        "stagehand=debug"
    } else {
        "stagehand=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    if let Err(e) = run(cli, &shell) {
        std::process::exit(report(&e, &shell));
    }
}

fn run(cli: Cli, shell: &Arc<Shell>) -> Result<()> {
    // Execute command
    match cli.command {
        Commands::Build(args) => commands::job::execute(JobKind::Build, args, shell),
        Commands::Clean(args) => commands::job::execute(JobKind::Clean, args, shell),
        Commands::Cook(args) => commands::job::execute(JobKind::Cook, args, shell),
        Commands::Package(args) => commands::job::execute(JobKind::Package, args, shell),
        Commands::Generate(args) => commands::job::execute(JobKind::Generate, args, shell),
        Commands::Editor(args) => commands::job::execute(JobKind::Editor, args, shell),
        Commands::Doctor(args) => commands::doctor::execute(args, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print an error and pick the exit status.
fn report(error: &anyhow::Error, shell: &Shell) -> i32 {
    // Job failures were already rendered while the job ran.
    if let Some(failed) = error.downcast_ref::<JobFailedError>() {
        return failed.exit_status();
    }

    match error.downcast_ref::<ResolveError>() {
        Some(err) if !shell.is_json() => emit(&resolve_diagnostic(err), shell.use_color()),
        _ if shell.is_json() => shell.error(format!("{:#}", error)),
        _ => eprintln!("error: {:#}", error),
    }
    1
}
