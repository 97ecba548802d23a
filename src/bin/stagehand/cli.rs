//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;

use stagehand::core::job::JobKind;
use stagehand::ops::JobOptions;
use stagehand::util::shell::ColorChoice;

/// Stagehand - supervised build, cook and package jobs for engine toolchains
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Stream tool output and enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto", value_parser = parse_color)]
    pub color: ColorChoice,

    /// Output format for job events
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    /// Status lines and a progress bar
    Human,
    /// One JSON event per line on stdout
    Json,
}

fn parse_color(s: &str) -> Result<ColorChoice, String> {
    s.parse()
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a target
    Build(JobArgs),

    /// Remove intermediate build products for a target
    Clean(JobArgs),

    /// Cook content for a platform
    Cook(JobArgs),

    /// Build, cook, stage and archive a distributable package
    Package(JobArgs),

    /// Regenerate IDE project files
    Generate(JobArgs),

    /// Launch the editor for the project
    Editor(JobArgs),

    /// Check the engine install and project setup
    Doctor(DoctorArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Clone)]
pub struct JobArgs {
    /// Project file (defaults to the .uproject in the project root)
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Build target (defaults to [project] target, then the project name)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Target platform (e.g. Linux, Win64)
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Build configuration (e.g. Development, Shipping)
    #[arg(short, long)]
    pub configuration: Option<String>,

    /// Kill an attempt after this many seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep the log file even when the job succeeds
    #[arg(long)]
    pub save_log: bool,
}

impl JobArgs {
    pub fn into_options(self, kind: JobKind) -> JobOptions {
        let mut options = JobOptions::new(kind);
        options.project = self.project;
        options.target = self.target;
        options.platform = self.platform;
        options.configuration = self.configuration;
        options.timeout = self
            .timeout
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs);
        options.save_log = self.save_log;
        options
    }
}

#[derive(Args)]
pub struct DoctorArgs {}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}
