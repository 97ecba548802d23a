//! Job requests, invocations and lifecycle states.
//!
//! A job is one supervised external-tool run: a primary invocation, an
//! optional fallback invocation, and the knobs shared by both (timeout,
//! detached mode). Jobs are built from a [`JobRequest`] by a
//! [`CommandResolver`](crate::toolchain::CommandResolver).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of operation a job performs against the engine toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Compile the project target
    Build,
    /// Remove intermediate build products
    Clean,
    /// Convert content to the platform format
    Cook,
    /// Build, cook, stage and archive a distributable
    Package,
    /// Regenerate IDE project files
    #[serde(alias = "generate-project-files")]
    Generate,
    /// Launch the editor and leave it running
    Editor,
}

impl JobKind {
    /// All job kinds, in CLI order.
    pub const ALL: [JobKind; 6] = [
        JobKind::Build,
        JobKind::Clean,
        JobKind::Cook,
        JobKind::Package,
        JobKind::Generate,
        JobKind::Editor,
    ];

    /// Get the kind name as used in config tables and log file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Build => "build",
            JobKind::Clean => "clean",
            JobKind::Cook => "cook",
            JobKind::Package => "package",
            JobKind::Generate => "generate",
            JobKind::Editor => "editor",
        }
    }

    /// Human label used in start/stop banners.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Build => "Build",
            JobKind::Clean => "Clean",
            JobKind::Cook => "Cook",
            JobKind::Package => "Package",
            JobKind::Generate => "Generate project files",
            JobKind::Editor => "Launch editor",
        }
    }

    /// Whether the job is launched fire-and-forget.
    pub fn is_detached(&self) -> bool {
        matches!(self, JobKind::Editor)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(JobKind::Build),
            "clean" => Ok(JobKind::Clean),
            "cook" => Ok(JobKind::Cook),
            "package" => Ok(JobKind::Package),
            "generate" | "generate-project-files" => Ok(JobKind::Generate),
            "editor" => Ok(JobKind::Editor),
            _ => Err(format!(
                "invalid job kind '{}'; expected one of build, clean, cook, package, generate, editor",
                s
            )),
        }
    }
}

/// A caller's request for a job, before command resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub kind: JobKind,
    /// Project descriptor (e.g. `MyGame.uproject`)
    pub project: Option<PathBuf>,
    /// Build target name (e.g. `MyGameEditor`)
    pub target: Option<String>,
    /// Build configuration (e.g. `Development`)
    pub configuration: String,
    /// Target platform (e.g. `Linux`, `Win64`)
    pub platform: String,
    pub working_directory: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl JobRequest {
    /// Create a request with default configuration and host platform.
    pub fn new(kind: JobKind) -> Self {
        JobRequest {
            kind,
            project: None,
            target: None,
            configuration: "Development".to_string(),
            platform: crate::toolchain::HostPlatform::current().engine_name().to_string(),
            working_directory: None,
            timeout: None,
        }
    }

    pub fn with_project(mut self, project: impl Into<PathBuf>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = configuration.into();
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Key identifying the target+configuration pair this request acts on.
    pub fn key(&self) -> JobKey {
        JobKey {
            target: self
                .target
                .clone()
                .or_else(|| project_stem(self.project.as_deref()))
                .unwrap_or_default(),
            configuration: self.configuration.clone(),
            platform: self.platform.clone(),
        }
    }
}

fn project_stem(project: Option<&Path>) -> Option<String> {
    project
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
}

/// Target+configuration pair. At most one job should run per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobKey {
    pub target: String,
    pub configuration: String,
    pub platform: String,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.target, self.platform, self.configuration)
    }
}

/// One concrete command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory, overriding the job's own
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// Create an invocation for the given program.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Add arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for this invocation only.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Display the command line for banners and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// A fully resolved job, ready for the supervisor.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub key: JobKey,
    pub primary: Invocation,
    pub fallback: Option<Invocation>,
    pub cwd: Option<PathBuf>,
    /// Environment overlay merged over the inherited environment
    pub env: BTreeMap<String, String>,
    /// Directories put in front of the inherited `PATH`
    pub path_prepend: Vec<PathBuf>,
    pub timeout: Option<Duration>,
    pub detached: bool,
}

impl Job {
    /// Create a job with only a primary invocation.
    pub fn new(kind: JobKind, primary: Invocation) -> Self {
        Job {
            kind,
            key: JobKey {
                target: String::new(),
                configuration: String::new(),
                platform: String::new(),
            },
            primary,
            fallback: None,
            cwd: None,
            env: BTreeMap::new(),
            path_prepend: Vec::new(),
            timeout: None,
            detached: kind.is_detached(),
        }
    }

    pub fn with_key(mut self, key: JobKey) -> Self {
        self.key = key;
        self
    }

    pub fn with_fallback(mut self, fallback: Invocation) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// Whether a failed primary attempt may be retried with the fallback.
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Lifecycle state of a supervised job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Idle,
    Running,
    /// Running the fallback invocation after a primary failure
    RunningFallback,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::RunningFallback => "running-fallback",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed-out",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_parse() {
        assert_eq!("build".parse::<JobKind>().unwrap(), JobKind::Build);
        assert_eq!("Package".parse::<JobKind>().unwrap(), JobKind::Package);
        assert_eq!(
            "generate-project-files".parse::<JobKind>().unwrap(),
            JobKind::Generate
        );
        assert!("deploy".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_only_editor_is_detached() {
        for kind in JobKind::ALL {
            assert_eq!(kind.is_detached(), kind == JobKind::Editor);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::RunningFallback.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_request_key_falls_back_to_project_stem() {
        let request = JobRequest::new(JobKind::Build)
            .with_project("/work/MyGame/MyGame.uproject")
            .with_platform("Linux");
        let key = request.key();
        assert_eq!(key.target, "MyGame");
        assert_eq!(key.configuration, "Development");
        assert_eq!(key.to_string(), "MyGame Linux Development");

        let key = request.with_target("MyGameEditor").key();
        assert_eq!(key.target, "MyGameEditor");
    }

    #[test]
    fn test_invocation_display_command() {
        let inv = Invocation::new("Build.sh").args(["MyGameEditor", "Linux", "Development"]);
        assert_eq!(inv.display_command(), "Build.sh MyGameEditor Linux Development");
    }

    #[test]
    fn test_job_state_serializes_kebab_case() {
        let json = serde_json::to_string(&JobState::RunningFallback).unwrap();
        assert_eq!(json, "\"running-fallback\"");
    }
}
