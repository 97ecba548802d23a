//! Command resolution.
//!
//! A [`CommandResolver`] turns a [`JobRequest`] into concrete command lines
//! for the host's engine install. The supervisor never knows which tool it
//! runs; everything engine-specific lives behind this trait.

pub mod configured;
pub mod unreal;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::job::{Invocation, Job, JobKind, JobRequest};

pub use configured::{CommandTemplate, ConfiguredResolver, Placeholders};
pub use unreal::UnrealResolver;

/// Why a request could not be turned into commands.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no engine root configured")]
    MissingEngine,

    #[error("`{kind}` needs a project file, but none was given or found")]
    MissingProject { kind: JobKind },

    #[error("no command configured for `{kind}`")]
    Unsupported { kind: JobKind },

    #[error("unknown placeholder `{{{name}}}` in command template for `{kind}`")]
    UnknownPlaceholder { kind: JobKind, name: String },
}

/// Commands for one job, before supervision knobs are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommands {
    pub primary: Invocation,
    pub fallback: Option<Invocation>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub path_prepend: Vec<PathBuf>,
}

impl ResolvedCommands {
    pub fn new(primary: Invocation) -> Self {
        ResolvedCommands {
            primary,
            fallback: None,
            cwd: None,
            env: BTreeMap::new(),
            path_prepend: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: Invocation) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Maps job requests to command lines.
pub trait CommandResolver: Send + Sync {
    /// Resolve the commands for a request.
    fn resolve(&self, request: &JobRequest) -> Result<ResolvedCommands, ResolveError>;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Combine a request and its resolved commands into a supervised job.
///
/// The request's working directory is used when the resolver did not pick
/// one, and its timeout applies to each attempt.
pub fn build_job(request: &JobRequest, resolved: ResolvedCommands) -> Job {
    let mut job = Job::new(request.kind, resolved.primary).with_key(request.key());
    job.fallback = resolved.fallback;
    job.cwd = resolved.cwd.or_else(|| request.working_directory.clone());
    job.env = resolved.env;
    job.path_prepend = resolved.path_prepend;
    job.timeout = request.timeout;
    job
}

/// Resolve a request and build the job in one step.
pub fn resolve_job(
    resolver: &dyn CommandResolver,
    request: &JobRequest,
) -> Result<Job, ResolveError> {
    let resolved = resolver.resolve(request)?;
    tracing::debug!(
        resolver = resolver.name(),
        kind = %request.kind,
        command = %resolved.primary.display_command(),
        "resolved job"
    );
    Ok(build_job(request, resolved))
}

/// Host operating system, as the engine tools name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPlatform {
    Windows,
    Linux,
    Mac,
}

impl HostPlatform {
    /// Platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else if cfg!(target_os = "macos") {
            HostPlatform::Mac
        } else {
            HostPlatform::Linux
        }
    }

    /// Platform name passed to the engine build tools.
    pub fn engine_name(&self) -> &'static str {
        match self {
            HostPlatform::Windows => "Win64",
            HostPlatform::Linux => "Linux",
            HostPlatform::Mac => "Mac",
        }
    }

    /// Extension of the engine's batch scripts.
    pub fn script_ext(&self) -> &'static str {
        match self {
            HostPlatform::Windows => "bat",
            HostPlatform::Linux | HostPlatform::Mac => "sh",
        }
    }

    /// Extension of native executables, without the dot.
    pub fn exe_ext(&self) -> &'static str {
        match self {
            HostPlatform::Windows => "exe",
            HostPlatform::Linux | HostPlatform::Mac => "",
        }
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.engine_name())
    }
}
