//! Run one supervised job from the command line.
//!
//! Resolves the request against the configured toolchain, starts it on a
//! [`JobSupervisor`], renders its events through the [`Shell`], and persists
//! the log when the job fails (or when asked to).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::broadcast::error::RecvError;

use crate::core::job::{Job, JobKind, JobRequest, JobState};
use crate::core::log_sink::{log_file_path, log_file_stamp, LogSink, DEFAULT_CAPACITY};
use crate::core::outcome::ClassifiedResult;
use crate::supervisor::{JobEvent, JobSupervisor};
use crate::toolchain::{
    resolve_job, CommandResolver, ConfiguredResolver, ResolveError, UnrealResolver,
};
use crate::util::config::Config;
use crate::util::diagnostic::{emit, job_diagnostic, JobFailedError};
use crate::util::fs::prune_files;
use crate::util::shell::{format_duration, Progress, Shell, Status};
use crate::util::GlobalContext;

/// Number of persisted logs kept per log directory.
pub const KEEP_LOGS: usize = 20;

/// Options for a job run, usually from CLI flags.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub kind: JobKind,
    /// Project descriptor; overrides config and discovery
    pub project: Option<PathBuf>,
    pub target: Option<String>,
    pub platform: Option<String>,
    pub configuration: Option<String>,
    /// Per-attempt timeout; overrides `[defaults] timeout_secs`
    pub timeout: Option<Duration>,
    /// Persist the log even when the job succeeds
    pub save_log: bool,
}

impl JobOptions {
    pub fn new(kind: JobKind) -> Self {
        JobOptions {
            kind,
            project: None,
            target: None,
            platform: None,
            configuration: None,
            timeout: None,
            save_log: false,
        }
    }
}

/// Build the resolver for a configuration.
///
/// `[commands.<kind>]` templates win; other kinds go to the engine install
/// when `[engine] root` is set.
pub fn job_resolver(config: &Config) -> Box<dyn CommandResolver> {
    let mut resolver = ConfiguredResolver::new(config.command_templates());
    if let Some(root) = &config.engine.root {
        resolver = resolver
            .with_engine_root(root)
            .with_base(Box::new(UnrealResolver::new(root)));
    }
    Box::new(resolver)
}

/// Build a request from options, falling back to config defaults.
///
/// Precedence is CLI flag, then project/global config, then built-in default.
pub fn job_request(ctx: &GlobalContext, options: &JobOptions) -> JobRequest {
    let config = ctx.config();
    let mut request = JobRequest::new(options.kind);

    if let Some(project) = options
        .project
        .as_ref()
        .map(|p| ctx.cwd().join(p))
        .or_else(|| ctx.find_project_file())
    {
        request = request.with_project(project);
    }
    if let Some(target) = options.target.as_ref().or(config.project.target.as_ref()) {
        request = request.with_target(target);
    }
    if let Some(platform) = options.platform.as_ref().or(config.defaults.platform.as_ref()) {
        request = request.with_platform(platform);
    }
    if let Some(configuration) = options
        .configuration
        .as_ref()
        .or(config.defaults.configuration.as_ref())
    {
        request = request.with_configuration(configuration);
    }
    if let Some(timeout) = options.timeout.or_else(|| config.timeout()) {
        request = request.with_timeout(timeout);
    }
    if let Some(root) = ctx.project_root() {
        request = request.with_working_directory(root);
    }
    request
}

/// Resolve options to a job with the config environment applied.
pub fn prepare_job(ctx: &GlobalContext, options: &JobOptions) -> Result<Job, ResolveError> {
    let config = ctx.config();
    let request = job_request(ctx, options);
    let resolver = job_resolver(config);

    let mut job = resolve_job(resolver.as_ref(), &request).map_err(|e| match e {
        ResolveError::Unsupported { .. } if config.engine.root.is_none() => {
            ResolveError::MissingEngine
        }
        e => e,
    })?;

    // Resolver-provided variables win over the config overlay.
    let mut env = config.env.vars.clone();
    env.append(&mut job.env);
    job.env = env;

    let mut path_prepend = config.env.path_prepend.clone();
    path_prepend.append(&mut job.path_prepend);
    job.path_prepend = path_prepend;

    Ok(job)
}

/// Run a job to completion.
///
/// Returns the result on success. A failed or cancelled job is reported
/// through the shell and returned as a [`JobFailedError`].
pub async fn run_job(
    ctx: &GlobalContext,
    shell: &Arc<Shell>,
    options: &JobOptions,
) -> Result<ClassifiedResult> {
    let job = prepare_job(ctx, options)?;
    let kind = job.kind;
    let key = job.key.clone();

    let capacity = ctx.config().log.capacity.unwrap_or(DEFAULT_CAPACITY);
    let supervisor = JobSupervisor::builder()
        .log(Arc::new(LogSink::with_capacity(capacity)))
        .build();

    let mut handle = supervisor.start(job)?;
    let mut events = handle.subscribe();

    shell.status(Status::for_kind(kind), format!("{} ({})", kind.label(), key));
    let mut progress = shell.progress(format!("{}…", kind.label()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                match signal {
                    Ok(()) => {
                        progress.status(Status::Cancelled, "stopping tool (Ctrl-C)");
                        handle.cancel();
                    }
                    Err(e) => tracing::warn!("failed to listen for Ctrl-C: {}", e),
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let finished = matches!(event, JobEvent::Finished { .. });
                    render_event(shell, &mut progress, &event);
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    progress.finish();

    let log = handle.log();
    let result = handle.wait().await?;

    let log_path = if !result.success || options.save_log {
        match save_log(&log, &ctx.log_dir(), kind) {
            Ok(path) => Some(path),
            Err(e) => {
                shell.warn(format!("{:#}", e));
                None
            }
        }
    } else {
        None
    };

    if result.success {
        let status = if kind.is_detached() {
            Status::Launched
        } else {
            Status::Finished
        };
        shell.status(
            status,
            format!("{} in {}", kind.label(), format_duration(result.elapsed)),
        );
        if let Some(path) = &log_path {
            shell.status(Status::Saved, path.display());
        }
        return Ok(result);
    }

    if !shell.is_json() {
        emit(&job_diagnostic(&result, log_path.as_deref()), shell.use_color());
    }
    Err(JobFailedError::new(result, log_path).into())
}

fn render_event(shell: &Shell, progress: &mut Progress, event: &JobEvent) {
    if shell.is_json() {
        shell.json_event(event);
        return;
    }

    match event {
        JobEvent::Log { text, .. } if shell.is_verbose() => progress.println(text),
        JobEvent::Log { .. } => {}
        JobEvent::Phase { phase, percent, .. } => progress.set_phase(phase, *percent),
        JobEvent::State {
            state: JobState::RunningFallback,
            ..
        } => progress.status(Status::Retrying, "with the fallback command"),
        JobEvent::State { state, .. } => {
            tracing::debug!(state = %state, "job state changed");
        }
        JobEvent::Started { command, .. } => {
            tracing::debug!(command = %command, "job started");
        }
        JobEvent::Finished { .. } => {}
    }
}

/// Persist the job log and prune old logs.
fn save_log(log: &LogSink, dir: &Path, kind: JobKind) -> Result<PathBuf> {
    let path = log_file_path(dir, kind.as_str(), Local::now());
    log.persist_to_file(&path)
        .with_context(|| format!("failed to save {} log", kind))?;

    let removed = prune_files(dir, "stagehand-", KEEP_LOGS, log_file_stamp)?;
    if !removed.is_empty() {
        tracing::debug!(count = removed.len(), "pruned old logs");
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::config::project_config_path;
    use tempfile::TempDir;

    fn project(config: &str) -> (TempDir, GlobalContext) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("Game");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("Game.uproject"), "{}").unwrap();
        let config_path = project_config_path(&root);
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(&config_path, config).unwrap();

        let ctx = GlobalContext::with_home(root, tmp.path().join("home"));
        (tmp, ctx)
    }

    #[test]
    fn test_request_uses_config_defaults() {
        let (_tmp, ctx) = project(
            "[project]\ntarget = \"GameEditor\"\n[defaults]\nplatform = \"Linux\"\nconfiguration = \"Shipping\"\ntimeout_secs = 30\n",
        );
        let request = job_request(&ctx, &JobOptions::new(JobKind::Build));

        assert_eq!(request.target.as_deref(), Some("GameEditor"));
        assert_eq!(request.platform, "Linux");
        assert_eq!(request.configuration, "Shipping");
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            request.project,
            Some(ctx.project_root().unwrap().join("Game.uproject"))
        );
    }

    #[test]
    fn test_flags_override_config() {
        let (_tmp, ctx) = project("[defaults]\nconfiguration = \"Shipping\"\ntimeout_secs = 30\n");
        let mut options = JobOptions::new(JobKind::Cook);
        options.configuration = Some("DebugGame".to_string());
        options.timeout = Some(Duration::from_secs(5));

        let request = job_request(&ctx, &options);
        assert_eq!(request.configuration, "DebugGame");
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_prepare_job_applies_env_overlay() {
        let (_tmp, ctx) = project(
            "[env]\nSTAGE = \"1\"\npath_prepend = [\"tools\"]\n\n[commands.build]\nprogram = \"sh\"\nargs = [\"-c\", \"echo {target}\"]\n",
        );
        let job = prepare_job(&ctx, &JobOptions::new(JobKind::Build)).unwrap();

        assert_eq!(job.primary.args, vec!["-c", "echo Game"]);
        assert_eq!(job.env.get("STAGE").map(String::as_str), Some("1"));
        assert_eq!(
            job.path_prepend,
            vec![ctx.project_root().unwrap().join("tools")]
        );
    }

    #[test]
    fn test_missing_engine_without_template() {
        let (_tmp, ctx) = project("");
        let err = prepare_job(&ctx, &JobOptions::new(JobKind::Package)).unwrap_err();
        assert!(matches!(err, ResolveError::MissingEngine));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_job_persists_log_on_failure() {
        let (_tmp, ctx) = project(
            "[commands.build]\nprogram = \"sh\"\nargs = [\"-c\", \"echo 'Game.cpp(3): error C2065: x'; exit 6\"]\n",
        );
        let shell = Arc::new(Shell::from_flags(
            true,
            false,
            crate::util::shell::ColorChoice::Never,
            false,
        ));

        let err = run_job(&ctx, &shell, &JobOptions::new(JobKind::Build))
            .await
            .unwrap_err();
        let failed = err.downcast_ref::<JobFailedError>().unwrap();
        assert_eq!(failed.result.exit_code, Some(6));
        assert_eq!(failed.exit_status(), 1);

        let path = failed.log_path.as_ref().unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("error C2065"));
        assert!(path.starts_with(ctx.log_dir()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_job_success_without_log() {
        let (_tmp, ctx) = project(
            "[commands.clean]\nprogram = \"sh\"\nargs = [\"-c\", \"echo cleaning\"]\n",
        );
        let shell = Arc::new(Shell::from_flags(
            true,
            false,
            crate::util::shell::ColorChoice::Never,
            false,
        ));

        let result = run_job(&ctx, &shell, &JobOptions::new(JobKind::Clean))
            .await
            .unwrap();
        assert!(result.success);
        assert!(!ctx.log_dir().exists());
    }
}
