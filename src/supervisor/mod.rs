//! Job supervision.
//!
//! [`JobSupervisor`] drives one [`Job`] at a time through its lifecycle:
//!
//! ```text
//! Idle → Running → Completed | Failed | TimedOut | Cancelled
//!           └─(primary failed, fallback present)→ RunningFallback → Completed | Failed | TimedOut | Cancelled
//! ```
//!
//! Output of every attempt is streamed into the shared [`LogSink`] and the
//! [`PhaseProgressTracker`], and failures are classified from a bounded tail
//! of the attempt's combined output. Callers get a [`JobHandle`] to observe,
//! cancel and await the job.

pub mod capture;
pub mod events;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::job::{Invocation, Job, JobKind, JobState};
use crate::core::log_sink::{LogClass, LogRef, LogSink};
use crate::core::outcome::{Cause, ClassifiedError, ClassifiedResult};
use crate::scan::{ErrorClassifier, PhaseProgressTracker, PhaseState};
use crate::util::process::{ProcessBuilder, RunError, Stream, DEFAULT_KILL_GRACE};

pub use capture::OutputTail;
pub use events::JobEvent;

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 4096;

/// Errors from the supervisor itself. Job failures are results, not errors.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("job {running} is still running; wait for it or cancel it first")]
    Busy { running: u64 },

    #[error("supervision of job {job_id} was aborted")]
    Aborted { job_id: u64 },
}

struct Inner {
    log: Arc<LogSink>,
    classifier: ErrorClassifier,
    tracker: Mutex<PhaseProgressTracker>,
    events: broadcast::Sender<JobEvent>,
    /// Id of the running job, 0 when idle
    running: AtomicU64,
    busy: AtomicBool,
    next_id: AtomicU64,
    kill_grace: Duration,
}

/// Runs jobs one at a time and reports their progress and outcome.
#[derive(Clone)]
pub struct JobSupervisor {
    inner: Arc<Inner>,
}

/// Builder for [`JobSupervisor`].
pub struct SupervisorBuilder {
    log: Option<Arc<LogSink>>,
    classifier: ErrorClassifier,
    tracker: PhaseProgressTracker,
    kill_grace: Duration,
}

impl SupervisorBuilder {
    /// Share an existing log sink instead of creating one.
    pub fn log(mut self, log: Arc<LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn tracker(mut self, tracker: PhaseProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Time between the graceful and the forced kill on cancel or timeout.
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn build(self) -> JobSupervisor {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        JobSupervisor {
            inner: Arc::new(Inner {
                log: self.log.unwrap_or_else(|| Arc::new(LogSink::new())),
                classifier: self.classifier,
                tracker: Mutex::new(self.tracker),
                events,
                running: AtomicU64::new(0),
                busy: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                kill_grace: self.kill_grace,
            }),
        }
    }
}

impl JobSupervisor {
    /// Create a supervisor with a fresh log sink and default rule tables.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder {
            log: None,
            classifier: ErrorClassifier::new(),
            tracker: PhaseProgressTracker::new(),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// The log sink all jobs write to.
    pub fn log(&self) -> Arc<LogSink> {
        Arc::clone(&self.inner.log)
    }

    /// Current phase view of the most recent job.
    pub fn phase(&self) -> PhaseState {
        self.inner.tracker.lock().state().clone()
    }

    /// Whether a job is currently running.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Subscribe to events of all jobs started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Start a job.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`SupervisorError::Busy`] if another job has not finished yet.
    pub fn start(&self, job: Job) -> Result<JobHandle, SupervisorError> {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SupervisorError::Busy {
                running: self.inner.running.load(Ordering::Acquire),
            });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.running.store(id, Ordering::Release);

        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(JobState::Idle);
        let (phase_tx, phase_rx) = watch::channel(PhaseState::default());
        // Subscribe before spawning so the handle sees the whole job.
        let events = self.inner.events.subscribe();

        let kind = job.kind;
        let run = Run {
            inner: Arc::clone(&self.inner),
            id,
            cancel: cancel.clone(),
            state: state_tx,
            phase: phase_tx,
        };
        let task = tokio::spawn(run.execute(job));

        Ok(JobHandle {
            id,
            kind,
            cancel,
            state: state_rx,
            phase: phase_rx,
            events: Some(events),
            sender: self.inner.events.clone(),
            log: Arc::clone(&self.inner.log),
            task,
        })
    }
}

impl Default for JobSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a started job.
pub struct JobHandle {
    id: u64,
    kind: JobKind,
    cancel: CancellationToken,
    state: watch::Receiver<JobState>,
    phase: watch::Receiver<PhaseState>,
    events: Option<broadcast::Receiver<JobEvent>>,
    sender: broadcast::Sender<JobEvent>,
    log: Arc<LogSink>,
    task: JoinHandle<ClassifiedResult>,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Event stream for this job.
    ///
    /// The first call returns a receiver that has seen every event since
    /// the job started; later calls only see events from then on.
    pub fn subscribe(&mut self) -> broadcast::Receiver<JobEvent> {
        self.events.take().unwrap_or_else(|| self.sender.subscribe())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Current phase label and percentage.
    pub fn phase(&self) -> PhaseState {
        self.phase.borrow().clone()
    }

    /// The log sink the job writes to.
    pub fn log(&self) -> Arc<LogSink> {
        Arc::clone(&self.log)
    }

    /// Token that cancels this job, e.g. for a Ctrl-C handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation. Calling it again, or after the job ended, does nothing.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() && !self.state().is_terminal() {
            info!(job_id = self.id, "cancelling job");
        }
        self.cancel.cancel();
    }

    /// Wait for the terminal result.
    pub async fn wait(self) -> Result<ClassifiedResult, SupervisorError> {
        self.task
            .await
            .map_err(|_| SupervisorError::Aborted { job_id: self.id })
    }
}

/// Outcome of one process attempt.
enum Attempt {
    Succeeded { exit_code: i32 },
    Failed {
        exit_code: Option<i32>,
        output: OutputTail,
        launch: bool,
    },
    TimedOut,
    Cancelled,
}

impl Attempt {
    fn is_retryable(&self) -> bool {
        matches!(self, Attempt::Failed { .. })
    }
}

/// Releases the busy flag when the job task ends, even by panic.
struct BusyGuard(Arc<Inner>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.running.store(0, Ordering::Release);
        self.0.busy.store(false, Ordering::Release);
    }
}

/// State of one job run, owned by its task.
struct Run {
    inner: Arc<Inner>,
    id: u64,
    cancel: CancellationToken,
    state: watch::Sender<JobState>,
    phase: watch::Sender<PhaseState>,
}

impl Run {
    async fn execute(self, job: Job) -> ClassifiedResult {
        let _busy = BusyGuard(Arc::clone(&self.inner));
        let start = Instant::now();
        let first_seq = self.inner.log.next_seq();

        let initial = {
            let mut tracker = self.inner.tracker.lock();
            tracker.reset();
            tracker.state().clone()
        };
        self.phase.send_replace(initial);

        self.emit(JobEvent::Started {
            job_id: self.id,
            kind: job.kind,
            key: job.key.clone(),
            command: job.primary.display_command(),
        });
        self.transition(JobState::Running);
        info!(job_id = self.id, kind = %job.kind, "job started");
        self.append(&start_banner(&job), LogClass::Info);
        self.append(&format!("> {}", job.primary.display_command()), LogClass::Info);

        let mut attempts = 1;
        let mut attempt = self.attempt(&job, &job.primary).await;

        if let Some(fallback) = job.fallback.as_ref().filter(|_| attempt.is_retryable()) {
            if self.cancel.is_cancelled() {
                attempt = Attempt::Cancelled;
            } else {
                warn!(job_id = self.id, "primary attempt failed; running fallback");
                self.transition(JobState::RunningFallback);
                self.append(
                    &format!(
                        "{} failed, retrying with fallback: {}",
                        job.kind.label(),
                        fallback.display_command()
                    ),
                    LogClass::Warning,
                );
                attempts = 2;
                attempt = self.attempt(&job, fallback).await;
            }
        }

        // A cancel request always wins, even if the process exited on its own.
        if self.cancel.is_cancelled() {
            attempt = Attempt::Cancelled;
        }

        self.finish(&job, attempt, attempts, first_seq, start.elapsed())
    }

    async fn attempt(&self, job: &Job, invocation: &Invocation) -> Attempt {
        if self.cancel.is_cancelled() {
            return Attempt::Cancelled;
        }

        let mut builder = ProcessBuilder::new(&invocation.program)
            .args(&invocation.args)
            .envs(&job.env)
            .path_prepend(job.path_prepend.iter().cloned())
            .timeout(job.timeout)
            .kill_grace(self.inner.kill_grace)
            .detached(job.detached)
            .cancel_token(self.cancel.child_token());
        if let Some(cwd) = invocation.cwd.as_ref().or(job.cwd.as_ref()) {
            builder = builder.cwd(cwd);
        }

        let mut output = OutputTail::new();
        let mut handle = match builder.run() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(job_id = self.id, "{}", e);
                output.push(&e.to_string());
                self.append(&e.to_string(), LogClass::Error);
                return Attempt::Failed {
                    exit_code: None,
                    output,
                    launch: true,
                };
            }
        };

        while let Some(chunk) = handle.next_chunk().await {
            output.push(&chunk.text);
            let class = match chunk.stream {
                Stream::Stdout => LogClass::Stdout,
                Stream::Stderr => LogClass::Stderr,
            };
            self.record(&chunk.text, class);
        }

        match handle.wait().await {
            Ok(done) if done.cancelled => Attempt::Cancelled,
            Ok(done) if done.exit_code == 0 => Attempt::Succeeded { exit_code: 0 },
            Ok(done) => Attempt::Failed {
                exit_code: Some(done.exit_code),
                output,
                launch: false,
            },
            Err(RunError::Timeout { .. }) => Attempt::TimedOut,
            Err(e) => {
                self.append(&e.to_string(), LogClass::Error);
                Attempt::Failed {
                    exit_code: None,
                    output,
                    launch: matches!(e, RunError::Launch { .. }),
                }
            }
        }
    }

    fn finish(
        &self,
        job: &Job,
        attempt: Attempt,
        attempts: u8,
        first_seq: u64,
        elapsed: Duration,
    ) -> ClassifiedResult {
        let label = job.kind.label();
        let secs = elapsed.as_secs_f64();
        let (state, banner, class) = match &attempt {
            Attempt::Succeeded { .. } => (
                JobState::Completed,
                format!("{} completed in {:.1}s", label, secs),
                LogClass::Info,
            ),
            Attempt::Failed { exit_code, .. } => (
                JobState::Failed,
                match exit_code {
                    Some(code) => format!("{} failed with exit code {} after {:.1}s", label, code, secs),
                    None => format!("{} failed to run", label),
                },
                LogClass::Error,
            ),
            Attempt::TimedOut => (
                JobState::TimedOut,
                format!(
                    "{} timed out after {}s",
                    label,
                    job.timeout.unwrap_or_default().as_secs()
                ),
                LogClass::Error,
            ),
            Attempt::Cancelled => (
                JobState::Cancelled,
                format!("{} cancelled by user", label),
                LogClass::Warning,
            ),
        };
        self.append(&banner, class);

        let log_ref = LogRef {
            job_id: self.id,
            first_seq,
            end_seq: self.inner.log.next_seq(),
        };

        let (exit_code, error) = match attempt {
            Attempt::Succeeded { exit_code } => (Some(exit_code), None),
            Attempt::Failed {
                exit_code,
                output,
                launch,
            } => {
                let error = if launch {
                    ClassifiedError::new(Cause::LaunchFailure, exit_code, log_ref)
                } else {
                    self.inner
                        .classifier
                        .classify(exit_code, output.as_str(), log_ref)
                };
                (exit_code, Some(error))
            }
            Attempt::TimedOut => (None, Some(ClassifiedError::new(Cause::Timeout, None, log_ref))),
            Attempt::Cancelled => (None, None),
        };

        let cause = match state {
            JobState::Cancelled => Some(Cause::Cancelled),
            _ => error.as_ref().map(|e| e.cause),
        };

        self.inner.tracker.lock().finish();
        self.transition(state);

        let result = ClassifiedResult {
            job_id: self.id,
            kind: job.kind,
            success: state == JobState::Completed,
            state,
            exit_code,
            cause,
            error,
            log_ref,
            attempts,
            elapsed,
        };
        info!(job_id = self.id, %state, ?cause, "job finished");
        self.emit(JobEvent::Finished {
            result: result.clone(),
        });
        result
    }

    /// Append captured output and feed it to the phase tracker.
    fn record(&self, text: &str, class: LogClass) {
        for entry in self.inner.log.append(text, class) {
            self.emit(JobEvent::log(self.id, &entry));
            let update = self.inner.tracker.lock().observe(&entry.text);
            if let Some(update) = update {
                self.phase.send_modify(|state| {
                    state.phase.clone_from(&update.phase);
                    state.percent = update.percent;
                    state.updated_at = update.timestamp;
                });
                self.emit(JobEvent::phase(self.id, &update));
            }
        }
    }

    /// Append a synthetic line. Banners are not fed to the phase tracker.
    fn append(&self, text: &str, class: LogClass) {
        for entry in self.inner.log.append(text, class) {
            self.emit(JobEvent::log(self.id, &entry));
        }
    }

    fn transition(&self, state: JobState) {
        debug!(job_id = self.id, %state, "state transition");
        self.state.send_replace(state);
        self.emit(JobEvent::State {
            job_id: self.id,
            state,
        });
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn start_banner(job: &Job) -> String {
    if job.key.target.is_empty() {
        format!("{} started", job.kind.label())
    } else {
        format!("{} started ({})", job.kind.label(), job.key)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::job::JobKey;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").args(["-c", script])
    }

    fn job(kind: JobKind, script: &str) -> Job {
        Job::new(kind, sh(script))
    }

    fn supervisor() -> JobSupervisor {
        JobSupervisor::builder()
            .kill_grace(Duration::from_millis(500))
            .build()
    }

    /// Drain events until the job finishes, returning the states seen.
    async fn states_until_finished(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.recv().await {
            match event {
                JobEvent::State { state, .. } => states.push(state),
                JobEvent::Finished { .. } => break,
                _ => {}
            }
        }
        states
    }

    #[tokio::test]
    async fn test_successful_job_tracks_phases() {
        let sup = supervisor();
        let mut handle = sup
            .start(job(JobKind::Cook, "echo 'Cooking…'; echo 50%; echo 'Staging files'"))
            .unwrap();
        let mut rx = handle.subscribe();

        let mut phases = Vec::new();
        while let Ok(event) = rx.recv().await {
            match event {
                JobEvent::Phase { phase, percent, .. } => phases.push((phase, percent)),
                JobEvent::Finished { .. } => break,
                _ => {}
            }
        }
        let result = handle.wait().await.unwrap();

        assert!(result.success);
        assert_eq!(result.state, JobState::Completed);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.cause.is_none());
        assert_eq!(phases[0], ("Cooking content…".to_string(), 40));
        assert_eq!(phases[1], ("Cooking content…".to_string(), 50));
        assert_eq!(phases[2].0, "Staging files…");
        assert!(phases[2].1 >= 50);
        assert_eq!(sup.phase().phase, "Staging files…");
    }

    #[tokio::test]
    async fn test_compile_failure_without_fallback() {
        let sup = supervisor();
        let mut handle = sup
            .start(job(
                JobKind::Build,
                "echo 'MyActor.cpp(42): error C2065: Foo: undeclared identifier'; exit 6",
            ))
            .unwrap();
        let mut rx = handle.subscribe();
        let states = states_until_finished(&mut rx).await;
        let result = handle.wait().await.unwrap();

        assert_eq!(states, vec![JobState::Running, JobState::Failed]);
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(6));
        assert_eq!(result.cause, Some(Cause::CompileFailure));
        assert_eq!(result.attempts, 1);
        let error = result.error.unwrap();
        assert_eq!(error.summary, Cause::CompileFailure.template());
    }

    #[tokio::test]
    async fn test_fallback_recovers() {
        let sup = supervisor();
        let job = job(JobKind::Generate, "echo 'primary broke' 1>&2; exit 1")
            .with_fallback(sh("echo 'Generating project files'; echo done"));
        let mut handle = sup.start(job).unwrap();
        let mut rx = handle.subscribe();
        let states = states_until_finished(&mut rx).await;
        let result = handle.wait().await.unwrap();

        assert_eq!(
            states,
            vec![JobState::Running, JobState::RunningFallback, JobState::Completed]
        );
        assert!(result.success);
        assert_eq!(result.attempts, 2);
        assert!(result.error.is_none());

        // Both attempts' output is in the job's log range.
        let texts: Vec<_> = handle_log_texts(&sup, &result.log_ref);
        assert!(texts.iter().any(|t| t == "primary broke"));
        assert!(texts.iter().any(|t| t == "done"));
    }

    #[tokio::test]
    async fn test_failed_fallback_is_terminal() {
        let sup = supervisor();
        let job = job(JobKind::Generate, "exit 1").with_fallback(sh("echo 'Unhandled exception: boom'; exit 2"));
        let mut handle = sup.start(job).unwrap();
        let mut rx = handle.subscribe();
        let states = states_until_finished(&mut rx).await;
        let result = handle.wait().await.unwrap();

        assert_eq!(
            states,
            vec![JobState::Running, JobState::RunningFallback, JobState::Failed]
        );
        assert_eq!(result.attempts, 2);
        assert_eq!(result.exit_code, Some(2));
        assert_eq!(result.cause, Some(Cause::InternalToolException));
    }

    #[tokio::test]
    async fn test_launch_failure_uses_fallback() {
        let sup = supervisor();
        let job = Job::new(JobKind::Generate, Invocation::new("/no/such/GenerateProjectFiles.sh"))
            .with_fallback(sh("echo fallback ran"));
        let result = sup.start(job).unwrap().wait().await.unwrap();
        assert!(result.success);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_launch_failure_without_fallback() {
        let sup = supervisor();
        let job = Job::new(JobKind::Build, Invocation::new("/no/such/Build.sh"));
        let result = sup.start(job).unwrap().wait().await.unwrap();
        assert_eq!(result.state, JobState::Failed);
        assert_eq!(result.cause, Some(Cause::LaunchFailure));
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn test_cancel_yields_cancelled() {
        let sup = supervisor();
        let job = job(JobKind::Package, "echo started; sleep 30")
            .with_fallback(sh("echo should not run"));
        let mut handle = sup.start(job).unwrap();
        let mut rx = handle.subscribe();

        while let Ok(event) = rx.recv().await {
            if matches!(&event, JobEvent::Log { text, .. } if text == "started") {
                break;
            }
        }
        handle.cancel();
        handle.cancel();

        let started = Instant::now();
        let result = handle.wait().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.state, JobState::Cancelled);
        assert_eq!(result.cause, Some(Cause::Cancelled));
        assert!(result.error.is_none());
        assert!(!result.success);
        assert_eq!(result.attempts, 1);

        let texts = handle_log_texts(&sup, &result.log_ref);
        assert!(!texts.iter().any(|t| t == "should not run"));
        assert!(texts.iter().any(|t| t.contains("cancelled by user")));
    }

    #[tokio::test]
    async fn test_timeout_yields_timed_out() {
        let sup = supervisor();
        let job = job(JobKind::Cook, "sleep 30")
            .with_timeout(Duration::from_millis(400))
            .with_fallback(sh("echo should not run"));
        let started = Instant::now();
        let result = sup.start(job).unwrap().wait().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.state, JobState::TimedOut);
        assert_eq!(result.cause, Some(Cause::Timeout));
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error.unwrap().cause, Cause::Timeout);
    }

    #[tokio::test]
    async fn test_busy_supervisor_rejects_second_job() {
        let sup = supervisor();
        let first = sup.start(job(JobKind::Build, "sleep 30")).unwrap();
        assert!(sup.is_busy());

        let err = sup.start(job(JobKind::Clean, "true")).err().unwrap();
        assert!(matches!(err, SupervisorError::Busy { running } if running == first.id()));

        first.cancel();
        first.wait().await.unwrap();
        assert!(!sup.is_busy());

        let result = sup.start(job(JobKind::Clean, "true")).unwrap().wait().await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_progress_resets_between_jobs() {
        let sup = supervisor();
        sup.start(job(JobKind::Build, "echo 90%")).unwrap().wait().await.unwrap();
        assert_eq!(sup.phase().percent, 90);

        let mut handle = sup.start(job(JobKind::Build, "echo 10%")).unwrap();
        let mut rx = handle.subscribe();
        let mut percents = Vec::new();
        while let Ok(event) = rx.recv().await {
            match event {
                JobEvent::Phase { percent, .. } => percents.push(percent),
                JobEvent::Finished { .. } => break,
                _ => {}
            }
        }
        handle.wait().await.unwrap();
        assert_eq!(percents, vec![10]);
    }

    #[tokio::test]
    async fn test_log_ref_covers_banners_and_output() {
        let sup = supervisor();
        let job = job(JobKind::Build, "echo hello; echo oops 1>&2").with_key(JobKey {
            target: "MyGameEditor".to_string(),
            configuration: "Development".to_string(),
            platform: "Linux".to_string(),
        });
        let result = sup.start(job).unwrap().wait().await.unwrap();

        let entries = sup.log().range(&result.log_ref);
        assert_eq!(entries.len() as u64, result.log_ref.len());
        assert_eq!(entries[0].text, "Build started (MyGameEditor Linux Development)");
        assert_eq!(entries[0].class, LogClass::Info);
        assert!(entries
            .iter()
            .any(|e| e.text == "oops" && e.class == LogClass::Stderr));
        assert!(entries.last().unwrap().text.starts_with("Build completed"));
    }

    #[tokio::test]
    async fn test_detached_job_completes_immediately() {
        let sup = supervisor();
        let result = sup
            .start(job(JobKind::Editor, "sleep 2"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.elapsed < Duration::from_secs(2));
    }

    fn handle_log_texts(sup: &JobSupervisor, log_ref: &LogRef) -> Vec<String> {
        sup.log().range(log_ref).into_iter().map(|e| e.text).collect()
    }
}
