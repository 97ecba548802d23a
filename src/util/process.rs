//! Subprocess execution with streamed output.
//!
//! [`ProcessBuilder`] describes one command line. [`ProcessBuilder::run`]
//! spawns it and returns a [`RunHandle`] that streams output chunks as they
//! arrive, can cancel the process, and resolves to a [`RunCompletion`] once
//! the OS has confirmed the process is gone.
//!
//! Output is drained by dedicated reader tasks into an unbounded channel, so
//! a slow consumer never back-pressures the child through a full pipe.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a process gets between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Longest chunk forwarded without a line ending.
pub const MAX_CHUNK_LEN: usize = 64 * 1024;

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// A piece of output, ending on `\n` or `\r` unless it is the last chunk of
/// a stream or a line longer than [`MAX_CHUNK_LEN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: Stream,
    pub text: String,
}

/// Normal end of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunCompletion {
    /// Exit code; -1 when the process was ended by a signal
    pub exit_code: i32,
    pub elapsed: Duration,
    /// Whether the process was stopped through [`RunHandle::cancel`]
    pub cancelled: bool,
}

impl RunCompletion {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.cancelled
    }
}

/// Process-level failures. A nonzero exit is not one of them.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` timed out after {}s and was killed", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    path_prepend: Vec<PathBuf>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    kill_grace: Duration,
    detached: bool,
    cancel: CancellationToken,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            path_prepend: Vec::new(),
            cwd: None,
            timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
            detached: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable, overriding the inherited value.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (k, v) in vars {
            self = self.env(k, v);
        }
        self
    }

    /// Put directories in front of the inherited `PATH`.
    pub fn path_prepend<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.path_prepend.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Time between the graceful signal and the forced kill.
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Fire-and-forget: do not capture output or wait for exit.
    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// Use an external cancellation token (e.g. a child of a job token).
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if !self.path_prepend.is_empty() {
            let inherited = std::env::var_os("PATH").unwrap_or_default();
            let dirs = self
                .path_prepend
                .iter()
                .cloned()
                .chain(std::env::split_paths(&inherited));
            match std::env::join_paths(dirs) {
                Ok(path) => {
                    cmd.env("PATH", path);
                }
                Err(e) => warn!("ignoring PATH prepend: {}", e),
            }
        }

        // Explicit overlay wins over the prepend, including for PATH itself.
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        // Own process group, so termination reaches the tool's children too.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    /// Spawn the process.
    ///
    /// Must be called from within a Tokio runtime. In detached mode the
    /// returned handle is already complete with exit code 0.
    pub fn run(&self) -> Result<RunHandle, RunError> {
        let mut cmd = self.build_command();
        let program = self.display_command();

        if self.detached {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            let child = cmd.spawn().map_err(|source| RunError::Launch {
                program: program.clone(),
                source,
            })?;
            debug!(pid = ?child.id(), %program, "launched detached process");
            return Ok(RunHandle::detached(child.id(), self.cancel.clone()));
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| RunError::Launch {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(?pid, %program, "spawned process");

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, Stream::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, Stream::Stderr, tx.clone())));
        }
        drop(tx);

        let (done_tx, done_rx) = oneshot::channel();
        let watch = Watch {
            program,
            timeout: self.timeout,
            grace: self.kill_grace,
            cancel: self.cancel.clone(),
        };
        tokio::spawn(async move {
            let result = watch.supervise(child, readers).await;
            let _ = done_tx.send(result);
        });

        Ok(RunHandle {
            pid,
            output: rx,
            cancel: self.cancel.clone(),
            completion: Completion::Pending(done_rx),
        })
    }
}

impl fmt::Display for ProcessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_command())
    }
}

enum Completion {
    Pending(oneshot::Receiver<Result<RunCompletion, RunError>>),
    Detached,
}

/// A running process.
pub struct RunHandle {
    pid: Option<u32>,
    output: mpsc::UnboundedReceiver<OutputChunk>,
    cancel: CancellationToken,
    completion: Completion,
}

impl RunHandle {
    fn detached(pid: Option<u32>, cancel: CancellationToken) -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        RunHandle {
            pid,
            output: rx,
            cancel,
            completion: Completion::Detached,
        }
    }

    /// OS process id, if the process is still known to the OS.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next output chunk; `None` once both streams are closed.
    pub async fn next_chunk(&mut self) -> Option<OutputChunk> {
        self.output.recv().await
    }

    /// Ask the process group to terminate. Repeated calls are no-ops.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(pid = ?self.pid, "cancelling process");
            self.cancel.cancel();
        }
    }

    /// Wait for the process to end.
    pub async fn wait(self) -> Result<RunCompletion, RunError> {
        match self.completion {
            Completion::Detached => Ok(RunCompletion {
                exit_code: 0,
                elapsed: Duration::ZERO,
                cancelled: false,
            }),
            Completion::Pending(rx) => match rx.await {
                Ok(result) => result,
                Err(_) => Err(RunError::Wait {
                    program: String::from("<process>"),
                    source: io::Error::other("process watcher dropped"),
                }),
            },
        }
    }
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("pid", &self.pid)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Background watcher owning the child process.
struct Watch {
    program: String,
    timeout: Option<Duration>,
    grace: Duration,
    cancel: CancellationToken,
}

enum Ending {
    Exited(io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

impl Watch {
    async fn supervise(
        self,
        mut child: Child,
        readers: Vec<JoinHandle<()>>,
    ) -> Result<RunCompletion, RunError> {
        let start = Instant::now();
        let deadline = async {
            match self.timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending().await,
            }
        };

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = deadline => Ending::TimedOut,
            _ = self.cancel.cancelled() => Ending::Cancelled,
        };

        let (status, cancelled) = match ending {
            Ending::Exited(status) => (status, false),
            Ending::TimedOut => {
                warn!(program = %self.program, "process timed out; terminating");
                let _ = graceful_kill(&mut child, self.grace).await;
                drain(readers, self.grace).await;
                return Err(RunError::Timeout {
                    program: self.program,
                    timeout: self.timeout.unwrap_or_default(),
                });
            }
            Ending::Cancelled => (graceful_kill(&mut child, self.grace).await, true),
        };

        drain(readers, self.grace).await;
        let status = status.map_err(|source| RunError::Wait {
            program: self.program.clone(),
            source,
        })?;

        let completion = RunCompletion {
            exit_code: status.code().unwrap_or(-1),
            elapsed: start.elapsed(),
            cancelled,
        };
        debug!(program = %self.program, exit_code = completion.exit_code, cancelled, "process finished");
        Ok(completion)
    }
}

/// Wait for reader tasks to flush, aborting any still blocked after `grace`
/// (a grandchild that escaped the process group can hold a pipe open).
async fn drain(readers: Vec<JoinHandle<()>>, grace: Duration) {
    for reader in readers {
        let abort = reader.abort_handle();
        if tokio::time::timeout(grace, reader).await.is_err() {
            warn!("output reader still blocked after exit; abandoning");
            abort.abort();
        }
    }
}

/// Read a pipe and forward each line as a chunk.
///
/// A line ends at `\n` or at a lone `\r`, so progress counters that redraw
/// in place arrive as they are printed. A line longer than
/// [`MAX_CHUNK_LEN`] is forwarded in pieces.
async fn pump<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<OutputChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut pending = Vec::with_capacity(256);
    loop {
        let available = match reader.fill_buf().await {
            Ok(buf) => buf,
            Err(e) => {
                warn!(?stream, "failed to read process output: {}", e);
                break;
            }
        };
        if available.is_empty() {
            break;
        }

        let room = MAX_CHUNK_LEN - pending.len();
        let window = &available[..available.len().min(room)];
        let (used, line_end) = match window.iter().position(|b| matches!(b, b'\n' | b'\r')) {
            Some(i) => (i + 1, true),
            None => (window.len(), false),
        };
        pending.extend_from_slice(&window[..used]);
        reader.consume(used);

        if line_end || pending.len() >= MAX_CHUNK_LEN {
            forward(&tx, stream, &mut pending);
        }
    }
    if !pending.is_empty() {
        forward(&tx, stream, &mut pending);
    }
}

fn forward(tx: &mpsc::UnboundedSender<OutputChunk>, stream: Stream, pending: &mut Vec<u8>) {
    let text = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    // Nobody listening any more is fine; the pipe keeps being drained.
    let _ = tx.send(OutputChunk { stream, text });
}

/// Terminate a child process and its group.
///
/// On Unix, sends SIGTERM to the process group, waits up to `grace`, then
/// sends SIGKILL. Elsewhere the process is killed immediately.
#[cfg(unix)]
async fn graceful_kill(child: &mut Child, grace: Duration) -> io::Result<std::process::ExitStatus> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return child.wait().await;
    };
    let pgid = Pid::from_raw(pid as i32);
    let _ = killpg(pgid, Signal::SIGTERM);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            debug!(pid, "process ignored SIGTERM; sending SIGKILL");
            let _ = killpg(pgid, Signal::SIGKILL);
            child.wait().await
        }
    }
}

#[cfg(not(unix))]
async fn graceful_kill(child: &mut Child, _grace: Duration) -> io::Result<std::process::ExitStatus> {
    child.kill().await?;
    child.wait().await
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn collect(handle: &mut RunHandle) -> Vec<OutputChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = handle.next_chunk().await {
            chunks.push(chunk);
        }
        chunks
    }

    fn sh(script: &str) -> ProcessBuilder {
        ProcessBuilder::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_streams_are_tagged() {
        let mut handle = sh("echo out; echo err 1>&2; printf tail").run().unwrap();
        let chunks = collect(&mut handle).await;
        let completion = handle.wait().await.unwrap();

        assert!(completion.success());
        let stdout: Vec<_> = chunks
            .iter()
            .filter(|c| c.stream == Stream::Stdout)
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(stdout, vec!["out\n", "tail"]);
        assert!(chunks
            .iter()
            .any(|c| c.stream == Stream::Stderr && c.text == "err\n"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_completion() {
        let handle = sh("exit 3").run().unwrap();
        let completion = handle.wait().await.unwrap();
        assert_eq!(completion.exit_code, 3);
        assert!(!completion.cancelled);
        assert!(!completion.success());
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let err = ProcessBuilder::new("/definitely/not/a/real/tool")
            .run()
            .unwrap_err();
        assert!(matches!(err, RunError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_env_overlay_and_cwd() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut handle = sh("echo $STAGEHAND_TEST_VAR; pwd")
            .env("STAGEHAND_TEST_VAR", "overlay")
            .cwd(tmp.path())
            .run()
            .unwrap();
        let text: String = collect(&mut handle).await.into_iter().map(|c| c.text).collect();
        handle.wait().await.unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("overlay"));
        let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(tmp.path()).unwrap());
    }

    #[tokio::test]
    async fn test_path_prepend_finds_tool() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let tool = tmp.path().join("stagehand-fake-tool");
        std::fs::write(&tool, "#!/bin/sh\necho fake tool ran\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut handle = sh("stagehand-fake-tool")
            .path_prepend([tmp.path()])
            .run()
            .unwrap();
        let text: String = collect(&mut handle).await.into_iter().map(|c| c.text).collect();
        assert!(handle.wait().await.unwrap().success());
        assert_eq!(text, "fake tool ran\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let start = Instant::now();
        let mut handle = sh("sleep 30")
            .timeout(Some(Duration::from_millis(300)))
            .kill_grace(Duration::from_millis(500))
            .run()
            .unwrap();
        collect(&mut handle).await;
        let err = handle.wait().await.unwrap_err();

        assert!(matches!(err, RunError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mut handle = sh("echo started; sleep 30").run().unwrap();
        let first = handle.next_chunk().await.unwrap();
        assert_eq!(first.text, "started\n");

        handle.cancel();
        handle.cancel();
        collect(&mut handle).await;
        let completion = handle.wait().await.unwrap();
        assert!(completion.cancelled);
        assert!(!completion.success());
    }

    #[tokio::test]
    async fn test_sigterm_ignored_escalates_to_kill() {
        let mut handle = sh("trap '' TERM; echo ready; sleep 30")
            .kill_grace(Duration::from_millis(300))
            .run()
            .unwrap();
        handle.next_chunk().await.unwrap();
        handle.cancel();
        collect(&mut handle).await;
        let completion = handle.wait().await.unwrap();
        assert!(completion.cancelled);
    }

    #[tokio::test]
    async fn test_detached_completes_immediately() {
        let handle = sh("sleep 1").detached(true).run().unwrap();
        let completion = handle.wait().await.unwrap();
        assert_eq!(completion.exit_code, 0);
        assert!(completion.success());
    }

    #[tokio::test]
    async fn test_carriage_return_chunks_arrive_before_exit() {
        let mut handle = sh("printf '10%%\\r'; printf '20%%\\r'; sleep 30").run().unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), handle.next_chunk())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.text, "10%\r");
        let second = tokio::time::timeout(Duration::from_secs(5), handle.next_chunk())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.text, "20%\r");

        handle.cancel();
        collect(&mut handle).await;
        assert!(handle.wait().await.unwrap().cancelled);
    }

    #[tokio::test]
    async fn test_crlf_keeps_text_intact() {
        let mut handle = sh("printf 'a\\r\\nb\\n'").run().unwrap();
        let text: String = collect(&mut handle).await.into_iter().map(|c| c.text).collect();
        handle.wait().await.unwrap();
        assert_eq!(text, "a\r\nb\n");
    }

    #[tokio::test]
    async fn test_long_line_is_split_at_cap() {
        let script = format!("head -c {} /dev/zero | tr '\\0' x", MAX_CHUNK_LEN + 10);
        let mut handle = sh(&script).run().unwrap();
        let chunks = collect(&mut handle).await;
        handle.wait().await.unwrap();

        assert!(chunks.iter().all(|c| c.text.len() <= MAX_CHUNK_LEN));
        let total: usize = chunks.iter().map(|c| c.text.len()).sum();
        assert_eq!(total, MAX_CHUNK_LEN + 10);
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("RunUAT.sh").args(["BuildCookRun", "-cook"]);
        assert_eq!(pb.display_command(), "RunUAT.sh BuildCookRun -cook");
    }
}
