use crate::grader::os_interface::{Launcher, SpawnFailure};
use log::{debug, info, warn};
use std::{
    borrow::Cow,
    io::{self, Read, Write},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(5);
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Shared stop flag. Cloning it shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one process.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ExecutionOutcome {
    /// `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub spawn_failure: Option<SpawnFailure>,
    /// Set when the process was started but waiting on it failed.
    pub wait_error: Option<String>,
}

impl ExecutionOutcome {
    fn not_spawned(failure: SpawnFailure) -> Self {
        Self {
            spawn_failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn spawn_failed(&self) -> bool {
        self.spawn_failure.is_some()
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

enum WaitEnd {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    Failed(io::Error),
}

/// A single execution of a script: launcher, arguments, stdin payload and deadline.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Invocation {
    launcher: Launcher,
    args: Vec<String>,
    stdin: Vec<u8>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            args: vec![],
            stdin: vec![],
            timeout: DEFAULT_TIMEOUT,
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    fn config_cmd(&self, cmd: &mut Command) {
        debug!("Configuring command '{:?}'", cmd.get_program());
        debug!("- Adding args: '{:?}'", self.args);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.working_dir {
            debug!("- Setting working directory: '{}'", dir.display());
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            // Own process group, so a timeout also reaches the script's children.
            cmd.process_group(0);
        }
    }

    /// Runs the process once. Never fails: every problem is described by the outcome.
    ///
    /// The child is always reaped before this returns, including on timeout and
    /// cancellation. On Unix, whatever the script left running in its process group is
    /// killed as well, and collecting the output never outlives the deadline.
    pub fn run(&self, cancel: &CancelToken) -> ExecutionOutcome {
        let working_dir = self.working_dir.as_deref();
        if let Err(failure) = self.launcher.check(working_dir) {
            warn!("❌ Unable to execute the command: {}", failure.describe());
            return ExecutionOutcome::not_spawned(failure);
        }

        let mut cmd = self.launcher.new_cmd(working_dir);
        self.config_cmd(&mut cmd);

        info!("🔄 Trying to execute the program...");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("❌ Unable to execute the command");
                debug!("💥 Error: '{err:?}'");
                return ExecutionOutcome::not_spawned(SpawnFailure::CommandFailed {
                    command: self.launcher.program(),
                    reason: err.to_string(),
                });
            }
        };
        let deadline = Instant::now().checked_add(self.timeout);

        let stdin_writer = child.stdin.take().map(|mut stdin| {
            debug!(
                "📝 stdin: '{}'",
                String::from_utf8_lossy(&self.stdin).replace('\n', "\\n")
            );
            let payload = self.stdin.clone();
            // Dropping `stdin` at the end of the thread closes the pipe.
            thread::spawn(move || {
                if let Err(err) = stdin.write_all(&payload)
                    && err.kind() != io::ErrorKind::BrokenPipe
                {
                    debug!("💥 Unable to write stdin: '{err:?}'");
                }
            })
        });
        let stdout_reader = child.stdout.take().map(PipeReader::spawn);
        let stderr_reader = child.stderr.take().map(PipeReader::spawn);

        let end = wait_with_deadline(&mut child, deadline, cancel);

        let mut outcome = ExecutionOutcome::default();
        match end {
            WaitEnd::Exited(status) => {
                outcome.exit_code = status.code();
                debug!("Process finished with {status}");
                // Background processes of the script still hold the pipes open.
                kill_group(child.id());
            }
            WaitEnd::TimedOut => {
                warn!(
                    "⏱️  Timeout of {:?} expired, killing '{}'",
                    self.timeout,
                    self.launcher.program()
                );
                outcome.timed_out = true;
            }
            WaitEnd::Cancelled => {
                warn!("🛑 Run cancelled, killing '{}'", self.launcher.program());
                outcome.cancelled = true;
            }
            WaitEnd::Failed(err) => {
                warn!("⏱️  Unable to wait the command finish");
                debug!("💥 Error: '{err:?}'");
                outcome.wait_error = Some(err.to_string());
            }
        }

        // The pipes normally close right after the kill; the grace only matters for
        // processes that left the group.
        let drain_deadline = deadline
            .map_or_else(Instant::now, |d| d.max(Instant::now()))
            .checked_add(DRAIN_GRACE);
        let (stdout, stdout_done) = collect(stdout_reader, drain_deadline);
        let (stderr, stderr_done) = collect(stderr_reader, drain_deadline);
        outcome.stdout = stdout;
        outcome.stderr = stderr;
        if !(stdout_done && stderr_done) && !outcome.cancelled {
            warn!(
                "⏱️  Output of '{}' still open after the deadline",
                self.launcher.program()
            );
            outcome.timed_out = true;
        }
        if let Some(writer) = stdin_writer
            && writer.is_finished()
        {
            let _ = writer.join();
        }

        if !outcome.stdout.is_empty() {
            debug!("- STDOUT: '{}'", outcome.stdout_text().replace('\n', "\\n"));
        }
        if !outcome.stderr.is_empty() {
            debug!("- STDERR: '{}'", outcome.stderr_text().replace('\n', "\\n"));
        }
        outcome
    }
}

/// Drains one pipe on its own thread into a shared buffer, so what was read so far can
/// be taken even while the pipe is still open.
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl PipeReader {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .extend_from_slice(&chunk[..n]),
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => {
                        // Keep whatever was read so far.
                        debug!("💥 Unable to read pipe: '{err:?}'");
                        break;
                    }
                }
            }
        });
        Self { buf, handle }
    }

    fn take(&self) -> Vec<u8> {
        Self::take_buf(&self.buf)
    }

    fn take_buf(buf: &Mutex<Vec<u8>>) -> Vec<u8> {
        std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Waits for a reader until `deadline` and returns what it captured, plus whether the
/// pipe reached its end. An unfinished reader thread is left detached.
fn collect(reader: Option<PipeReader>, deadline: Option<Instant>) -> (Vec<u8>, bool) {
    let Some(reader) = reader else {
        return (vec![], true);
    };
    while !reader.handle.is_finished() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return (reader.take(), false);
        }
        thread::sleep(POLL_INTERVAL);
    }
    let PipeReader { buf, handle } = reader;
    let _ = handle.join();
    (PipeReader::take_buf(&buf), true)
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> WaitEnd {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return WaitEnd::Exited(status),
            Ok(None) => {}
            Err(err) => {
                terminate(child);
                return WaitEnd::Failed(err);
            }
        }
        if cancel.is_cancelled() {
            terminate(child);
            return WaitEnd::Cancelled;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            terminate(child);
            return WaitEnd::TimedOut;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Sends `SIGKILL` to the process group led by `pid`. No-op elsewhere.
fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(pid) {
            // SAFETY: `kill` has no memory-safety preconditions. The child was spawned as
            // the leader of its own group, so `-pgid` only targets the script's processes.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kills the child and its process group, then reaps it.
fn terminate(child: &mut Child) {
    kill_group(child.id());
    if let Err(err) = child.kill() {
        debug!("💥 Unable to kill the child: '{err:?}'");
    }
    if let Err(err) = child.wait() {
        debug!("💥 Unable to reap the child: '{err:?}'");
    }
}
