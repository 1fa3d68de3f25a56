//! External process invocation.
//!
//! [`ProcessRunner`] is the seam between the orchestrator and the operating
//! system: the pipeline builds a [`StageInvocation`], hands it to a runner,
//! and gets back a [`ProcessOutcome`]. A non-zero exit is *data*, not an
//! error; the pipeline decides what it means. Only failing to launch the
//! program, or the stage timeout firing, are errors at this level.
//!
//! [`SystemRunner`] is the real implementation. Tests substitute a scripted
//! runner that writes the files a converter would.
//!
//! ## Pipes and process groups
//!
//! Both output streams are read to EOF on helper threads that report back
//! over a channel, while the calling thread waits or polls for the timeout.
//! A child never blocks on a full pipe buffer.
//!
//! On Unix the child is started as the leader of a new process group. The
//! office suite is a launcher chain (`soffice` → `oosplash` → `soffice.bin`),
//! so a timeout signals the whole group, not just the direct child. The
//! deadline also covers the pipe drains: a descendant that keeps stdout or
//! stderr open after the child exits counts as a stage still running.

use crate::error::{Doc2ImgError, Stage};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Poll interval while waiting on a child with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One external command to run for a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub stage: Stage,
    pub program: String,
    pub args: Vec<String>,
}

impl StageInvocation {
    pub fn new(stage: Stage, program: impl Into<String>) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Render as a shell-like string for logging.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished process reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    /// Number of bytes written to stdout (content is not interpreted).
    pub stdout_len: usize,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Best description of a failure: trimmed stderr, else the exit status.
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs one external command to completion.
pub trait ProcessRunner: Send + Sync {
    /// Execute `invocation` in `working_dir`, blocking until it exits.
    fn run(
        &self,
        invocation: &StageInvocation,
        working_dir: &Path,
    ) -> Result<ProcessOutcome, Doc2ImgError>;
}

/// [`ProcessRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        invocation: &StageInvocation,
        working_dir: &Path,
    ) -> Result<ProcessOutcome, Doc2ImgError> {
        debug!("[{}] exec: {}", invocation.stage, invocation.command_line());

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| Doc2ImgError::LaunchFailed {
            stage: invocation.stage,
            program: invocation.program.clone(),
            source: e,
        })?;

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let (tx, rx) = mpsc::channel();
        drain(Pipe::Stdout, child.stdout.take(), tx.clone());
        drain(Pipe::Stderr, child.stderr.take(), tx);

        let finished = match wait(&mut child, deadline, invocation.stage)? {
            Some(status) => collect(&rx, deadline).map(|output| (status, output)),
            None => None,
        };

        let Some((status, (stdout, stderr))) = finished else {
            // Only reachable with a deadline set.
            let timeout = self.timeout.unwrap_or_default();
            warn!(
                "[{}] timed out after {:?}; killing process group {}",
                invocation.stage,
                timeout,
                child.id()
            );
            kill_tree(&mut child);
            return Err(Doc2ImgError::StageTimeout {
                stage: invocation.stage,
                secs: timeout.as_secs().max(1),
            });
        };

        let outcome = ProcessOutcome {
            exit_code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            stdout_len: stdout.len(),
        };
        debug!(
            "[{}] {} exited with {:?} ({} bytes stdout, {} bytes stderr)",
            invocation.stage,
            invocation.program,
            outcome.exit_code,
            outcome.stdout_len,
            outcome.stderr.len()
        );
        Ok(outcome)
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

/// Read a child pipe to EOF on a helper thread and send the bytes back.
fn drain<R: Read + Send + 'static>(which: Pipe, pipe: Option<R>, tx: Sender<(Pipe, Vec<u8>)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        // The receiver is gone once the stage has timed out.
        let _ = tx.send((which, buf));
    });
}

/// Wait until both pipes reach EOF. `None` when `deadline` passes first.
fn collect(
    rx: &Receiver<(Pipe, Vec<u8>)>,
    deadline: Option<Instant>,
) -> Option<(Vec<u8>, Vec<u8>)> {
    let (mut stdout, mut stderr) = (None, None);
    while stdout.is_none() || stderr.is_none() {
        let received = match deadline {
            Some(d) => rx.recv_timeout(d.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((Pipe::Stdout, bytes)) => stdout = Some(bytes),
            Ok((Pipe::Stderr, bytes)) => stderr = Some(bytes),
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Some((stdout.unwrap_or_default(), stderr.unwrap_or_default()))
}

/// Wait for `child`. `Ok(None)` when `deadline` passes first.
fn wait(
    child: &mut Child,
    deadline: Option<Instant>,
    stage: Stage,
) -> Result<Option<ExitStatus>, Doc2ImgError> {
    let io_err = |e: std::io::Error| Doc2ImgError::Internal(format!("waiting on {stage}: {e}"));

    let Some(deadline) = deadline else {
        return child.wait().map(Some).map_err(io_err);
    };

    loop {
        if let Some(status) = child.try_wait().map_err(io_err)? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGKILL the child's process group, then reap the child.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            // ESRCH: every member has already exited.
            debug!("killpg({}) failed: {}", child.id(), e);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
