//! External process execution for the legacy archive tools.
//!
//! [`CommandExecutor`] is the seam between the normaliser and the host: the
//! production [`SystemCommandExecutor`] resolves executables on `PATH` and
//! spawns them, while tests substitute a mock or a scripted stub. [`Runner`]
//! layers the calling conventions the checkers rely on over any executor:
//! resolve first, run synchronously, forward stderr to the injected log sink,
//! and turn a non-zero exit into [`ExecError::Failed`].

use retrofix_common::LogSink;
use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use wait_timeout::ChildExt;

/// How often a running child is polled for cancellation or timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation flag shared between a pass and its workers.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Running tools are killed at the next poll.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`Self::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors surfaced by external tool execution.
///
/// The three failure classes callers branch on are kept apart: the tool is
/// missing ([`Self::NotFound`]), it ran and failed ([`Self::Failed`]), or its
/// output could not be collected ([`Self::Output`]).
#[derive(Debug, Error)]
pub enum ExecError {
    /// The executable could not be resolved on the search path.
    #[error("command not found: {program}")]
    NotFound {
        /// Name that was looked up.
        program: String,
    },

    /// The executable was found but could not be started.
    #[error("cannot start {program}")]
    Spawn {
        /// Name of the tool.
        program: String,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("{program} failed: {}", status_text(.code))]
    Failed {
        /// Name of the tool.
        program: String,
        /// Exit code, or `None` when the process was killed by a signal.
        code: Option<i32>,
        /// Trimmed stderr captured from the tool.
        stderr: String,
    },

    /// The tool's output streams could not be read.
    #[error("cannot read output of {program}")]
    Output {
        /// Name of the tool.
        program: String,
        /// Underlying read failure.
        #[source]
        source: io::Error,
    },

    /// The caller cancelled the invocation while it was running.
    #[error("{program} was cancelled")]
    Cancelled {
        /// Name of the tool.
        program: String,
    },

    /// The invocation ran past its time limit and was killed.
    #[error("{program} timed out after {} seconds", .timeout.as_secs())]
    TimedOut {
        /// Name of the tool.
        program: String,
        /// The limit that was exceeded.
        timeout: Duration,
    },
}

impl ExecError {
    /// Returns the exit code when the tool ran and failed with one.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns true when the executable could not be resolved.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the name of the tool the error refers to.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::NotFound { program }
            | Self::Spawn { program, .. }
            | Self::Failed { program, .. }
            | Self::Output { program, .. }
            | Self::Cancelled { program }
            | Self::TimedOut { program, .. } => program,
        }
    }
}

fn status_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_owned(),
    }
}

/// A fully resolved request to run one external tool.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Name the tool was looked up by, used in errors and logs.
    pub name: String,
    /// Resolved executable path.
    pub program: PathBuf,
    /// Arguments passed verbatim.
    pub args: Vec<OsString>,
    /// Working directory for the child, if not inherited.
    pub working_dir: Option<PathBuf>,
    /// Whether stdout is captured (otherwise it is discarded).
    pub capture_stdout: bool,
    /// Upper bound on the child's run time.
    pub timeout: Option<Duration>,
    /// Cancellation flag polled while the child runs.
    pub cancel: Option<CancelToken>,
}

/// Abstraction for resolving and running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Resolves `program` to an executable path.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::NotFound`] when nothing on the search path
    /// matches.
    fn locate(&self, program: &str) -> Result<PathBuf, ExecError>;

    /// Runs the request to completion and returns the captured output.
    ///
    /// A non-zero exit is not an error at this layer; [`Runner`] decides.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`], [`ExecError::Output`],
    /// [`ExecError::Cancelled`] or [`ExecError::TimedOut`].
    fn execute(&self, request: &CommandRequest) -> Result<Output, ExecError>;
}

/// Resolves executables on the host `PATH` and runs them as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn locate(&self, program: &str) -> Result<PathBuf, ExecError> {
        // Names containing a separator are checked in place, which also
        // covers tools resolved relative to the working directory.
        which::which(program).map_err(|_| ExecError::NotFound {
            program: program.to_owned(),
        })
    }

    fn execute(&self, request: &CommandRequest) -> Result<Output, ExecError> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .stdout(if request.capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: request.name.clone(),
            source,
        })?;

        // Drain both pipes on their own threads so a chatty tool cannot
        // block on a full pipe while we wait for it.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let waited = wait_for(&mut child, request);
        let stdout = join_reader(stdout, &request.name);
        let stderr = join_reader(stderr, &request.name);

        Ok(Output {
            status: waited?,
            stdout: stdout?,
            stderr: stderr?,
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_reader(
    reader: Option<JoinHandle<io::Result<Vec<u8>>>>,
    program: &str,
) -> Result<Vec<u8>, ExecError> {
    let Some(handle) = reader else {
        return Ok(Vec::new());
    };
    let read = handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("output reader panicked")));
    read.map_err(|source| ExecError::Output {
        program: program.to_owned(),
        source,
    })
}

/// Waits for the child, killing it on cancellation or timeout.
fn wait_for(child: &mut Child, request: &CommandRequest) -> Result<ExitStatus, ExecError> {
    let output_error = |source| ExecError::Output {
        program: request.name.clone(),
        source,
    };

    if request.cancel.is_none() && request.timeout.is_none() {
        return child.wait().map_err(output_error);
    }

    let started = Instant::now();
    loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL).map_err(output_error)? {
            return Ok(status);
        }
        if request.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            kill(child);
            return Err(ExecError::Cancelled {
                program: request.name.clone(),
            });
        }
        if let Some(limit) = request.timeout {
            if started.elapsed() >= limit {
                kill(child);
                return Err(ExecError::TimedOut {
                    program: request.name.clone(),
                    timeout: limit,
                });
            }
        }
    }
}

fn kill(child: &mut Child) {
    // The child may already have exited between the poll and the kill.
    let _ = child.kill();
    let _ = child.wait();
}

/// Whether a run keeps or discards the tool's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stdout {
    Log,
    Discard,
    Capture,
}

/// Calling conventions over a [`CommandExecutor`].
///
/// All variants block until the tool exits. Parallelism, if any, belongs to
/// the caller.
#[derive(Clone)]
pub struct Runner<'a> {
    executor: &'a (dyn CommandExecutor + Sync),
    log: LogSink<'a>,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl<'a> Runner<'a> {
    /// Creates a runner over `executor` that reports to `log`.
    #[must_use]
    pub fn new(executor: &'a (dyn CommandExecutor + Sync), log: LogSink<'a>) -> Self {
        Self {
            executor,
            log: log.with_target("retrofix::exec"),
            timeout: None,
            cancel: None,
        }
    }

    /// Returns a runner that kills tools running longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a runner whose invocations observe `cancel`.
    #[must_use]
    pub fn with_cancel(&self, cancel: &CancelToken) -> Self {
        Self {
            cancel: Some(cancel.clone()),
            ..self.clone()
        }
    }

    /// Resolves `name` on the host search path.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::NotFound`] when the tool is not installed.
    pub fn look_cmd(&self, name: &str) -> Result<PathBuf, ExecError> {
        self.executor.locate(name)
    }

    /// Runs `name`, forwarding stdout to the debug log.
    ///
    /// # Errors
    ///
    /// Returns any [`ExecError`]; a non-zero exit is [`ExecError::Failed`].
    pub fn run<S: AsRef<OsStr>>(&self, name: &str, args: &[S]) -> Result<(), ExecError> {
        self.invoke(name, args, None, Stdout::Log).map(drop)
    }

    /// Runs `name`, discarding stdout.
    ///
    /// # Errors
    ///
    /// Returns any [`ExecError`]; a non-zero exit is [`ExecError::Failed`].
    pub fn run_quiet<S: AsRef<OsStr>>(&self, name: &str, args: &[S]) -> Result<(), ExecError> {
        self.invoke(name, args, None, Stdout::Discard).map(drop)
    }

    /// Runs `name` inside `working_dir`, discarding stdout.
    ///
    /// # Errors
    ///
    /// Returns any [`ExecError`]; a non-zero exit is [`ExecError::Failed`].
    pub fn run_wd<S: AsRef<OsStr>>(
        &self,
        name: &str,
        working_dir: &Path,
        args: &[S],
    ) -> Result<(), ExecError> {
        self.invoke(name, args, Some(working_dir), Stdout::Discard)
            .map(drop)
    }

    /// Runs `name` and returns its stdout as text.
    ///
    /// # Errors
    ///
    /// Returns any [`ExecError`]; a non-zero exit is [`ExecError::Failed`].
    pub fn run_out<S: AsRef<OsStr>>(&self, name: &str, args: &[S]) -> Result<String, ExecError> {
        let stdout = self.invoke(name, args, None, Stdout::Capture)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn invoke<S: AsRef<OsStr>>(
        &self,
        name: &str,
        args: &[S],
        working_dir: Option<&Path>,
        stdout: Stdout,
    ) -> Result<Vec<u8>, ExecError> {
        let program = self.look_cmd(name)?;
        let request = CommandRequest {
            name: name.to_owned(),
            program,
            args: args.iter().map(|a| a.as_ref().to_owned()).collect(),
            working_dir: working_dir.map(Path::to_path_buf),
            capture_stdout: stdout != Stdout::Discard,
            timeout: self.timeout,
            cancel: self.cancel.clone(),
        };

        let output = self.executor.execute(&request)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            self.log.debug(format_args!("{name}: {stderr}"));
        }
        if stdout == Stdout::Log {
            let text = String::from_utf8_lossy(&output.stdout);
            let text = text.trim();
            if !text.is_empty() {
                self.log.debug(format_args!("{name}: {text}"));
            }
        }

        if !output.status.success() {
            return Err(ExecError::Failed {
                program: name.to_owned(),
                code: output.status.code(),
                stderr: stderr.to_owned(),
            });
        }

        Ok(output.stdout)
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
