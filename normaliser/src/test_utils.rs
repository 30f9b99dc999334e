//! Shared test utilities for the normaliser crate.

#![cfg_attr(
    not(test),
    expect(clippy::expect_used, reason = "test fixtures fail loudly")
)]

pub mod fixtures;

use crate::exec::{CommandExecutor, CommandRequest, ExecError};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Output};
use std::sync::Mutex;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.cast_unsigned())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a successful command `Output` carrying `stdout`.
#[must_use]
pub fn output_with_stdout(stdout: &str) -> Output {
    Output {
        stdout: stdout.as_bytes().to_vec(),
        ..success_output()
    }
}

/// Creates a failed command `Output` with the given exit code and stderr.
#[must_use]
pub fn failure_output(code: i32, stderr: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

type Effect = Box<dyn Fn(&CommandRequest) + Send>;

/// Represents an expected command invocation for testing.
pub struct ExpectedCall {
    /// The tool name the runner looks up (e.g. `"unzip"`).
    pub program: &'static str,
    /// Arguments to match, rendered lossily; `None` accepts any.
    pub args: Option<Vec<String>>,
    /// Side effect applied before returning, such as writing extracted files
    /// into the request's working directory.
    pub effect: Option<Effect>,
    /// The result to return when this command is invoked.
    pub result: Result<Output, ExecError>,
}

impl ExpectedCall {
    /// Expects a call to `program` with any arguments, returning `result`.
    #[must_use]
    pub fn new(program: &'static str, result: Result<Output, ExecError>) -> Self {
        Self {
            program,
            args: None,
            effect: None,
            result,
        }
    }

    /// Expects a call to `program` that succeeds silently.
    #[must_use]
    pub fn succeeding(program: &'static str) -> Self {
        Self::new(program, Ok(success_output()))
    }

    /// Requires the call's arguments to equal `args`.
    #[must_use]
    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = Some(args.iter().map(|a| (*a).to_owned()).collect());
        self
    }

    /// Runs `effect` against the request before returning the result.
    #[must_use]
    pub fn with_effect(mut self, effect: impl Fn(&CommandRequest) + Send + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

impl fmt::Debug for ExpectedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectedCall")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("has_effect", &self.effect.is_some())
            .field("result", &self.result)
            .finish()
    }
}

/// A scripted implementation of `CommandExecutor` for testing.
///
/// Only tools named as installed resolve; every execution must match the
/// next expected call in order.
#[derive(Debug)]
pub struct StubExecutor {
    installed: Vec<&'static str>,
    expected: Mutex<VecDeque<ExpectedCall>>,
    seen: Mutex<Vec<CommandRequest>>,
}

impl StubExecutor {
    /// Creates a stub where `installed` tools resolve and `expected` calls
    /// are served in order.
    #[must_use]
    pub fn new(installed: &[&'static str], expected: Vec<ExpectedCall>) -> Self {
        Self {
            installed: installed.to_vec(),
            expected: Mutex::new(expected.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns every request executed so far.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    #[must_use]
    pub fn requests(&self) -> Vec<CommandRequest> {
        self.seen.lock().expect("stub request log").clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.lock().expect("stub expectations");
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} left: {remaining:?}",
            remaining.len()
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn locate(&self, program: &str) -> Result<PathBuf, ExecError> {
        if self.installed.iter().any(|tool| *tool == program) {
            Ok(PathBuf::from("/stub/bin").join(program))
        } else {
            Err(ExecError::NotFound {
                program: program.to_owned(),
            })
        }
    }

    fn execute(&self, request: &CommandRequest) -> Result<Output, ExecError> {
        let call = self
            .expected
            .lock()
            .expect("stub expectations")
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command invocation: {request:?}"));

        assert_eq!(call.program, request.name, "unexpected tool");
        if let Some(args) = &call.args {
            let actual: Vec<String> = request
                .args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            assert_eq!(args, &actual, "unexpected arguments for {}", call.program);
        }
        if let Some(effect) = &call.effect {
            effect(request);
        }
        self.seen
            .lock()
            .expect("stub request log")
            .push(request.clone());

        call.result
    }
}
