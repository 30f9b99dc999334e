//! `retrofix-normalise` entrypoint.
//!
//! Wires the host executor and a stderr logger into [`app::run`] and maps
//! the outcome to an exit code.

use clap::Parser;
use log::Log;
use retrofix_common::{LogSink, StderrLog, level_for_verbosity};
use retrofix_normaliser::app::{self, AppError, RunStatus, Session};
use retrofix_normaliser::cli::Cli;
use retrofix_normaliser::error::error_chain;
use retrofix_normaliser::exec::SystemCommandExecutor;
use std::io::{self, Write};

fn main() {
    let cli = Cli::parse();
    let log = StderrLog::new(level_for_verbosity(cli.verbosity, cli.quiet));
    let session = Session::new(&SystemCommandExecutor, LogSink::new(&log));
    let result = app::run(&cli, &session, &mut io::stdout().lock());
    log.flush();
    let exit_code = exit_code_for_run_result(result, &mut io::stderr());
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn exit_code_for_run_result(result: Result<RunStatus, AppError>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(RunStatus::ToolsMissing) => {
            write_stderr_line(
                stderr,
                "some archives were skipped because a required tool is not installed",
            );
            RunStatus::ToolsMissing.exit_code()
        }
        Ok(status) => status.exit_code(),
        Err(err) => {
            write_stderr_line(stderr, format_args!("error: {}", error_chain(&err)));
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort reporting; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrofix::ConfigError;
    use rstest::rstest;

    #[rstest]
    fn success_exits_zero_silently() {
        let mut stderr = Vec::new();

        let exit_code = exit_code_for_run_result(Ok(RunStatus::Success), &mut stderr);

        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[rstest]
    fn missing_tools_exit_two_with_notice() {
        let mut stderr = Vec::new();

        let exit_code = exit_code_for_run_result(Ok(RunStatus::ToolsMissing), &mut stderr);

        assert_eq!(exit_code, 2);
        let text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(text.contains("not installed"));
    }

    #[rstest]
    fn errors_print_chain_and_exit_one() {
        let mut stderr = Vec::new();
        let err = AppError::Config(ConfigError::MissingDirectory { name: "overlay" });

        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);

        assert_eq!(exit_code, 1);
        let text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert_eq!(text, "error: no overlay directory configured\n");
    }
}
