//! Command orchestration for the `retrofix-normalise` binary.
//!
//! [`run`] turns parsed arguments into passes and writes a plain-text report
//! to the supplied writer. The host is reached only through the
//! [`Session`], so the whole flow can be exercised with a stub executor and
//! an in-memory log.

use crate::artifact::{ArtifactError, CandidateFile, CandidateSource};
use crate::checker::{Checker, CheckerParts, Directories};
use crate::cli::{ArchiveArgs, Cli, Command, PassArgs};
use crate::error::{PassError, error_chain};
use crate::exec::{CancelToken, CommandExecutor, Runner};
use crate::family::FamilyKind;
use crate::method::{self, ClassifyError};
use crate::pass::{self, AuditFinding, AuditReport, RepairReport};
use crate::rezip::{ArchiveTester, RezipError};
use camino::Utf8PathBuf;
use retrofix::{ConfigError, RepairConfig};
use retrofix_common::LogSink;
use std::io::{self, Write};
use thiserror::Error;

/// Failures that stop a command before it can report.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The candidate list could not be read.
    #[error(transparent)]
    Candidates(#[from] ArtifactError),

    /// A pass could not start.
    #[error(transparent)]
    Pass(#[from] PassError),

    /// The archive given to `methods` is not a readable zip.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The archive given to `test` failed or could not be tested.
    #[error(transparent)]
    Test(#[from] RezipError),

    /// The report could not be written.
    #[error("cannot write report")]
    Output(#[from] io::Error),
}

/// How a command that ran to completion should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Everything that could be attempted was attempted.
    Success,
    /// At least one archive was left alone because a tool is not installed.
    ToolsMissing,
}

impl RunStatus {
    /// Returns the process exit code for this status.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ToolsMissing => 2,
        }
    }

    fn merge(self, other: Self) -> Self {
        if other == Self::ToolsMissing {
            other
        } else {
            self
        }
    }
}

/// Host capabilities shared by every command.
pub struct Session<'a> {
    executor: &'a (dyn CommandExecutor + Sync),
    log: LogSink<'a>,
    cancel: CancelToken,
}

impl<'a> Session<'a> {
    /// Creates a session over `executor` that logs to `log`.
    #[must_use]
    pub fn new(executor: &'a (dyn CommandExecutor + Sync), log: LogSink<'a>) -> Self {
        Self {
            executor,
            log,
            cancel: CancelToken::new(),
        }
    }

    /// Uses `cancel` to stop passes early.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn runner(&self, config: &RepairConfig) -> Runner<'a> {
        Runner::new(self.executor, self.log)
            .with_timeout(config.tool_timeout())
            .with_cancel(&self.cancel)
    }
}

/// Executes the parsed command, writing its report to `out`.
///
/// # Errors
///
/// Returns [`AppError`] when configuration, the candidate list or the
/// canonical store cannot be read, when a single-archive command fails, or
/// when the report cannot be written. Per-archive failures inside a pass are
/// reported, not returned.
pub fn run(cli: &Cli, session: &Session<'_>, out: &mut dyn Write) -> Result<RunStatus, AppError> {
    let config_path = RepairConfig::resolve_path(cli.config.as_deref());
    match &cli.command {
        Command::Repair(args) => {
            let (config, dirs) = pass_config(RepairConfig::load(&config_path)?, args)?;
            let source = CandidateFile::new(args.candidates.as_std_path());
            repair_families(&config, &dirs, &args.families(), &source, session, out)
        }
        Command::Audit(args) => {
            let (config, dirs) = pass_config(RepairConfig::load(&config_path)?, args)?;
            let source = CandidateFile::new(args.candidates.as_std_path());
            audit_families(&config, &dirs, &args.families(), &source, session, out)
        }
        Command::Methods(args) => print_methods(args, out),
        Command::Test(args) => test_archive(&RepairConfig::load(&config_path)?, args, session, out),
    }
}

/// Merges command-line overrides and resolves the two stores.
fn pass_config(
    config: RepairConfig,
    args: &PassArgs,
) -> Result<(RepairConfig, Directories), ConfigError> {
    let config = config.with_overrides(args.canonical.clone(), args.overlay.clone(), args.workers);
    config.validate()?;
    let dir = |value: &Option<Utf8PathBuf>, name| {
        value
            .clone()
            .map(Utf8PathBuf::into_std_path_buf)
            .ok_or(ConfigError::MissingDirectory { name })
    };
    let dirs = Directories {
        canonical: dir(&config.canonical_dir, "canonical")?,
        overlay: dir(&config.overlay_dir, "overlay")?,
    };
    Ok((config, dirs))
}

fn repair_families(
    config: &RepairConfig,
    dirs: &Directories,
    families: &[FamilyKind],
    source: &dyn CandidateSource,
    session: &Session<'_>,
    out: &mut dyn Write,
) -> Result<RunStatus, AppError> {
    let mut status = RunStatus::Success;
    for &kind in families {
        if session.cancel.is_cancelled() {
            break;
        }
        let candidates = source.candidates(kind)?;
        let checker = Checker::new(CheckerParts {
            family: kind.family(),
            candidates: &candidates,
            dirs,
            runner: session.runner(config),
            tools: &config.tools,
            log: session.log,
            verify_output: config.verify_output,
        });
        let report = pass::repair(&checker, config.workers, &session.cancel, session.log)?;
        write_repair_report(out, kind, &report)?;
        if report.tools_missing() {
            status = status.merge(RunStatus::ToolsMissing);
        }
    }
    Ok(status)
}

fn audit_families(
    config: &RepairConfig,
    dirs: &Directories,
    families: &[FamilyKind],
    source: &dyn CandidateSource,
    session: &Session<'_>,
    out: &mut dyn Write,
) -> Result<RunStatus, AppError> {
    let mut status = RunStatus::Success;
    for &kind in families {
        if session.cancel.is_cancelled() {
            break;
        }
        let candidates = source.candidates(kind)?;
        let checker = Checker::new(CheckerParts {
            family: kind.family(),
            candidates: &candidates,
            dirs,
            runner: session.runner(config),
            tools: &config.tools,
            log: session.log,
            verify_output: config.verify_output,
        });
        let report = pass::audit(&checker, config.workers, &session.cancel, session.log)?;
        write_audit_report(out, kind, &report)?;
        if report.tools_missing() {
            status = status.merge(RunStatus::ToolsMissing);
        }
    }
    Ok(status)
}

fn write_repair_report(
    out: &mut dyn Write,
    kind: FamilyKind,
    report: &RepairReport,
) -> io::Result<()> {
    writeln!(
        out,
        "{kind}: {} examined, {} selected, {} normalised, {} empty, {} already normalised, {} failed",
        report.examined,
        report.selected,
        report.normalised.len(),
        report.empty.len(),
        report.duplicates.len(),
        report.failures.len()
    )?;
    for normalised in &report.normalised {
        writeln!(
            out,
            "  normalised {} ({} bytes)",
            normalised.uuid, normalised.bytes
        )?;
    }
    for uuid in &report.empty {
        writeln!(out, "  empty {uuid}")?;
    }
    for failure in &report.failures {
        writeln!(out, "  failed {}", error_chain(failure))?;
    }
    if report.cancelled {
        writeln!(out, "  cancelled")?;
    }
    Ok(())
}

fn write_audit_report(out: &mut dyn Write, kind: FamilyKind, report: &AuditReport) -> io::Result<()> {
    writeln!(
        out,
        "{kind}: {} tested, {} flagged",
        report.tested,
        report.findings.len()
    )?;
    for finding in &report.findings {
        match finding {
            AuditFinding::Damaged { uuid, .. } => writeln!(out, "  damaged {uuid}")?,
            AuditFinding::Untested { uuid, error } => writeln!(out, "  untested {uuid}: {error}")?,
        }
    }
    if report.cancelled {
        writeln!(out, "  cancelled")?;
    }
    Ok(())
}

fn print_methods(args: &ArchiveArgs, out: &mut dyn Write) -> Result<RunStatus, AppError> {
    let methods = method::methods(args.path.as_std_path())?;
    for method in &methods {
        writeln!(out, "{:>3} {method}", method.code())?;
    }
    let modern = methods.iter().all(|method| method.is_modern());
    writeln!(out, "modern: {}", if modern { "yes" } else { "no" })?;
    Ok(RunStatus::Success)
}

fn test_archive(
    config: &RepairConfig,
    args: &ArchiveArgs,
    session: &Session<'_>,
    out: &mut dyn Write,
) -> Result<RunStatus, AppError> {
    let tester = ArchiveTester::new(session.runner(config), &config.tools.unzip);
    let diagnostic = tester.test(args.path.as_std_path())?;
    writeln!(out, "{}: {diagnostic}", args.path)?;
    Ok(RunStatus::Success)
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
