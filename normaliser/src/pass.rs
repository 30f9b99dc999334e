//! Repair and audit passes over the canonical store.
//!
//! A pass lists the canonical directory once, then feeds every entry through
//! a [`Checker`]. Per-artifact failures are collected in the report and never
//! stop the batch. With more than one worker, entries are claimed from a
//! shared index by scoped threads; the overlay's no-clobber placement keeps
//! concurrent duplicates harmless.

use crate::checker::{Checker, Outcome};
use crate::error::{PassError, RepairError, error_chain};
use crate::exec::{CancelToken, ExecError};
use retrofix_common::LogSink;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// A successfully normalised artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalised {
    /// Artifact UUID.
    pub uuid: String,
    /// Placed overlay file.
    pub path: PathBuf,
    /// Uncompressed bytes written.
    pub bytes: u64,
}

/// Summary of a repair pass.
#[derive(Debug, Default)]
pub struct RepairReport {
    /// Directory entries examined.
    pub examined: usize,
    /// Entries selected for repair.
    pub selected: usize,
    /// Artifacts placed in the overlay.
    pub normalised: Vec<Normalised>,
    /// Artifacts whose archives held no content.
    pub empty: Vec<String>,
    /// Artifacts another worker or an earlier pass placed first.
    pub duplicates: Vec<String>,
    /// Artifacts that failed.
    pub failures: Vec<RepairError>,
    /// Whether cancellation stopped the pass or interrupted a candidate.
    pub cancelled: bool,
}

impl RepairReport {
    /// Returns true when any failure was caused by a missing tool.
    #[must_use]
    pub fn tools_missing(&self) -> bool {
        self.failures.iter().any(RepairError::is_tool_missing)
    }

    /// Returns true when nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, uuid: String, result: Result<Outcome, RepairError>) {
        match result {
            Ok(Outcome::Normalised { path, bytes }) => {
                self.normalised.push(Normalised { uuid, path, bytes });
            }
            Ok(Outcome::Empty) => self.empty.push(uuid),
            Ok(Outcome::AlreadyNormalised) => self.duplicates.push(uuid),
            Err(err) => self.failures.push(err),
        }
    }

    fn sort(&mut self) {
        self.normalised.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        self.empty.sort();
        self.duplicates.sort();
        self.failures.sort_by(|a, b| a.uuid().cmp(b.uuid()));
    }
}

/// An archive that failed its integrity test, or could not be tested.
#[derive(Debug)]
pub enum AuditFinding {
    /// The family's test tool reported damage.
    Damaged {
        /// Artifact UUID.
        uuid: String,
        /// Archive that was tested.
        path: PathBuf,
    },
    /// The test tool could not be run.
    Untested {
        /// Artifact UUID.
        uuid: String,
        /// Why the tool could not be run.
        error: ExecError,
    },
}

/// Summary of an audit pass.
#[derive(Debug, Default)]
pub struct AuditReport {
    /// Candidates tested.
    pub tested: usize,
    /// Damaged or untestable candidates.
    pub findings: Vec<AuditFinding>,
    /// Whether cancellation stopped the pass or interrupted a test.
    pub cancelled: bool,
}

impl AuditReport {
    /// Returns true when any candidate could not be tested for lack of a
    /// tool.
    #[must_use]
    pub fn tools_missing(&self) -> bool {
        self.findings.iter().any(|finding| {
            matches!(finding, AuditFinding::Untested { error, .. } if error.is_not_found())
        })
    }
}

/// Lists the canonical directory in name order.
fn list_canonical(dir: &Path) -> Result<Vec<PathBuf>, PassError> {
    let read_err = |source| PassError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(read_err)?
        .map(|entry| Ok(entry?.path()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(read_err)?;
    paths.sort();
    Ok(paths)
}

/// Runs `visit` over `paths` with up to `workers` threads, stopping early
/// when `cancel` is set. Returns true if cancellation cut the run short.
fn for_each_path<F>(paths: &[PathBuf], workers: usize, cancel: &CancelToken, visit: F) -> bool
where
    F: Fn(&Path) + Sync,
{
    let next = AtomicUsize::new(0);
    let claim = || loop {
        if cancel.is_cancelled() {
            return;
        }
        let index = next.fetch_add(1, Ordering::Relaxed);
        let Some(path) = paths.get(index) else {
            return;
        };
        visit(path);
    };

    let workers = workers.clamp(1, paths.len().max(1));
    if workers == 1 {
        claim();
    } else {
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(claim);
            }
        });
    }
    cancel.is_cancelled() && next.load(Ordering::Relaxed) < paths.len()
}

/// Normalises every repair candidate in the checker's canonical directory.
///
/// # Errors
///
/// Returns [`PassError`] only when the pass cannot start: the canonical
/// directory cannot be listed or the overlay is missing. Everything after
/// that is recorded in the report.
pub fn repair(
    checker: &Checker<'_>,
    workers: usize,
    cancel: &CancelToken,
    log: LogSink<'_>,
) -> Result<RepairReport, PassError> {
    let log = log.with_target("retrofix::pass");
    let dirs = checker.dirs();
    if !dirs.overlay.is_dir() {
        return Err(PassError::Overlay {
            path: dirs.overlay.clone(),
        });
    }
    let paths = list_canonical(&dirs.canonical)?;
    let report = Mutex::new(RepairReport {
        examined: paths.len(),
        ..RepairReport::default()
    });

    let cancelled = for_each_path(&paths, workers, cancel, |path| {
        let Some(uuid) = checker.check(path) else {
            return;
        };
        let result = checker.compress(path, &uuid, cancel);
        if let Err(err) = &result {
            log.error(format_args!("{}", error_chain(err)));
        }
        // A poisoned lock means another worker panicked; its entry is lost
        // but the rest of the report is intact.
        let mut report = report.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        report.selected += 1;
        report.record(uuid, result);
    });

    let mut report = report
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    report.cancelled = cancelled
        || report
            .failures
            .iter()
            .any(|err| matches!(err, RepairError::Cancelled { .. }));
    report.sort();
    log.info(format_args!(
        "{}: {} examined, {} normalised, {} empty, {} failed",
        checker.family().name,
        report.examined,
        report.normalised.len(),
        report.empty.len(),
        report.failures.len()
    ));
    if report.cancelled {
        log.warn(format_args!("pass cancelled before every candidate was finished"));
    }
    Ok(report)
}

/// Integrity-tests every candidate of the checker's family without
/// modifying anything.
///
/// # Errors
///
/// Returns [`PassError::ReadDir`] when the canonical directory cannot be
/// listed.
pub fn audit(
    checker: &Checker<'_>,
    workers: usize,
    cancel: &CancelToken,
    log: LogSink<'_>,
) -> Result<AuditReport, PassError> {
    let log = log.with_target("retrofix::pass");
    let paths = list_canonical(&checker.dirs().canonical)?;
    let report = Mutex::new(AuditReport::default());

    let cancelled = for_each_path(&paths, workers, cancel, |path| {
        let Some(uuid) = checker.identify(path) else {
            return;
        };
        let finding = match checker.invalid(path) {
            Ok(false) => None,
            Ok(true) => Some(AuditFinding::Damaged {
                uuid,
                path: path.to_path_buf(),
            }),
            Err(error) => {
                log.error(format_args!("{uuid}: {error}"));
                Some(AuditFinding::Untested { uuid, error })
            }
        };
        let mut report = report.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        report.tested += 1;
        report.findings.extend(finding);
    });

    let mut report = report
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    report.cancelled = cancelled
        || report.findings.iter().any(|finding| {
            matches!(
                finding,
                AuditFinding::Untested {
                    error: ExecError::Cancelled { .. },
                    ..
                }
            )
        });
    report.findings.sort_by(|a, b| finding_uuid(a).cmp(finding_uuid(b)));
    log.info(format_args!(
        "{}: {} tested, {} findings",
        checker.family().name,
        report.tested,
        report.findings.len()
    ));
    Ok(report)
}

fn finding_uuid(finding: &AuditFinding) -> &str {
    match finding {
        AuditFinding::Damaged { uuid, .. } | AuditFinding::Untested { uuid, .. } => uuid,
    }
}
