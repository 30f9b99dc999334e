//! Per-family repair checks and the extract, rebuild and place workflow.
//!
//! A [`Checker`] is the generic implementation behind every family. The
//! family descriptor supplies the differences (extensions, introspection,
//! tools); the checker supplies the shared decision order:
//!
//! 1. skip directories and foreign extensions;
//! 2. skip anything that is not a canonical UUID in the candidate set;
//! 3. skip artifacts the overlay already holds;
//! 4. let the family's introspection decide.
//!
//! Only [`Checker::compress`] writes anything, and it writes only the
//! overlay. The canonical store is treated as read-only throughout.

use crate::artifact::{CandidateSet, IdForm, classify_id};
use crate::error::{RepairError, detail_suffix};
use crate::exec::{CancelToken, ExecError, Runner};
use crate::family::{Family, Verdict};
use crate::place;
use crate::rezip::{self, ArchiveTester};
use retrofix::ToolNames;
use retrofix_common::LogSink;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The two stores a pass reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    /// Read-only store of originals named `<uuid>[.<ext>]`.
    pub canonical: PathBuf,
    /// Read-write store of normalised `<uuid>.zip` files.
    pub overlay: PathBuf,
}

/// Everything a [`Checker`] needs, grouped so the constructor stays small.
pub struct CheckerParts<'a> {
    /// Family descriptor.
    pub family: &'static Family,
    /// Artifacts eligible for repair.
    pub candidates: &'a CandidateSet,
    /// Canonical and overlay locations.
    pub dirs: &'a Directories,
    /// Process runner for the family's tools.
    pub runner: Runner<'a>,
    /// Executable names.
    pub tools: &'a ToolNames,
    /// Destination for diagnostics.
    pub log: LogSink<'a>,
    /// Whether rebuilt zips are tested before placement.
    pub verify_output: bool,
}

/// What [`Checker::compress`] did with a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A rebuilt zip was placed in the overlay.
    Normalised {
        /// Where it was placed.
        path: PathBuf,
        /// Uncompressed bytes written.
        bytes: u64,
    },
    /// The archive held no file content; nothing was placed.
    Empty,
    /// The overlay already held this artifact, possibly placed by a
    /// concurrent worker; the rebuilt copy was discarded.
    AlreadyNormalised,
}

/// Generic repair checker parameterised by a [`Family`].
pub struct Checker<'a> {
    family: &'static Family,
    candidates: &'a CandidateSet,
    dirs: &'a Directories,
    runner: Runner<'a>,
    tools: &'a ToolNames,
    log: LogSink<'a>,
    verify_output: bool,
}

impl<'a> Checker<'a> {
    /// Creates a checker from its parts.
    #[must_use]
    pub fn new(parts: CheckerParts<'a>) -> Self {
        Self {
            family: parts.family,
            candidates: parts.candidates,
            dirs: parts.dirs,
            runner: parts.runner,
            tools: parts.tools,
            log: parts.log.with_target("retrofix::checker"),
            verify_output: parts.verify_output,
        }
    }

    /// Returns the family this checker handles.
    #[must_use]
    pub fn family(&self) -> &'static Family {
        self.family
    }

    /// Returns the configured directories.
    #[must_use]
    pub fn dirs(&self) -> &Directories {
        self.dirs
    }

    /// Returns the overlay location for `uuid`.
    #[must_use]
    pub fn overlay_path(&self, uuid: &str) -> PathBuf {
        self.dirs.overlay.join(format!("{uuid}.zip"))
    }

    /// Returns true when the overlay already holds a file (not a directory)
    /// for `uuid`.
    #[must_use]
    pub fn is_normalised(&self, uuid: &str) -> bool {
        fs::metadata(self.overlay_path(uuid)).is_ok_and(|meta| !meta.is_dir())
    }

    /// Applies the name-based filters and returns the candidate's UUID.
    ///
    /// Directories, foreign extensions, names that are not canonical UUIDs,
    /// and UUIDs outside the candidate set yield `None`.
    #[must_use]
    pub fn identify(&self, path: &Path) -> Option<String> {
        if path.is_dir() || !self.family.accepts(path) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        match classify_id(stem) {
            IdForm::Canonical => {}
            IdForm::Legacy => {
                self.log
                    .debug(format_args!("{stem}: legacy identifier, not repaired"));
                return None;
            }
            IdForm::Invalid => {
                self.log.debug(format_args!(
                    "{}: not an artifact identifier",
                    path.display()
                ));
                return None;
            }
        }
        if !self.candidates.contains(stem) {
            self.log.debug(format_args!("{stem}: not a repair candidate"));
            return None;
        }
        Some(stem.to_owned())
    }

    /// Decides whether `path` is an archive this family should rebuild.
    ///
    /// Returns the artifact UUID when it should, `None` when it should be
    /// skipped. Unreadable archives are logged as warnings and skipped; no
    /// condition here is fatal.
    #[must_use]
    pub fn check(&self, path: &Path) -> Option<String> {
        let uuid = self.identify(path)?;
        if self.is_normalised(&uuid) {
            self.log.debug(format_args!("{uuid}: already normalised"));
            return None;
        }
        match self.family.introspection.inspect(path) {
            Verdict::NeedsRepair => Some(uuid),
            Verdict::Modern => {
                self.log
                    .debug(format_args!("{uuid}: already readable by modern tools"));
                None
            }
            Verdict::Unreadable(reason) => {
                self.log.warn(format_args!(
                    "{uuid}: skipping unreadable {} archive: {reason}",
                    self.family.name
                ));
                None
            }
        }
    }

    /// Integrity-tests `path` with the family's test tool.
    ///
    /// Returns `Ok(true)` when the tool reports damage (a failing exit, a
    /// timeout, or a missing success marker) and `Ok(false)` when it passes.
    ///
    /// # Errors
    ///
    /// Returns the [`ExecError`] when the tool cannot be run at all, most
    /// notably [`ExecError::NotFound`]; a missing tool is never reported as
    /// a damaged archive.
    pub fn invalid(&self, path: &Path) -> Result<bool, ExecError> {
        let test = &self.family.test;
        let program = test.tool.executable(self.tools);
        let args = test.render(path, path);
        let outcome = match self.family.test_marker {
            Some(marker) => self
                .runner
                .run_out(program, &args)
                .map(|stdout| stdout.contains(marker)),
            None => self.runner.run_quiet(program, &args).map(|()| true),
        };
        match outcome {
            Ok(passed) => {
                if !passed {
                    self.log.info(format_args!(
                        "{}: {program} did not confirm the archive",
                        path.display()
                    ));
                }
                Ok(!passed)
            }
            Err(err @ (ExecError::Failed { .. } | ExecError::TimedOut { .. })) => {
                let detail = self.family.status.describe(Some(&err));
                self.log.info(format_args!(
                    "{}: {err}{}",
                    path.display(),
                    detail_suffix(detail)
                ));
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Rebuilds the candidate at `source` as a Deflate-only zip and places
    /// it in the overlay as `<uuid>.zip`.
    ///
    /// All intermediate files live in a private work directory that is
    /// removed on every exit path. An archive with no file content yields
    /// [`Outcome::Empty`] and places nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`RepairError`] naming `uuid` for missing tools, failed
    /// extraction, a failed rebuild or verification, a failed placement, or
    /// cancellation.
    pub fn compress(
        &self,
        source: &Path,
        uuid: &str,
        cancel: &CancelToken,
    ) -> Result<Outcome, RepairError> {
        let io_err = |action: &'static str| {
            move |source: io::Error| RepairError::Io {
                uuid: uuid.to_owned(),
                action,
                source,
            }
        };
        let rezip_err = |source| RepairError::Rezip {
            uuid: uuid.to_owned(),
            source,
        };

        ensure_live(uuid, cancel)?;
        let runner = self.runner.with_cancel(cancel);
        // Tools run inside the extraction directory, so the source must not
        // be relative to the caller's working directory.
        let source = fs::canonicalize(source).map_err(io_err("resolve source archive"))?;
        let work = tempfile::Builder::new()
            .prefix("retrofix-")
            .tempdir()
            .map_err(io_err("create work directory"))?;
        let extract_dir = work.path().join("extract");
        fs::create_dir(&extract_dir).map_err(io_err("create extraction directory"))?;

        self.extract(uuid, &source, &extract_dir, &runner)?;
        ensure_live(uuid, cancel)?;

        let files = rezip::list_files(&extract_dir).map_err(io_err("list extracted files"))?;
        if files.is_empty() {
            self.log
                .info(format_args!("{uuid}: archive holds no files, nothing to place"));
            return Ok(Outcome::Empty);
        }

        let staged = work.path().join(format!("{uuid}.zip"));
        let bytes = rezip::compress_dir(&extract_dir, &staged).map_err(rezip_err)?;
        if bytes == 0 {
            self.log
                .info(format_args!("{uuid}: archive holds no content, nothing to place"));
            return Ok(Outcome::Empty);
        }
        ensure_live(uuid, cancel)?;

        if self.verify_output {
            ArchiveTester::new(runner.clone(), &self.tools.unzip)
                .test(&staged)
                .map_err(rezip_err)?;
        }

        let dest = self.overlay_path(uuid);
        if self.is_normalised(uuid) {
            self.log
                .debug(format_args!("{uuid}: placed by another worker, discarding"));
            return Ok(Outcome::AlreadyNormalised);
        }
        match place::place_noclobber(&staged, &dest) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                self.log
                    .debug(format_args!("{uuid}: placed by another worker, discarding"));
                return Ok(Outcome::AlreadyNormalised);
            }
            Err(source) => {
                return Err(RepairError::Place {
                    uuid: uuid.to_owned(),
                    path: dest,
                    source,
                });
            }
        }

        self.log.info(format_args!(
            "{uuid}: normalised {} into {} ({bytes} bytes)",
            self.family.name,
            dest.display()
        ));
        Ok(Outcome::Normalised { path: dest, bytes })
    }

    /// Tries each installed extractor in turn until one succeeds.
    fn extract(
        &self,
        uuid: &str,
        source: &Path,
        dest: &Path,
        runner: &Runner<'_>,
    ) -> Result<(), RepairError> {
        let mut tried = Vec::new();
        let mut first_failure: Option<(ExecError, &'static str)> = None;
        let mut attempted = false;

        for (index, invocation) in self.family.extractors.iter().enumerate() {
            let program = invocation.tool.executable(self.tools);
            tried.push(program);
            if runner.look_cmd(program).is_err() {
                self.log
                    .debug(format_args!("{uuid}: {program} is not installed"));
                continue;
            }
            if attempted {
                clear_dir(dest).map_err(|source| RepairError::Io {
                    uuid: uuid.to_owned(),
                    action: "reset extraction directory",
                    source,
                })?;
            }
            attempted = true;

            match runner.run_wd(program, dest, &invocation.render(source, dest)) {
                Ok(()) => return Ok(()),
                Err(ExecError::Cancelled { .. }) => {
                    return Err(RepairError::Cancelled {
                        uuid: uuid.to_owned(),
                    });
                }
                Err(err) => {
                    // Status tables belong to the family's own tool, not to
                    // general-purpose fallbacks.
                    let detail = if index == 0 {
                        self.family.status.describe(Some(&err))
                    } else {
                        ""
                    };
                    self.log
                        .debug(format_args!("{uuid}: {err}{}", detail_suffix(detail)));
                    if first_failure.is_none() {
                        first_failure = Some((err, detail));
                    }
                }
            }
        }

        Err(match first_failure {
            Some((source, detail)) => RepairError::Extract {
                uuid: uuid.to_owned(),
                detail,
                source,
            },
            None => RepairError::ToolNotFound {
                uuid: uuid.to_owned(),
                family: self.family.kind,
                tried: tried.join(", "),
            },
        })
    }
}

fn ensure_live(uuid: &str, cancel: &CancelToken) -> Result<(), RepairError> {
    if cancel.is_cancelled() {
        return Err(RepairError::Cancelled {
            uuid: uuid.to_owned(),
        });
    }
    Ok(())
}

fn clear_dir(dir: &Path) -> io::Result<()> {
    fs::remove_dir_all(dir)?;
    fs::create_dir(dir)
}

#[cfg(test)]
#[path = "checker_tests.rs"]
mod tests;
