//! Rebuilds extracted content as a Deflate-only zip and tests zip integrity.
//!
//! Output files are always created exclusively: an existing destination is
//! an error, never overwritten. A failed write removes the partial file so a
//! later pass does not mistake it for a finished repair.

use crate::diagnostic::Diagnostic;
use crate::exec::{ExecError, Runner};
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::CompressionMethod;
use zip::result::ZipError;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Errors raised while writing or testing a zip.
#[derive(Debug, Error)]
pub enum RezipError {
    /// The destination already exists.
    #[error("{} already exists", path.display())]
    Exists {
        /// Destination that was refused.
        path: PathBuf,
    },

    /// A source or destination file could not be read or written.
    #[error("I/O error on {}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The zip encoder failed.
    #[error("cannot write zip {}", path.display())]
    Zip {
        /// Destination being written.
        path: PathBuf,
        /// Underlying encoder failure.
        #[source]
        source: ZipError,
    },

    /// A directory was given where an archive was expected.
    #[error("{} is a directory", path.display())]
    IsDirectory {
        /// Offending path.
        path: PathBuf,
    },

    /// A zero-length file cannot be a valid zip.
    #[error("{} is empty", path.display())]
    EmptyFile {
        /// Offending path.
        path: PathBuf,
    },

    /// `unzip -t` rejected the archive.
    #[error("{} failed integrity test: {diagnostic}", path.display())]
    Verification {
        /// Archive that was tested.
        path: PathBuf,
        /// Decoded exit status.
        diagnostic: Diagnostic,
    },

    /// The test tool could not be run.
    #[error("cannot run archive test")]
    Exec(#[source] ExecError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RezipError + '_ {
    move |source| RezipError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn zip_error(path: &Path) -> impl FnOnce(ZipError) -> RezipError + '_ {
    move |source| RezipError::Zip {
        path: path.to_path_buf(),
        source,
    }
}

fn deflated(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= ZIP64_THRESHOLD)
}

fn create_exclusive(dest: &Path) -> Result<File, RezipError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                RezipError::Exists {
                    path: dest.to_path_buf(),
                }
            } else {
                RezipError::Io {
                    path: dest.to_path_buf(),
                    source,
                }
            }
        })
}

/// Runs `write` against a freshly created `dest`, removing it on failure.
fn write_new<F>(dest: &Path, write: F) -> Result<u64, RezipError>
where
    F: FnOnce(&mut ZipWriter<BufWriter<File>>) -> Result<u64, RezipError>,
{
    let file = create_exclusive(dest)?;
    let outcome = write_zip(file, dest, write);
    if outcome.is_err() {
        // The partial file is ours; a failed cleanup leaves it for the next
        // pass to refuse with `Exists`.
        let _ = fs::remove_file(dest);
    }
    outcome
}

fn write_zip<F>(file: File, dest: &Path, write: F) -> Result<u64, RezipError>
where
    F: FnOnce(&mut ZipWriter<BufWriter<File>>) -> Result<u64, RezipError>,
{
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let written = write(&mut writer)?;
    let mut out = writer.finish().map_err(zip_error(dest))?;
    out.flush().map_err(io_error(dest))?;
    out.get_ref().sync_all().map_err(io_error(dest))?;
    Ok(written)
}

fn add_file<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    src: &Path,
) -> Result<u64, RezipError> {
    let file = File::open(src).map_err(io_error(src))?;
    let size = file.metadata().map_err(io_error(src))?.len();
    writer
        .start_file(name, deflated(size))
        .map_err(zip_error(src))?;
    io::copy(&mut BufReader::new(file), writer).map_err(io_error(src))
}

/// Writes `src` into a new zip at `dest` as a single Deflated entry named
/// after the source file.
///
/// Returns the number of uncompressed bytes written.
///
/// # Errors
///
/// Returns [`RezipError::Exists`] if `dest` exists, and an I/O or zip error
/// if reading or encoding fails. `dest` never survives a failure.
pub fn compress(src: &Path, dest: &Path) -> Result<u64, RezipError> {
    let name = src
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RezipError::IsDirectory {
            path: src.to_path_buf(),
        })?;
    if src.is_dir() {
        return Err(RezipError::IsDirectory {
            path: src.to_path_buf(),
        });
    }
    write_new(dest, |writer| add_file(writer, &name, src))
}

/// Writes every regular file under `root` into a new zip at `dest`.
///
/// Entry names are relative to `root`, use `/` separators, and are added in
/// sorted order so rebuilt archives are reproducible. Symbolic links are not
/// followed.
///
/// Returns the total number of uncompressed bytes written.
///
/// # Errors
///
/// As for [`compress`], plus an I/O error if `root` cannot be walked.
pub fn compress_dir(root: &Path, dest: &Path) -> Result<u64, RezipError> {
    let files = list_files(root).map_err(io_error(root))?;
    write_new(dest, |writer| {
        let mut total = 0;
        for path in &files {
            total += add_file(writer, &entry_name(root, path), path)?;
        }
        Ok(total)
    })
}

/// Lists regular files below `root`, depth first, in sorted order.
///
/// # Errors
///
/// Returns any I/O error raised while reading a directory.
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(root, &mut files)?;
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);
    for entry in entries {
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Integrity tests zips with Info-ZIP `unzip -t`.
#[derive(Clone)]
pub struct ArchiveTester<'a> {
    runner: Runner<'a>,
    program: &'a str,
}

impl<'a> ArchiveTester<'a> {
    /// Creates a tester that runs `program` through `runner`.
    #[must_use]
    pub fn new(runner: Runner<'a>, program: &'a str) -> Self {
        Self { runner, program }
    }

    /// Tests the zip at `path`.
    ///
    /// The tool is resolved before the file is examined, so a missing
    /// `unzip` is always reported as such. Directories and zero-length files
    /// are rejected without running anything.
    ///
    /// Returns the diagnostic on success, which is either
    /// [`Diagnostic::Normal`] or [`Diagnostic::Warning`].
    ///
    /// # Errors
    ///
    /// Returns [`RezipError::Exec`] when the tool cannot be run,
    /// [`RezipError::IsDirectory`] or [`RezipError::EmptyFile`] for
    /// unsuitable inputs, and [`RezipError::Verification`] when the tool
    /// reports any other diagnostic.
    pub fn test(&self, path: &Path) -> Result<Diagnostic, RezipError> {
        self.runner
            .look_cmd(self.program)
            .map_err(RezipError::Exec)?;

        let metadata = fs::metadata(path).map_err(io_error(path))?;
        if metadata.is_dir() {
            return Err(RezipError::IsDirectory {
                path: path.to_path_buf(),
            });
        }
        if metadata.len() == 0 {
            return Err(RezipError::EmptyFile {
                path: path.to_path_buf(),
            });
        }

        let outcome = self
            .runner
            .run_quiet(self.program, &[OsStr::new("-tqq"), path.as_os_str()]);
        match outcome {
            Ok(()) => Ok(Diagnostic::Normal),
            Err(err @ ExecError::Failed { .. }) => {
                let diagnostic = Diagnostic::exit_status(Some(&err));
                if diagnostic.is_pass() {
                    Ok(diagnostic)
                } else {
                    Err(RezipError::Verification {
                        path: path.to_path_buf(),
                        diagnostic,
                    })
                }
            }
            Err(err) => Err(RezipError::Exec(err)),
        }
    }
}

#[cfg(test)]
#[path = "rezip_tests.rs"]
mod tests;
