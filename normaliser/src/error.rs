//! Error types for repair and audit passes.
//!
//! Module-level failures ([`crate::exec::ExecError`],
//! [`crate::method::ClassifyError`], [`crate::rezip::RezipError`]) stay close
//! to the code that raises them. [`RepairError`] wraps them with the artifact
//! UUID so a pass can report every failure without aborting the batch.

use crate::exec::ExecError;
use crate::family::FamilyKind;
use crate::rezip::RezipError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A failure while normalising one artifact.
#[derive(Debug, Error)]
pub enum RepairError {
    /// None of the family's extraction tools is installed.
    #[error("{uuid}: no {family} extractor installed (tried {tried})")]
    ToolNotFound {
        /// Artifact being repaired.
        uuid: String,
        /// Family whose tools were tried.
        family: FamilyKind,
        /// Comma-separated executables that were looked up.
        tried: String,
    },

    /// Every installed extractor failed.
    #[error("{uuid}: extraction failed{}", detail_suffix(.detail))]
    Extract {
        /// Artifact being repaired.
        uuid: String,
        /// Tool-specific reading of the exit status, possibly empty.
        detail: &'static str,
        /// Failure from the last extractor tried.
        #[source]
        source: ExecError,
    },

    /// The rebuilt zip could not be written or failed verification.
    #[error("{uuid}: repackaging failed")]
    Rezip {
        /// Artifact being repaired.
        uuid: String,
        /// Underlying re-zipper failure.
        #[source]
        source: RezipError,
    },

    /// Work-area bookkeeping failed.
    #[error("{uuid}: cannot {action}")]
    Io {
        /// Artifact being repaired.
        uuid: String,
        /// What was being attempted.
        action: &'static str,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The rebuilt zip could not be moved into the overlay.
    #[error("{uuid}: cannot place {}", path.display())]
    Place {
        /// Artifact being repaired.
        uuid: String,
        /// Destination in the overlay.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The pass was cancelled while this artifact was in progress.
    #[error("{uuid}: cancelled")]
    Cancelled {
        /// Artifact being repaired.
        uuid: String,
    },
}

/// Formats a status-table description as a parenthesised suffix, or nothing
/// when the table had no entry.
pub(crate) fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(" ({detail})")
    }
}

impl RepairError {
    /// Returns the UUID of the artifact that failed.
    #[must_use]
    pub fn uuid(&self) -> &str {
        match self {
            Self::ToolNotFound { uuid, .. }
            | Self::Extract { uuid, .. }
            | Self::Rezip { uuid, .. }
            | Self::Io { uuid, .. }
            | Self::Place { uuid, .. }
            | Self::Cancelled { uuid } => uuid,
        }
    }

    /// Returns true when the failure was caused by a missing executable.
    ///
    /// Missing tools affect every candidate of a family, so callers surface
    /// them prominently rather than folding them into per-file noise.
    #[must_use]
    pub fn is_tool_missing(&self) -> bool {
        match self {
            Self::ToolNotFound { .. } => true,
            Self::Rezip {
                source: RezipError::Exec(err),
                ..
            } => err.is_not_found(),
            _ => false,
        }
    }
}

/// A failure that stops a whole pass before any candidate is processed.
#[derive(Debug, Error)]
pub enum PassError {
    /// The canonical directory could not be listed.
    #[error("cannot read canonical directory {}", path.display())]
    ReadDir {
        /// Directory that was being listed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The overlay directory does not exist or is not a directory.
    #[error("overlay {} is not a directory", path.display())]
    Overlay {
        /// Configured overlay path.
        path: PathBuf,
    },
}

/// Renders an error and its sources on one line, separated by `": "`.
#[must_use]
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

    #[rstest]
    fn extract_error_includes_tool_detail() {
        let err = RepairError::Extract {
            uuid: ID.to_owned(),
            detail: "CRC error",
            source: ExecError::Failed {
                program: "arj".to_owned(),
                code: Some(3),
                stderr: String::new(),
            },
        };

        assert_eq!(err.to_string(), format!("{ID}: extraction failed (CRC error)"));
        assert_eq!(err.uuid(), ID);
        assert!(!err.is_tool_missing());
    }

    #[rstest]
    fn chain_walks_sources() {
        let err = RepairError::Extract {
            uuid: ID.to_owned(),
            detail: "",
            source: ExecError::Failed {
                program: "lha".to_owned(),
                code: Some(1),
                stderr: String::new(),
            },
        };

        assert_eq!(
            error_chain(&err),
            format!("{ID}: extraction failed: lha failed: exit status 1")
        );
    }

    #[rstest]
    #[case::extractor(RepairError::ToolNotFound {
        uuid: ID.to_owned(),
        family: FamilyKind::Arj,
        tried: "arj, 7z".to_owned(),
    }, true)]
    #[case::verifier(RepairError::Rezip {
        uuid: ID.to_owned(),
        source: RezipError::Exec(ExecError::NotFound { program: "unzip".to_owned() }),
    }, true)]
    #[case::cancelled(RepairError::Cancelled { uuid: ID.to_owned() }, false)]
    fn tool_missing_is_detected(#[case] err: RepairError, #[case] expected: bool) {
        assert_eq!(err.is_tool_missing(), expected);
    }
}
