//! Artifact identity and repair candidate sets.
//!
//! Canonical archives are named by their artifact's UUID, optionally with a
//! format extension. The metadata store decides which artifacts are in scope
//! for a family; the normaliser only sees the resulting sorted set of UUIDs.

use crate::family::FamilyKind;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Length of a hyphenated UUID.
pub const UUID_LEN: usize = 36;

/// Length of the historical identifier form that lost one hyphen.
pub const LEGACY_UUID_LEN: usize = 35;

/// How a file stem relates to artifact identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdForm {
    /// A 36-character hyphenated UUID.
    Canonical,
    /// A 35-character identifier missing one hyphen. Accepted as a name but
    /// never repaired.
    Legacy,
    /// Anything else.
    Invalid,
}

/// Classifies a file stem as a canonical, legacy or invalid identifier.
///
/// # Examples
///
/// ```
/// use retrofix_normaliser::artifact::{IdForm, classify_id};
///
/// assert_eq!(classify_id("0b7e44c1-5c1b-4a53-9a54-4d6e4b0c2f11"), IdForm::Canonical);
/// assert_eq!(classify_id("0b7e44c1-5c1b-4a53-9a544d6e4b0c2f11"), IdForm::Legacy);
/// assert_eq!(classify_id("readme"), IdForm::Invalid);
/// ```
#[must_use]
pub fn classify_id(stem: &str) -> IdForm {
    match stem.len() {
        UUID_LEN if Uuid::try_parse(stem).is_ok() => IdForm::Canonical,
        LEGACY_UUID_LEN if is_legacy(stem) => IdForm::Legacy,
        _ => IdForm::Invalid,
    }
}

fn is_legacy(stem: &str) -> bool {
    let hyphens = stem.bytes().filter(|b| *b == b'-').count();
    hyphens == 3
        && !stem.starts_with('-')
        && !stem.ends_with('-')
        && stem.bytes().all(|b| b == b'-' || b.is_ascii_hexdigit())
}

/// Errors raised while building or loading a candidate set.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The candidate list could not be read.
    #[error("cannot read candidate list {}", path.display())]
    Read {
        /// List that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A pre-sorted list was out of order.
    #[error("candidate list is not sorted at entry {index}")]
    Unsorted {
        /// Index of the first entry smaller than its predecessor.
        index: usize,
    },
}

/// Sorted, de-duplicated set of artifact UUIDs eligible for repair.
///
/// Membership is a binary search, so the ordering is established once at
/// construction and never re-checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet(Vec<String>);

impl CandidateSet {
    /// Builds a set from UUIDs in any order.
    #[must_use]
    pub fn from_unsorted<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    /// Adopts a list the metadata store already returned in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Unsorted`] if any entry is smaller than the
    /// one before it.
    pub fn from_sorted(mut ids: Vec<String>) -> Result<Self, ArtifactError> {
        if let Some(index) = ids.windows(2).position(|pair| pair[0] > pair[1]) {
            return Err(ArtifactError::Unsorted { index: index + 1 });
        }
        ids.dedup();
        Ok(Self(ids))
    }

    /// Returns true when `id` is in the set.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.binary_search_by(|probe| probe.as_str().cmp(id)).is_ok()
    }

    /// Returns the number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the candidates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Source of repair candidates for a family.
#[cfg_attr(test, mockall::automock)]
pub trait CandidateSource {
    /// Returns the artifacts of `family` that are eligible for repair.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the source cannot be read.
    fn candidates(&self, family: FamilyKind) -> Result<CandidateSet, ArtifactError>;
}

/// Candidate list stored as a text file with one UUID per line.
///
/// Blank lines and lines starting with `#` are ignored. The same list serves
/// every family; the extension filter decides which files it applies to.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    path: PathBuf,
}

impl CandidateFile {
    /// Creates a source reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the list's location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CandidateSource for CandidateFile {
    fn candidates(&self, _family: FamilyKind) -> Result<CandidateSet, ArtifactError> {
        let text = fs::read_to_string(&self.path).map_err(|source| ArtifactError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(parse_candidates(&text))
    }
}

/// Parses a candidate list body.
#[must_use]
pub fn parse_candidates(text: &str) -> CandidateSet {
    CandidateSet::from_unsorted(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
}
