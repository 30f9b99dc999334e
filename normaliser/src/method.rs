//! Zip compression-method classification.
//!
//! Zip archives written by early DOS tools use methods (Shrink, Reduce,
//! Implode) that modern extractors and browsers cannot decode. The
//! classifier reads the central directory, collects the method codes in use,
//! and reports whether every entry is Stored or Deflated.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

/// A zip compression-method code as declared by an entry header.
///
/// Unassigned codes are representable and display as `Reserved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Method(u16);

impl Method {
    /// No compression.
    pub const STORED: Self = Self(0);
    /// LZW shrinking.
    pub const SHRUNK: Self = Self(1);
    /// Reduction with compression factor 1.
    pub const REDUCED_1: Self = Self(2);
    /// Reduction with compression factor 2.
    pub const REDUCED_2: Self = Self(3);
    /// Reduction with compression factor 3.
    pub const REDUCED_3: Self = Self(4);
    /// Reduction with compression factor 4.
    pub const REDUCED_4: Self = Self(5);
    /// Shannon-Fano implosion.
    pub const IMPLODED: Self = Self(6);
    /// Reserved for tokenizing compression.
    pub const TOKENIZING: Self = Self(7);
    /// Deflate.
    pub const DEFLATED: Self = Self(8);
    /// Enhanced deflate.
    pub const DEFLATE64: Self = Self(9);
    /// PKWARE Data Compression Library imploding.
    pub const PKWARE_DCL: Self = Self(10);
    /// BZIP2.
    pub const BZIP2: Self = Self(12);
    /// LZMA.
    pub const LZMA: Self = Self(14);
    /// IBM z/OS CMPSC.
    pub const CMPSC: Self = Self(16);
    /// IBM TERSE.
    pub const TERSE: Self = Self(18);
    /// PPMd version I, revision 1.
    pub const PPMD: Self = Self(98);

    /// Wraps a raw method code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the raw method code.
    #[must_use]
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Returns the human-readable method name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "Stored",
            1 => "Shrunk",
            2 => "Reduced with compression factor 1",
            3 => "Reduced with compression factor 2",
            4 => "Reduced with compression factor 3",
            5 => "Reduced with compression factor 4",
            6 => "Imploded",
            7 => "Tokenizing",
            8 => "Deflated",
            9 => "Deflate64",
            10 => "PKWARE DCL Imploding",
            12 => "BZIP2",
            14 => "LZMA",
            16 => "IBM z/OS CMPSC",
            18 => "IBM TERSE",
            98 => "PPMd",
            _ => "Reserved",
        }
    }

    /// Returns true for the methods every current extractor supports.
    #[must_use]
    pub const fn is_modern(self) -> bool {
        matches!(self.0, 0 | 8)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<zip::CompressionMethod> for Method {
    #[expect(
        deprecated,
        reason = "the raw code is the only way to keep methods the zip crate cannot decode"
    )]
    fn from(method: zip::CompressionMethod) -> Self {
        Self(method.to_u16())
    }
}

/// Errors raised while inspecting an archive's methods.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The file could not be opened.
    #[error("cannot open {}", path.display())]
    Io {
        /// Archive that was being opened.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The file is not a readable zip archive.
    #[error("{} is not a readable zip archive", path.display())]
    Unreadable {
        /// Archive that was being read.
        path: PathBuf,
        /// Underlying zip failure.
        #[source]
        source: ZipError,
    },
}

impl ClassifyError {
    /// Returns the archive the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Unreadable { path, .. } => path,
        }
    }
}

/// Collects the distinct compression methods used by the archive at `path`.
///
/// Only headers are read; no entry is decompressed.
///
/// # Errors
///
/// Returns [`ClassifyError::Io`] when the file cannot be opened and
/// [`ClassifyError::Unreadable`] when it is not a zip archive.
pub fn methods(path: &Path) -> Result<BTreeSet<Method>, ClassifyError> {
    let file = File::open(path).map_err(|source| ClassifyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let unreadable = |source| ClassifyError::Unreadable {
        path: path.to_path_buf(),
        source,
    };
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(unreadable)?;

    let mut found = BTreeSet::new();
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(unreadable)?;
        found.insert(Method::from(entry.compression()));
    }
    Ok(found)
}

/// Returns true when every entry of the archive at `path` is Stored or
/// Deflated. An archive with no entries is modern.
///
/// # Errors
///
/// Propagates any [`ClassifyError`] from [`methods`].
///
/// # Examples
///
/// ```no_run
/// use retrofix_normaliser::method::is_modern;
/// use std::path::Path;
///
/// if !is_modern(Path::new("canonical/game.zip"))? {
///     println!("needs repair");
/// }
/// # Ok::<(), retrofix_normaliser::method::ClassifyError>(())
/// ```
pub fn is_modern(path: &Path) -> Result<bool, ClassifyError> {
    Ok(methods(path)?.iter().all(|method| method.is_modern()))
}
