//! Per-family descriptors for the legacy archive formats.
//!
//! A [`Family`] holds everything the generic checker needs to know about one
//! format: which file names belong to it, how to tell a legacy archive from
//! a modern one, which tools can extract it (in order of preference), and
//! how to integrity-test it. Families are static data; adding a format means
//! adding a descriptor rather than another checker.

use crate::diagnostic::{Diagnostic, arj_status, unrar_status};
use crate::error::error_chain;
use crate::exec::ExecError;
use crate::method::{self, ClassifyError};
use clap::ValueEnum;
use retrofix::ToolNames;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Archive families the normaliser can repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum FamilyKind {
    /// PKZIP and compatibles.
    Zip,
    /// SEA ARC and PKARC.
    Arc,
    /// ARJ.
    Arj,
    /// LHarc and LHA.
    Lha,
    /// RAR.
    Rar,
}

impl FamilyKind {
    /// All families in processing order.
    pub const ALL: [Self; 5] = [Self::Zip, Self::Arc, Self::Arj, Self::Lha, Self::Rar];

    /// Returns the descriptor for this family.
    #[must_use]
    pub fn family(self) -> &'static Family {
        match self {
            Self::Zip => &ZIP,
            Self::Arc => &ARC,
            Self::Arj => &ARJ,
            Self::Lha => &LHA,
            Self::Rar => &RAR,
        }
    }
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family().name)
    }
}

/// External tools the families invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Info-ZIP `unzip`.
    Unzip,
    /// 7-Zip.
    SevenZip,
    /// SEA ARC.
    Arc,
    /// ARJ.
    Arj,
    /// LHa for UNIX.
    Lha,
    /// UnRAR.
    Unrar,
}

impl Tool {
    /// Returns the executable configured for this tool.
    #[must_use]
    pub fn executable(self, names: &ToolNames) -> &str {
        match self {
            Self::Unzip => &names.unzip,
            Self::SevenZip => &names.seven_zip,
            Self::Arc => &names.arc,
            Self::Arj => &names.arj,
            Self::Lha => &names.lha,
            Self::Unrar => &names.unrar,
        }
    }
}

/// Placeholder replaced by the absolute source archive path.
pub const SRC: &str = "{src}";

/// Placeholder replaced by the extraction directory.
pub const DEST: &str = "{dest}";

/// A tool plus its argument template.
///
/// Extraction always runs with the extraction directory as the working
/// directory, so tools that ignore `{dest}` still write to the right place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    /// Tool to run.
    pub tool: Tool,
    /// Arguments, with [`SRC`] and [`DEST`] placeholders.
    pub args: &'static [&'static str],
}

impl Invocation {
    /// Substitutes `src` and `dest` into the argument template.
    ///
    /// Placeholders may be embedded, as in 7-Zip's `-o{dest}`.
    #[must_use]
    pub fn render(&self, src: &Path, dest: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| substitute(arg, src, dest))
            .collect()
    }
}

fn substitute(template: &str, src: &Path, dest: &Path) -> OsString {
    if template == SRC {
        return src.as_os_str().to_owned();
    }
    if template == DEST {
        return dest.as_os_str().to_owned();
    }
    match template.split_once(DEST) {
        Some((before, after)) => {
            let mut arg = OsString::from(before);
            arg.push(dest.as_os_str());
            arg.push(after);
            arg
        }
        None => OsString::from(template),
    }
}

/// How a family decides that a candidate still needs repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Introspection {
    /// Membership in the candidate set is enough.
    Membership,
    /// Read the zip central directory and repair unless every method is
    /// Stored or Deflated.
    ZipMethods,
    /// As [`Self::ZipMethods`], but files that are not zips are probed for
    /// an ARC header instead.
    ZipOrArcHeader,
}

/// How a family's test tool reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTable {
    /// Info-ZIP exit codes, decoded by [`crate::diagnostic::Diagnostic`].
    Unzip,
    /// ARJ exit codes.
    Arj,
    /// UnRAR exit codes.
    Unrar,
    /// Exit code only; no table.
    Plain,
}

impl StatusTable {
    /// Describes a test or extraction outcome, or returns `""` when the
    /// table has nothing to add.
    #[must_use]
    pub fn describe(self, err: Option<&ExecError>) -> &'static str {
        match self {
            Self::Unzip => Diagnostic::exit_status(err).description(),
            Self::Arj => arj_status(err),
            Self::Unrar => unrar_status(err),
            Self::Plain => "",
        }
    }
}

/// Static description of one archive family.
#[derive(Debug)]
pub struct Family {
    /// Which family this describes.
    pub kind: FamilyKind,
    /// Display name.
    pub name: &'static str,
    /// Lower-case extensions without the leading dot.
    pub extensions: &'static [&'static str],
    /// Whether a bare `<uuid>` with no extension belongs to this family.
    pub accepts_bare: bool,
    /// Repair-need check applied after membership.
    pub introspection: Introspection,
    /// Extraction tools in order of preference.
    pub extractors: &'static [Invocation],
    /// Integrity test used by the audit pass.
    pub test: Invocation,
    /// Text the test tool prints on success, when exit codes are unreliable.
    pub test_marker: Option<&'static str>,
    /// Exit-code table for diagnostics.
    pub status: StatusTable,
}

const UNZIP_EXTRACT: Invocation = Invocation {
    tool: Tool::Unzip,
    args: &["-o", "-qq", SRC, "-d", DEST],
};

const SEVEN_ZIP_EXTRACT: Invocation = Invocation {
    tool: Tool::SevenZip,
    args: &["x", "-aoa", "-y", "-o{dest}", SRC],
};

/// PKZIP archives, including bare `<uuid>` files.
pub static ZIP: Family = Family {
    kind: FamilyKind::Zip,
    name: "ZIP",
    extensions: &["zip"],
    accepts_bare: true,
    introspection: Introspection::ZipMethods,
    extractors: &[UNZIP_EXTRACT, SEVEN_ZIP_EXTRACT],
    test: Invocation {
        tool: Tool::Unzip,
        args: &["-tqq", SRC],
    },
    test_marker: None,
    status: StatusTable::Unzip,
};

/// SEA ARC archives. Some `.arc` files are really zips and are classified
/// as such.
pub static ARC: Family = Family {
    kind: FamilyKind::Arc,
    name: "ARC",
    extensions: &["arc"],
    accepts_bare: false,
    introspection: Introspection::ZipOrArcHeader,
    extractors: &[
        Invocation {
            tool: Tool::Arc,
            args: &["xo", SRC],
        },
        UNZIP_EXTRACT,
    ],
    test: Invocation {
        tool: Tool::Arc,
        args: &["t", SRC],
    },
    test_marker: None,
    status: StatusTable::Plain,
};

/// ARJ archives.
pub static ARJ: Family = Family {
    kind: FamilyKind::Arj,
    name: "ARJ",
    extensions: &["arj"],
    accepts_bare: false,
    introspection: Introspection::Membership,
    extractors: &[
        Invocation {
            tool: Tool::Arj,
            args: &["x", "-y", SRC],
        },
        SEVEN_ZIP_EXTRACT,
    ],
    test: Invocation {
        tool: Tool::Arj,
        args: &["t", SRC],
    },
    test_marker: None,
    status: StatusTable::Arj,
};

/// LHarc and LHA archives.
pub static LHA: Family = Family {
    kind: FamilyKind::Lha,
    name: "LHA",
    extensions: &["lha", "lzh"],
    accepts_bare: false,
    introspection: Introspection::Membership,
    extractors: &[
        Invocation {
            tool: Tool::Lha,
            args: &["xf", SRC],
        },
        SEVEN_ZIP_EXTRACT,
    ],
    test: Invocation {
        tool: Tool::Lha,
        args: &["t", SRC],
    },
    test_marker: Some("Tested"),
    status: StatusTable::Plain,
};

/// RAR archives.
pub static RAR: Family = Family {
    kind: FamilyKind::Rar,
    name: "RAR",
    extensions: &["rar"],
    accepts_bare: false,
    introspection: Introspection::Membership,
    extractors: &[
        Invocation {
            tool: Tool::Unrar,
            args: &["x", "-o+", "-y", SRC, "{dest}/"],
        },
        SEVEN_ZIP_EXTRACT,
    ],
    test: Invocation {
        tool: Tool::Unrar,
        args: &["t", SRC],
    },
    test_marker: Some("All OK"),
    status: StatusTable::Unrar,
};

impl Family {
    /// Returns true when `path`'s extension (or lack of one) belongs to this
    /// family. Matching is case-insensitive.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        match path.extension() {
            None => self.accepts_bare,
            Some(ext) => ext.to_str().is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            }),
        }
    }
}

/// What an ARC header probe found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcProbe {
    /// A SEA ARC header with a known method byte.
    Arc {
        /// Method byte of the first member.
        method: u8,
    },
    /// An ARC end-of-archive marker with no members.
    Empty,
    /// Not an ARC file.
    Foreign,
}

/// Marker byte that opens every ARC member header.
const ARC_MARK: u8 = 0x1A;

/// Highest method byte used by SEA ARC and PKARC.
const ARC_MAX_METHOD: u8 = 11;

/// Reads the first member header of `path` and reports whether it is ARC.
///
/// # Errors
///
/// Returns any I/O error from opening or reading the file.
pub fn probe_arc(path: &Path) -> io::Result<ArcProbe> {
    let mut header = [0u8; 2];
    let mut file = File::open(path)?;
    let read = file.read(&mut header)?;
    Ok(match (read, header) {
        (2, [ARC_MARK, 0]) => ArcProbe::Empty,
        (2, [ARC_MARK, method]) if method <= ARC_MAX_METHOD => ArcProbe::Arc { method },
        _ => ArcProbe::Foreign,
    })
}

/// Result of running a family's introspection on one file.
#[derive(Debug)]
pub enum Verdict {
    /// The archive uses a legacy encoding and should be rebuilt.
    NeedsRepair,
    /// The archive is already readable by modern tools.
    Modern,
    /// The archive could not be identified; the reason is for logging.
    Unreadable(String),
}

impl Introspection {
    /// Decides whether the archive at `path` needs repair.
    #[must_use]
    pub fn inspect(self, path: &Path) -> Verdict {
        match self {
            Self::Membership => Verdict::NeedsRepair,
            Self::ZipMethods => zip_verdict(path),
            Self::ZipOrArcHeader => match method::is_modern(path) {
                Err(ClassifyError::Unreadable { .. }) => arc_verdict(path),
                other => zip_result_verdict(other),
            },
        }
    }
}

fn zip_verdict(path: &Path) -> Verdict {
    zip_result_verdict(method::is_modern(path))
}

fn zip_result_verdict(result: Result<bool, ClassifyError>) -> Verdict {
    match result {
        Ok(true) => Verdict::Modern,
        Ok(false) => Verdict::NeedsRepair,
        Err(err) => Verdict::Unreadable(error_chain(&err)),
    }
}

fn arc_verdict(path: &Path) -> Verdict {
    match probe_arc(path) {
        Ok(ArcProbe::Arc { .. }) => Verdict::NeedsRepair,
        Ok(ArcProbe::Empty) => Verdict::Modern,
        Ok(ArcProbe::Foreign) => {
            Verdict::Unreadable("neither a zip archive nor an ARC header".to_owned())
        }
        Err(err) => Verdict::Unreadable(format!("cannot read header: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::test_utils::fixtures::{arc_file, legacy_zip, modern_zip};
    use rstest::rstest;
    use std::path::PathBuf;

    const ID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

    #[rstest]
    #[case::zip_ext(FamilyKind::Zip, "zip", true)]
    #[case::zip_upper(FamilyKind::Zip, "ZIP", true)]
    #[case::zip_bare(FamilyKind::Zip, "", true)]
    #[case::zip_rejects_arj(FamilyKind::Zip, "arj", false)]
    #[case::arc_ext(FamilyKind::Arc, "arc", true)]
    #[case::arc_bare(FamilyKind::Arc, "", false)]
    #[case::arj_ext(FamilyKind::Arj, "arj", true)]
    #[case::lha_ext(FamilyKind::Lha, "lha", true)]
    #[case::lzh_ext(FamilyKind::Lha, "LZH", true)]
    #[case::lha_bare(FamilyKind::Lha, "", false)]
    #[case::rar_ext(FamilyKind::Rar, "rar", true)]
    fn extension_filter(#[case] kind: FamilyKind, #[case] ext: &str, #[case] expected: bool) {
        let mut path = PathBuf::from("/canonical").join(ID);
        if !ext.is_empty() {
            path.set_extension(ext);
        }

        assert_eq!(kind.family().accepts(&path), expected);
    }

    #[rstest]
    fn only_zip_accepts_bare_names() {
        let bare: Vec<_> = FamilyKind::ALL
            .iter()
            .filter(|kind| kind.family().accepts_bare)
            .collect();

        assert_eq!(bare, [&FamilyKind::Zip]);
    }

    #[rstest]
    fn descriptors_match_their_kind() {
        for kind in FamilyKind::ALL {
            assert_eq!(kind.family().kind, kind);
            assert!(!kind.family().extractors.is_empty());
        }
    }

    #[rstest]
    fn renders_placeholders_including_embedded_dest() {
        let args = SEVEN_ZIP_EXTRACT.render(Path::new("/in/a.arj"), Path::new("/work/x"));

        assert_eq!(
            args,
            [
                OsString::from("x"),
                OsString::from("-aoa"),
                OsString::from("-y"),
                OsString::from("-o/work/x"),
                OsString::from("/in/a.arj"),
            ]
        );
    }

    #[rstest]
    fn tool_names_come_from_configuration() {
        let names = ToolNames {
            seven_zip: "7zz".to_owned(),
            ..ToolNames::default()
        };

        assert_eq!(Tool::SevenZip.executable(&names), "7zz");
        assert_eq!(Tool::Unzip.executable(&names), "unzip");
    }

    #[rstest]
    #[case::unzip(StatusTable::Unzip, Some(10), "Zip file not found")]
    #[case::arj(StatusTable::Arj, Some(3), "CRC error")]
    #[case::unrar(StatusTable::Unrar, Some(3), "invalid checksum, data is damaged")]
    #[case::plain(StatusTable::Plain, Some(3), "")]
    fn status_tables_describe_codes(
        #[case] table: StatusTable,
        #[case] code: Option<i32>,
        #[case] expected: &str,
    ) {
        let err = ExecError::Failed {
            program: "tool".to_owned(),
            code,
            stderr: String::new(),
        };

        assert_eq!(table.describe(Some(&err)), expected);
    }

    #[rstest]
    #[case::arc(8, ArcProbe::Arc { method: 8 })]
    #[case::empty(0, ArcProbe::Empty)]
    #[case::out_of_range(30, ArcProbe::Foreign)]
    fn probes_arc_headers(#[case] method: u8, #[case] expected: ArcProbe) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = arc_file(dir.path(), "a.arc", method);

        assert_eq!(probe_arc(&path).expect("readable"), expected);
    }

    #[rstest]
    fn short_file_is_foreign() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tiny.arc");
        std::fs::write(&path, [ARC_MARK]).expect("write fixture");

        assert_eq!(probe_arc(&path).expect("readable"), ArcProbe::Foreign);
    }

    #[rstest]
    fn zip_introspection_flags_legacy_methods() {
        let dir = tempfile::tempdir().expect("temp dir");
        let legacy = legacy_zip(dir.path(), "old.zip", &[("A.TXT", b"a")], Method::IMPLODED);
        let modern = modern_zip(dir.path(), "new.zip", &[("A.TXT", b"a")]);

        assert!(matches!(
            Introspection::ZipMethods.inspect(&legacy),
            Verdict::NeedsRepair
        ));
        assert!(matches!(
            Introspection::ZipMethods.inspect(&modern),
            Verdict::Modern
        ));
    }

    #[rstest]
    fn arc_introspection_accepts_zip_disguised_as_arc() {
        let dir = tempfile::tempdir().expect("temp dir");
        let zip = modern_zip(dir.path(), "really-zip.arc", &[("A.TXT", b"a")]);

        assert!(matches!(
            Introspection::ZipOrArcHeader.inspect(&zip),
            Verdict::Modern
        ));
    }

    #[rstest]
    fn arc_introspection_falls_back_to_header() {
        let dir = tempfile::tempdir().expect("temp dir");
        let arc = arc_file(dir.path(), "a.arc", 9);

        assert!(matches!(
            Introspection::ZipOrArcHeader.inspect(&arc),
            Verdict::NeedsRepair
        ));
    }

    #[rstest]
    fn garbage_is_unreadable_for_both_introspections() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("junk.arc");
        std::fs::write(&path, b"plain text, not an archive").expect("write fixture");

        assert!(matches!(
            Introspection::ZipMethods.inspect(&path),
            Verdict::Unreadable(_)
        ));
        assert!(matches!(
            Introspection::ZipOrArcHeader.inspect(&path),
            Verdict::Unreadable(_)
        ));
    }
}
