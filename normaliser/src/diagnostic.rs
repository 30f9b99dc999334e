//! Exit-status decoding for the legacy archive tools.
//!
//! Info-ZIP `unzip` reports its verdict through a small set of documented
//! exit codes; [`Diagnostic`] gives each one a name. ARJ and UnRAR use their
//! own tables, exposed as plain descriptions through [`arj_status`] and
//! [`unrar_status`].
//!
//! Codes are taken from [`ExecError::Failed`] when available, otherwise
//! from an `exit status <n>` fragment in the error text.

use crate::exec::ExecError;
use std::fmt;

/// Named outcome of an Info-ZIP `unzip` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    /// No errors or warnings.
    Normal,
    /// Warnings only; processing completed.
    Warning,
    /// A generic error in the zipfile format.
    GenericError,
    /// A severe error in the zipfile format.
    SevereError,
    /// Buffers could not be allocated during initialisation.
    BufferError,
    /// Memory or a tty for the password prompt was unavailable.
    TtyError,
    /// Memory ran out while decompressing to disk.
    DiskError,
    /// Memory ran out while decompressing in memory.
    MemoryError,
    /// The zip file was not found.
    ZipNotFound,
    /// Invalid command-line options.
    OptionsError,
    /// No matching files were found.
    FilesNotFound,
    /// The archive looks like a zip bomb.
    ZipBomb,
    /// The disk filled during extraction.
    DiskFull,
    /// The archive ended prematurely.
    PrematureExit,
    /// The user aborted the run.
    UserAbort,
    /// An entry uses an unsupported compression method or encryption.
    CompressionMethodUnsupported,
    /// Decryption failed for every password tried.
    BadDecryption,
    /// An exit code with no documented meaning, or none could be found.
    Unknown,
}

impl Diagnostic {
    /// Maps an `unzip` exit code to its diagnostic.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::Warning,
            2 => Self::GenericError,
            3 => Self::SevereError,
            4 => Self::BufferError,
            5 => Self::TtyError,
            6 => Self::DiskError,
            7 => Self::MemoryError,
            10 => Self::ZipNotFound,
            11 => Self::OptionsError,
            12 => Self::FilesNotFound,
            13 => Self::ZipBomb,
            50 => Self::DiskFull,
            51 => Self::PrematureExit,
            80 => Self::UserAbort,
            81 => Self::CompressionMethodUnsupported,
            82 => Self::BadDecryption,
            _ => Self::Unknown,
        }
    }

    /// Returns the exit code this diagnostic is decoded from.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Normal => Some(0),
            Self::Warning => Some(1),
            Self::GenericError => Some(2),
            Self::SevereError => Some(3),
            Self::BufferError => Some(4),
            Self::TtyError => Some(5),
            Self::DiskError => Some(6),
            Self::MemoryError => Some(7),
            Self::ZipNotFound => Some(10),
            Self::OptionsError => Some(11),
            Self::FilesNotFound => Some(12),
            Self::ZipBomb => Some(13),
            Self::DiskFull => Some(50),
            Self::PrematureExit => Some(51),
            Self::UserAbort => Some(80),
            Self::CompressionMethodUnsupported => Some(81),
            Self::BadDecryption => Some(82),
            Self::Unknown => None,
        }
    }

    /// Decodes the outcome of a tool run. `None` means it succeeded.
    #[must_use]
    pub fn exit_status(err: Option<&ExecError>) -> Self {
        match err {
            None => Self::Normal,
            Some(err) => exit_code(err).map_or(Self::Unknown, Self::from_code),
        }
    }

    /// Decodes an `exit status <n>` fragment in free-form error text.
    ///
    /// # Examples
    ///
    /// ```
    /// use retrofix_normaliser::diagnostic::Diagnostic;
    ///
    /// assert_eq!(Diagnostic::from_message("exit status 10"), Diagnostic::ZipNotFound);
    /// assert_eq!(Diagnostic::from_message("broken pipe"), Diagnostic::Unknown);
    /// ```
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        parse_exit_status(message).map_or(Self::Unknown, Self::from_code)
    }

    /// Returns true when an archive test with this result counts as passed.
    #[must_use]
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Normal | Self::Warning)
    }

    /// Returns the descriptive text for this diagnostic.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Normal; no errors or warnings detected",
            Self::Warning => "One or more warning errors were encountered",
            Self::GenericError => "A generic error in the zipfile format was detected",
            Self::SevereError => "A severe error in the zipfile format was detected",
            Self::BufferError => "Unable to allocate memory for one or more buffers",
            Self::TtyError => "Unable to allocate memory or obtain a tty for the password",
            Self::DiskError => "Unable to allocate memory during decompression to disk",
            Self::MemoryError => "Unable to allocate memory during in-memory decompression",
            Self::ZipNotFound => "Zip file not found",
            Self::OptionsError => "Invalid options were specified on the command line",
            Self::FilesNotFound => "No matching files were found",
            Self::ZipBomb => "Zip bomb detected",
            Self::DiskFull => "The disk is (or was) full during extraction",
            Self::PrematureExit => "The end of the zip archive was encountered prematurely",
            Self::UserAbort => "The user aborted unzip prematurely",
            Self::CompressionMethodUnsupported => {
                "One or more files use an unsupported compression method or encryption"
            }
            Self::BadDecryption => "No files were found due to bad decryption password(s)",
            Self::Unknown => "Unused or unknown exit status",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Describes an ARJ exit status, or returns `""` for success-less inputs
/// (`None`) and undocumented codes.
#[must_use]
pub fn arj_status(err: Option<&ExecError>) -> &'static str {
    match err.and_then(exit_code) {
        Some(0) => "success",
        Some(1) => "warning",
        Some(2) => "fatal error",
        Some(3) => "CRC error",
        Some(4) => "ARJ-SECURITY error or attempt to update an ARJ-SECURED archive",
        Some(5) => "disk full or write error",
        Some(6) => "cannot open archive or file",
        Some(7) => "simple user error (bad parameters)",
        Some(8) => "not enough memory",
        Some(9) => "not an ARJ archive",
        Some(10) => "XMS memory error (read or write)",
        Some(11) => "user control break",
        Some(12) => "too many chapters (over 250)",
        _ => "",
    }
}

/// Describes an UnRAR exit status, or returns `""` for `None` and
/// undocumented codes.
#[must_use]
pub fn unrar_status(err: Option<&ExecError>) -> &'static str {
    match err.and_then(exit_code) {
        Some(0) => "success",
        Some(1) => "non fatal error(s) occurred",
        Some(2) => "a fatal error occurred",
        Some(3) => "invalid checksum, data is damaged",
        Some(4) => "attempt to modify a locked archive",
        Some(5) => "write error",
        Some(6) => "file open error",
        Some(7) => "wrong command line option",
        Some(8) => "not enough memory",
        Some(9) => "file create error",
        Some(10) => "no files matching the specified mask and options were found",
        Some(11) => "wrong password",
        Some(255) => "user stopped the process",
        _ => "",
    }
}

fn exit_code(err: &ExecError) -> Option<i32> {
    err.exit_code()
        .or_else(|| parse_exit_status(&err.to_string()))
}

/// Extracts `<n>` from an `exit status <n>` or `exit status: <n>` fragment.
fn parse_exit_status(message: &str) -> Option<i32> {
    const NEEDLE: &str = "exit status";
    let start = message.find(NEEDLE)? + NEEDLE.len();
    let rest = message[start..].trim_start_matches(':').trim_start();
    let end = rest
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(rest.len(), |(i, _)| i);
    rest[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn failed(code: Option<i32>) -> ExecError {
        ExecError::Failed {
            program: "tool".to_owned(),
            code,
            stderr: String::new(),
        }
    }

    #[rstest]
    fn success_decodes_to_normal() {
        assert_eq!(Diagnostic::exit_status(None), Diagnostic::Normal);
    }

    #[rstest]
    #[case::warning(1, Diagnostic::Warning)]
    #[case::zip_not_found(10, Diagnostic::ZipNotFound)]
    #[case::bomb(13, Diagnostic::ZipBomb)]
    #[case::unsupported(81, Diagnostic::CompressionMethodUnsupported)]
    #[case::gap(8, Diagnostic::Unknown)]
    #[case::out_of_table(99, Diagnostic::Unknown)]
    fn structured_codes_decode(#[case] code: i32, #[case] expected: Diagnostic) {
        assert_eq!(Diagnostic::exit_status(Some(&failed(Some(code)))), expected);
    }

    #[rstest]
    fn zip_not_found_has_documented_text() {
        let diagnostic = Diagnostic::from_message("exit status 10");

        assert_eq!(diagnostic, Diagnostic::ZipNotFound);
        assert_eq!(diagnostic.to_string(), "Zip file not found");
    }

    #[rstest]
    #[case::plain("exit status 3", Some(3))]
    #[case::colon("process exited: exit status: 51", Some(51))]
    #[case::trailing("unzip failed: exit status 81 (see log)", Some(81))]
    #[case::absent("command not found: unzip", None)]
    #[case::no_digits("exit status unknown", None)]
    fn parses_exit_status_fragments(#[case] message: &str, #[case] expected: Option<i32>) {
        assert_eq!(parse_exit_status(message), expected);
    }

    #[rstest]
    fn signal_termination_is_unknown() {
        assert_eq!(
            Diagnostic::exit_status(Some(&failed(None))),
            Diagnostic::Unknown
        );
    }

    #[rstest]
    fn missing_tool_is_unknown() {
        let err = ExecError::NotFound {
            program: "unzip".to_owned(),
        };

        assert_eq!(Diagnostic::exit_status(Some(&err)), Diagnostic::Unknown);
    }

    #[rstest]
    fn codes_round_trip_through_table() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 10, 11, 12, 13, 50, 51, 80, 81, 82] {
            assert_eq!(Diagnostic::from_code(code).code(), Some(code));
        }
    }

    #[rstest]
    #[case::pass(Diagnostic::Normal, true)]
    #[case::warning(Diagnostic::Warning, true)]
    #[case::generic(Diagnostic::GenericError, false)]
    #[case::unknown(Diagnostic::Unknown, false)]
    fn only_normal_and_warning_pass(#[case] diagnostic: Diagnostic, #[case] expected: bool) {
        assert_eq!(diagnostic.is_pass(), expected);
    }

    #[rstest]
    #[case::none(None, "")]
    #[case::crc(Some(3), "CRC error")]
    #[case::not_arj(Some(9), "not an ARJ archive")]
    #[case::undocumented(Some(42), "")]
    fn arj_table(#[case] code: Option<i32>, #[case] expected: &str) {
        let err = code.map(|c| failed(Some(c)));

        assert_eq!(arj_status(err.as_ref()), expected);
    }

    #[rstest]
    #[case::none(None, "")]
    #[case::password(Some(11), "wrong password")]
    #[case::stopped(Some(255), "user stopped the process")]
    #[case::undocumented(Some(12), "")]
    fn unrar_table(#[case] code: Option<i32>, #[case] expected: &str) {
        let err = code.map(|c| failed(Some(c)));

        assert_eq!(unrar_status(err.as_ref()), expected);
    }
}
