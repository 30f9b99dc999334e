//! CLI argument definitions for the normaliser binary.
//!
//! Parsing lives here rather than in `main.rs` so that the argument surface
//! can be unit-tested and driven by [`crate::app::run`] without spawning a
//! process.

use crate::family::FamilyKind;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Re-package legacy-compressed archives as modern zip files.
#[derive(Parser, Debug)]
#[command(name = "retrofix-normalise")]
#[command(version, about)]
#[command(long_about = concat!(
    "Re-package legacy-compressed archives as modern zip files.\n\n",
    "The canonical store holds archives named after their UUID. Archives that ",
    "use compression methods modern unzip tools no longer understand (Shrunk, ",
    "Reduced, Imploded, or any ARC, ARJ, LHA or RAR archive) are extracted ",
    "with the legacy tool and rebuilt as Deflate zips in the overlay ",
    "directory. The canonical store is never modified.\n\n",
    "Only UUIDs listed in the candidates file are considered.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Repair every family listed in the candidates file:\n",
    "    $ retrofix-normalise repair --candidates legacy.txt\n\n",
    "  Repair ARJ archives with four workers:\n",
    "    $ retrofix-normalise repair -f arj -j 4 --candidates legacy.txt\n\n",
    "  Report damaged ZIP and LHA archives without changing anything:\n",
    "    $ retrofix-normalise audit -f zip,lha --candidates legacy.txt\n\n",
    "  Show the compression methods used by one zip:\n",
    "    $ retrofix-normalise methods old.zip\n\n",
    "CONFIGURATION:\n",
    "  Settings are read from --config, then $RETROFIX_CONFIG, then\n",
    "  ./retrofix.toml. Command-line directories override the file.",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file [default: $RETROFIX_CONFIG or retrofix.toml].
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet",
        global = true
    )]
    pub verbosity: u8,

    /// Only report errors.
    #[arg(short, long, conflicts_with = "verbosity", global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Normalise candidate archives into the overlay.
    Repair(PassArgs),

    /// Integrity-test candidate archives and report the damaged ones.
    Audit(PassArgs),

    /// Print the compression methods used by a zip archive.
    Methods(ArchiveArgs),

    /// Integrity-test a single zip archive with unzip.
    Test(ArchiveArgs),
}

/// Arguments shared by the `repair` and `audit` passes.
#[derive(Args, Debug, Clone, Default)]
pub struct PassArgs {
    /// Archive families to process (comma-separated or repeated)
    /// [default: all].
    #[arg(short, long, value_enum, value_delimiter = ',', value_name = "FAMILY")]
    pub family: Vec<FamilyKind>,

    /// File listing candidate UUIDs, one per line.
    #[arg(long, value_name = "FILE")]
    pub candidates: Utf8PathBuf,

    /// Canonical store, overriding the configuration file.
    #[arg(long, value_name = "DIR")]
    pub canonical: Option<Utf8PathBuf>,

    /// Overlay directory, overriding the configuration file.
    #[arg(long, value_name = "DIR")]
    pub overlay: Option<Utf8PathBuf>,

    /// Number of archives processed concurrently.
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,
}

/// Arguments naming one archive.
#[derive(Args, Debug, Clone)]
pub struct ArchiveArgs {
    /// Archive to inspect.
    #[arg(value_name = "ZIP")]
    pub path: Utf8PathBuf,
}

impl PassArgs {
    /// Returns the requested families in processing order, without
    /// duplicates. No selection means every family.
    ///
    /// # Examples
    ///
    /// ```
    /// use retrofix_normaliser::cli::PassArgs;
    /// use retrofix_normaliser::family::FamilyKind;
    ///
    /// let args = PassArgs {
    ///     family: vec![FamilyKind::Lha, FamilyKind::Zip, FamilyKind::Lha],
    ///     ..PassArgs::default()
    /// };
    /// assert_eq!(args.families(), [FamilyKind::Zip, FamilyKind::Lha]);
    /// ```
    #[must_use]
    pub fn families(&self) -> Vec<FamilyKind> {
        FamilyKind::ALL
            .into_iter()
            .filter(|kind| self.family.is_empty() || self.family.contains(kind))
            .collect()
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
