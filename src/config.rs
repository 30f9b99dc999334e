//! TOML-backed configuration for normalisation passes.
//!
//! Settings live in `retrofix.toml`. Every key has a default so that an empty
//! file (or no file at all) is valid; the two directory paths are the only
//! values that must be supplied, either in the file or on the command line.
//! Unknown keys are rejected so that typos surface instead of silently
//! falling back to defaults.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV: &str = "RETROFIX_CONFIG";

/// File name used when neither the command line nor the environment names one.
pub const DEFAULT_CONFIG_FILE: &str = "retrofix.toml";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration at {path}")]
    Read {
        /// Path that was being read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has unknown keys.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required directory was supplied neither in the file nor on the CLI.
    #[error("no {name} directory configured")]
    MissingDirectory {
        /// Which directory is missing (`canonical` or `overlay`).
        name: &'static str,
    },

    /// The worker count must be at least one.
    #[error("workers must be at least 1")]
    NoWorkers,
}

/// Executable names for the legacy tools, overridable per deployment.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolNames {
    /// Info-ZIP `unzip`.
    pub unzip: String,
    /// 7-Zip command line.
    pub seven_zip: String,
    /// SEA ARC.
    pub arc: String,
    /// Robert Jung's ARJ.
    pub arj: String,
    /// LHa for UNIX.
    pub lha: String,
    /// RARLAB `unrar`.
    pub unrar: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            unzip: "unzip".to_owned(),
            seven_zip: "7z".to_owned(),
            arc: "arc".to_owned(),
            arj: "arj".to_owned(),
            lha: "lha".to_owned(),
            unrar: "unrar".to_owned(),
        }
    }
}

/// Settings for a normalisation pass.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepairConfig {
    /// Read-only store of original archives named `<uuid>[.<ext>]`.
    pub canonical_dir: Option<Utf8PathBuf>,
    /// Read-write overlay holding normalised `<uuid>.zip` files.
    pub overlay_dir: Option<Utf8PathBuf>,
    /// Number of candidates processed concurrently.
    pub workers: usize,
    /// Upper bound on a single external tool invocation, in seconds.
    pub tool_timeout_secs: Option<u64>,
    /// Whether rebuilt archives are integrity-tested before placement.
    pub verify_output: bool,
    /// Executable name overrides.
    pub tools: ToolNames,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            canonical_dir: None,
            overlay_dir: None,
            workers: 1,
            tool_timeout_secs: None,
            verify_output: true,
            tools: ToolNames::default(),
        }
    }
}

impl RepairConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use retrofix::RepairConfig;
    ///
    /// let config = RepairConfig::from_toml_str("workers = 4\n")?;
    /// assert_eq!(config.workers, 4);
    /// assert!(config.verify_output);
    /// # Ok::<(), retrofix::ConfigError>(())
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults; any other read failure is an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file exists but cannot be read,
    /// or [`ConfigError::Parse`] when its contents are invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(source) => Self::from_toml_str(&source),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Chooses the configuration file: command line, then
    /// [`CONFIG_ENV`], then [`DEFAULT_CONFIG_FILE`] in the working directory.
    #[must_use]
    pub fn resolve_path(cli_value: Option<&Utf8Path>) -> Utf8PathBuf {
        if let Some(path) = cli_value {
            return path.to_owned();
        }
        std::env::var(CONFIG_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| Utf8PathBuf::from(DEFAULT_CONFIG_FILE), Utf8PathBuf::from)
    }

    /// Applies command-line directory overrides on top of file values.
    #[must_use]
    pub fn with_overrides(
        mut self,
        canonical_dir: Option<Utf8PathBuf>,
        overlay_dir: Option<Utf8PathBuf>,
        workers: Option<usize>,
    ) -> Self {
        if canonical_dir.is_some() {
            self.canonical_dir = canonical_dir;
        }
        if overlay_dir.is_some() {
            self.overlay_dir = overlay_dir;
        }
        if let Some(workers) = workers {
            self.workers = workers;
        }
        self
    }

    /// Checks that the settings describe a runnable pass.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDirectory`] when either directory is
    /// unset, or [`ConfigError::NoWorkers`] when `workers` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.canonical_dir.is_none() {
            return Err(ConfigError::MissingDirectory { name: "canonical" });
        }
        if self.overlay_dir.is_none() {
            return Err(ConfigError::MissingDirectory { name: "overlay" });
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Returns the configured tool timeout, if any.
    #[must_use]
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}
