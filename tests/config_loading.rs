//! Integration tests for configuration file resolution and loading.

use camino::{Utf8Path, Utf8PathBuf};
use retrofix::RepairConfig;
use retrofix::config::{CONFIG_ENV, ConfigError, DEFAULT_CONFIG_FILE};
use rstest::rstest;
use std::fs;

fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::try_from(path).expect("temp path should be UTF-8")
}

#[rstest]
fn cli_path_wins_over_environment() {
    temp_env::with_var(CONFIG_ENV, Some("/from/env.toml"), || {
        let path = RepairConfig::resolve_path(Some(Utf8Path::new("/from/cli.toml")));
        assert_eq!(path, Utf8PathBuf::from("/from/cli.toml"));
    });
}

#[rstest]
fn environment_wins_over_default() {
    temp_env::with_var(CONFIG_ENV, Some("/from/env.toml"), || {
        let path = RepairConfig::resolve_path(None);
        assert_eq!(path, Utf8PathBuf::from("/from/env.toml"));
    });
}

#[rstest]
#[case::unset(None)]
#[case::blank(Some("   "))]
fn default_file_used_without_override(#[case] env_value: Option<&str>) {
    temp_env::with_var(CONFIG_ENV, env_value, || {
        let path = RepairConfig::resolve_path(None);
        assert_eq!(path, Utf8PathBuf::from(DEFAULT_CONFIG_FILE));
    });
}

#[rstest]
fn loads_complete_file_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = utf8(dir.path().join("retrofix.toml"));
    fs::write(
        &path,
        concat!(
            "canonical_dir = \"/srv/files\"\n",
            "overlay_dir = \"/srv/extra\"\n",
            "workers = 4\n",
            "verify_output = false\n",
            "[tools]\n",
            "seven_zip = \"7zz\"\n",
        ),
    )
    .expect("write config");

    let config = RepairConfig::load(&path).expect("config should load");

    assert_eq!(config.workers, 4);
    assert!(!config.verify_output);
    assert_eq!(config.tools.seven_zip, "7zz");
    config.validate().expect("config should validate");
}

#[rstest]
fn malformed_file_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = utf8(dir.path().join("retrofix.toml"));
    fs::write(&path, "workers = [").expect("write config");

    let outcome = RepairConfig::load(&path);

    assert!(matches!(outcome, Err(ConfigError::Parse(_))));
}

#[cfg(unix)]
#[rstest]
fn unreadable_path_is_a_read_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    // A directory exists but cannot be read as a file.
    let path = utf8(dir.path().to_path_buf());

    let outcome = RepairConfig::load(&path);

    assert!(matches!(outcome, Err(ConfigError::Read { .. })));
}
