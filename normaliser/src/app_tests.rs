//! Tests for command orchestration.

use super::*;
use crate::artifact::{CandidateSet, MockCandidateSource};
use crate::exec::{CommandRequest, ExecError};
use crate::test_utils::fixtures::{legacy_zip, modern_zip, write_file};
use crate::test_utils::{ExpectedCall, StubExecutor, failure_output};
use clap::Parser;
use retrofix_common::test_support::RecordingLog;
use rstest::{fixture, rstest};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
const OTHER: &str = "f47ac10b-58cc-4372-a567-0e02b2c3d479";

struct Store {
    root: TempDir,
}

impl Store {
    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    fn canonical(&self) -> PathBuf {
        self.path("canonical")
    }

    fn overlay(&self) -> PathBuf {
        self.path("overlay")
    }

    /// Builds argv for a pass over this store, with a configuration path
    /// that does not exist so defaults apply.
    fn pass_argv(&self, command: &str, families: &str) -> Vec<String> {
        vec![
            "retrofix-normalise".to_owned(),
            command.to_owned(),
            "--config".to_owned(),
            text(&self.path("absent.toml")),
            "--candidates".to_owned(),
            text(&self.path("candidates.txt")),
            "--canonical".to_owned(),
            text(&self.canonical()),
            "--overlay".to_owned(),
            text(&self.overlay()),
            "--family".to_owned(),
            families.to_owned(),
        ]
    }
}

#[fixture]
fn store() -> Store {
    let root = tempfile::tempdir().expect("temp dir");
    fs::create_dir(root.path().join("canonical")).expect("create canonical");
    fs::create_dir(root.path().join("overlay")).expect("create overlay");
    fs::write(
        root.path().join("candidates.txt"),
        format!("# legacy archives\n{OTHER}\n{ID}\n"),
    )
    .expect("write candidates");
    Store { root }
}

fn populate(request: &CommandRequest) {
    let dir = request
        .working_dir
        .as_ref()
        .expect("extraction runs in the work directory");
    write_file(dir, "README.TXT", b"hello from 1991");
}

fn text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_owned()).collect()
}

fn run_cli(argv: &[String], exec: &StubExecutor) -> (Result<RunStatus, AppError>, String) {
    let log = RecordingLog::default();
    let session = Session::new(exec, LogSink::new(&log));
    let cli = Cli::parse_from(argv);
    let mut out = Vec::new();
    let result = run(&cli, &session, &mut out);
    (result, String::from_utf8(out).expect("report is UTF-8"))
}

// ---------------------------------------------------------------------------
// repair
// ---------------------------------------------------------------------------

#[rstest]
fn repair_normalises_candidate_and_reports_it(store: Store) {
    fs::write(store.canonical().join(format!("{ID}.arj")), b"ARJ body").expect("write arj");
    let exec = StubExecutor::new(
        &["arj", "unzip"],
        vec![
            ExpectedCall::succeeding("arj").with_effect(populate),
            ExpectedCall::succeeding("unzip"),
        ],
    );

    let (result, report) = run_cli(&store.pass_argv("repair", "arj"), &exec);

    assert_eq!(result.expect("repair runs"), RunStatus::Success);
    exec.assert_finished();
    assert!(store.overlay().join(format!("{ID}.zip")).is_file());
    assert_eq!(
        report,
        format!(
            "ARJ: 1 examined, 1 selected, 1 normalised, 0 empty, 0 already normalised, 0 failed\n  normalised {ID} (15 bytes)\n"
        )
    );
}

#[rstest]
fn missing_extractors_set_tools_missing_status(store: Store) {
    fs::write(store.canonical().join(format!("{ID}.lzh")), b"-lh5-").expect("write lzh");
    let exec = StubExecutor::new(&[], Vec::new());

    let (result, report) = run_cli(&store.pass_argv("repair", "lha"), &exec);

    let status = result.expect("repair runs");
    assert_eq!(status, RunStatus::ToolsMissing);
    assert_eq!(status.exit_code(), 2);
    assert!(report.contains(&format!("  failed {ID}: no LHA extractor installed (tried lha, 7z)")));
    assert!(!store.overlay().join(format!("{ID}.zip")).exists());
}

#[rstest]
fn modern_zip_is_left_alone(store: Store) {
    let canonical = modern_zip(&store.canonical(), &format!("{ID}.zip"), &[("A.TXT", b"a")]);
    let exec = StubExecutor::new(&["unzip"], Vec::new());

    let (result, report) = run_cli(&store.pass_argv("repair", "zip"), &exec);

    assert_eq!(result.expect("repair runs"), RunStatus::Success);
    assert!(report.starts_with("ZIP: 1 examined, 0 selected, 0 normalised"));
    assert!(exec.requests().is_empty());
    assert!(canonical.is_file());
    assert!(!store.overlay().join(format!("{ID}.zip")).exists());
}

#[rstest]
fn missing_overlay_stops_the_pass(store: Store) {
    fs::remove_dir(store.overlay()).expect("remove overlay");
    let exec = StubExecutor::new(&[], Vec::new());

    let (result, _) = run_cli(&store.pass_argv("repair", "zip"), &exec);

    assert!(matches!(
        result,
        Err(AppError::Pass(PassError::Overlay { .. }))
    ));
}

#[rstest]
fn missing_candidate_list_is_an_error(store: Store) {
    fs::remove_file(store.path("candidates.txt")).expect("remove candidates");
    let exec = StubExecutor::new(&[], Vec::new());

    let (result, _) = run_cli(&store.pass_argv("repair", "zip"), &exec);

    assert!(matches!(result, Err(AppError::Candidates(_))));
}

#[rstest]
fn directories_are_required(store: Store) {
    let config = text(&store.path("absent.toml"));
    let candidates = text(&store.path("candidates.txt"));
    let argv = strings(&[
        "retrofix-normalise",
        "audit",
        "--config",
        &config,
        "--candidates",
        &candidates,
    ]);
    let exec = StubExecutor::new(&[], Vec::new());

    let (result, _) = run_cli(&argv, &exec);

    assert!(matches!(
        result,
        Err(AppError::Config(ConfigError::MissingDirectory { name: "canonical" }))
    ));
}

#[rstest]
fn config_file_supplies_directories_and_tools(store: Store) {
    let config = store.path("retrofix.toml");
    fs::write(
        &config,
        format!(
            "canonical_dir = {:?}\noverlay_dir = {:?}\nverify_output = false\n[tools]\narj = \"arj-3.10\"\n",
            store.canonical(),
            store.overlay()
        ),
    )
    .expect("write config");
    fs::write(store.canonical().join(format!("{ID}.arj")), b"ARJ body").expect("write arj");
    let exec = StubExecutor::new(
        &["arj-3.10"],
        vec![ExpectedCall::succeeding("arj-3.10").with_effect(populate)],
    );
    let config = text(&config);
    let candidates = text(&store.path("candidates.txt"));
    let argv = strings(&[
        "retrofix-normalise",
        "repair",
        "-c",
        &config,
        "--candidates",
        &candidates,
        "-f",
        "arj",
    ]);

    let (result, report) = run_cli(&argv, &exec);

    assert_eq!(result.expect("repair runs"), RunStatus::Success);
    exec.assert_finished();
    assert!(report.contains(&format!("normalised {ID}")));
}

#[rstest]
fn cancelled_session_runs_no_family() {
    let dirs = Directories {
        canonical: PathBuf::from("/nonexistent/canonical"),
        overlay: PathBuf::from("/nonexistent/overlay"),
    };
    let mut source = MockCandidateSource::new();
    source.expect_candidates().never();
    let exec = StubExecutor::new(&[], Vec::new());
    let log = RecordingLog::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let session = Session::new(&exec, LogSink::new(&log)).with_cancel(cancel);
    let mut out = Vec::new();

    let status = repair_families(
        &RepairConfig::default(),
        &dirs,
        &FamilyKind::ALL,
        &source,
        &session,
        &mut out,
    )
    .expect("nothing to fail");

    assert_eq!(status, RunStatus::Success);
    assert!(out.is_empty());
}

#[rstest]
fn each_family_queries_the_candidate_source(store: Store) {
    let dirs = Directories {
        canonical: store.canonical(),
        overlay: store.overlay(),
    };
    let mut source = MockCandidateSource::new();
    source
        .expect_candidates()
        .times(2)
        .returning(|_| Ok(CandidateSet::from_unsorted([ID])));
    let exec = StubExecutor::new(&[], Vec::new());
    let log = RecordingLog::default();
    let session = Session::new(&exec, LogSink::new(&log));
    let mut out = Vec::new();

    repair_families(
        &RepairConfig::default(),
        &dirs,
        &[FamilyKind::Zip, FamilyKind::Rar],
        &source,
        &session,
        &mut out,
    )
    .expect("empty store repairs cleanly");

    let text = String::from_utf8(out).expect("report is UTF-8");
    let headers: Vec<_> = text.lines().filter_map(|l| l.split(':').next()).collect();
    assert_eq!(headers, ["ZIP", "RAR"]);
}

// ---------------------------------------------------------------------------
// audit
// ---------------------------------------------------------------------------

#[rstest]
fn audit_lists_damaged_and_untested_archives(store: Store) {
    fs::write(store.canonical().join(format!("{ID}.rar")), b"Rar!").expect("write rar");
    fs::write(store.canonical().join(format!("{OTHER}.rar")), b"Rar!").expect("write rar");
    let exec = StubExecutor::new(
        &["unrar"],
        vec![
            ExpectedCall::new(
                "unrar",
                Err(ExecError::Failed {
                    program: "unrar".to_owned(),
                    code: Some(3),
                    stderr: String::new(),
                }),
            ),
            ExpectedCall::new(
                "unrar",
                Err(ExecError::Spawn {
                    program: "unrar".to_owned(),
                    source: std::io::Error::other("exec format error"),
                }),
            ),
        ],
    );

    let (result, report) = run_cli(&store.pass_argv("audit", "rar"), &exec);

    assert_eq!(result.expect("audit runs"), RunStatus::Success);
    assert_eq!(
        report,
        format!(
            "RAR: 2 tested, 2 flagged\n  damaged {ID}\n  untested {OTHER}: cannot start unrar\n"
        )
    );
}

// ---------------------------------------------------------------------------
// methods and test
// ---------------------------------------------------------------------------

#[rstest]
fn methods_lists_codes_and_verdict() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = legacy_zip(
        dir.path(),
        "old.zip",
        &[("A.TXT", b"a"), ("B.TXT", b"b")],
        crate::method::Method::IMPLODED,
    );
    let argv = vec![
        "retrofix-normalise".to_owned(),
        "methods".to_owned(),
        path.to_string_lossy().into_owned(),
    ];
    let exec = StubExecutor::new(&[], Vec::new());

    let (result, report) = run_cli(&argv, &exec);

    assert_eq!(result.expect("methods runs"), RunStatus::Success);
    assert_eq!(report, "  6 Imploded\nmodern: no\n");
}

#[rstest]
fn methods_rejects_non_zip() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("notes.txt");
    fs::write(&path, b"not a zip").expect("write file");
    let argv = vec![
        "retrofix-normalise".to_owned(),
        "methods".to_owned(),
        path.to_string_lossy().into_owned(),
    ];
    let exec = StubExecutor::new(&[], Vec::new());

    let (result, _) = run_cli(&argv, &exec);

    assert!(matches!(result, Err(AppError::Classify(_))));
}

fn test_argv(dir: &Path, zip: &Path) -> Vec<String> {
    vec![
        "retrofix-normalise".to_owned(),
        "test".to_owned(),
        zip.to_string_lossy().into_owned(),
        "--config".to_owned(),
        dir.join("absent.toml").to_string_lossy().into_owned(),
    ]
}

#[rstest]
#[case::passes(Ok(crate::test_utils::success_output()), true)]
#[case::warning(Ok(failure_output(1, "warning: extra bytes")), true)]
#[case::damaged(Ok(failure_output(3, "bad CRC")), false)]
fn test_command_reports_unzip_verdict(
    #[case] result: Result<std::process::Output, ExecError>,
    #[case] passes: bool,
) {
    let dir = tempfile::tempdir().expect("temp dir");
    let zip = modern_zip(dir.path(), "new.zip", &[("A.TXT", b"a")]);
    let exec = StubExecutor::new(&["unzip"], vec![ExpectedCall::new("unzip", result)]);

    let (outcome, report) = run_cli(&test_argv(dir.path(), &zip), &exec);

    assert_eq!(outcome.is_ok(), passes, "unexpected outcome: {outcome:?}");
    if passes {
        assert!(report.starts_with(&zip.to_string_lossy().into_owned()));
    } else {
        assert!(matches!(outcome, Err(AppError::Test(RezipError::Verification { .. }))));
    }
}
