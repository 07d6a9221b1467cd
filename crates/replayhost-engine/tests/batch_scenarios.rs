//! End-to-end batch scenarios against the fixture parser module.

use std::path::PathBuf;

use replayhost_engine::config::{parse_harness_str, validate_harness};
use replayhost_engine::{BatchReport, FileReport, HarnessConfig, Session};
use replayhost_types::{CallProtocol, OutcomeKind};
use tempfile::TempDir;

const PARSER_WAT: &str = include_str!("../../../tests/fixtures/modules/replay_parser.wat");

fn variant(from: &str, to: &str) -> String {
    assert!(PARSER_WAT.contains(from), "fixture lacks `{from}`");
    PARSER_WAT.replace(from, to)
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    config: HarnessConfig,
}

fn harness(wat: &str, files: &[(&str, &[u8])], extra_yaml: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("demos");
    std::fs::create_dir(&root).unwrap();
    for (name, bytes) in files {
        std::fs::write(root.join(name), bytes).unwrap();
    }
    let module = dir.path().join("parser.wat");
    std::fs::write(&module, wat).unwrap();

    let yaml = format!(
        "version: \"1.0\"\nmodule: \"{}\"\nroot: \"{}\"\ncache:\n  aot: false\n{extra_yaml}",
        module.display(),
        root.display()
    );
    let config = parse_harness_str(&yaml).unwrap();
    validate_harness(&config).unwrap();
    Harness {
        _dir: dir,
        root,
        config,
    }
}

async fn run(h: &Harness) -> BatchReport {
    let mut session = Session::open(&h.config).await.unwrap();
    session.run_batch().await.unwrap()
}

fn file<'a>(report: &'a BatchReport, name: &str) -> &'a FileReport {
    report
        .files
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no report for {name}"))
}

#[tokio::test]
async fn only_matching_extension_is_processed() {
    let h = harness(
        PARSER_WAT,
        &[("a.sdfz", b"sdfzgame-a"), ("b.txt", b"sdfzgame-b")],
        "",
    );
    let report = run(&h).await;

    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    let a = file(&report, "a.sdfz");
    assert_eq!(a.outcome, OutcomeKind::Success);
    assert_eq!(a.game_id.as_deref(), Some("game-a"));
    assert_eq!(a.input_bytes, 10);
    assert!(report.files.iter().all(|f| f.name != "b.txt"));
}

#[tokio::test]
async fn null_allocator_fails_every_file_and_batch_completes() {
    let wat = variant(
        "(global $alloc_enabled i32 (i32.const 1))",
        "(global $alloc_enabled i32 (i32.const 0))",
    );
    let h = harness(
        &wat,
        &[("a.sdfz", b"sdfz1"), ("b.sdfz", b"sdfz2"), ("c.sdfz", b"sdfz3")],
        "",
    );
    let report = run(&h).await;

    assert_eq!(report.attempted, 3);
    assert_eq!(report.failed, 3);
    assert!(report
        .files
        .iter()
        .all(|f| f.outcome == OutcomeKind::AllocationFailed));
    assert_eq!(report.resets, 3);
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_file_counts_as_attempt_with_reset() {
    use std::os::unix::fs::PermissionsExt;

    let h = harness(
        PARSER_WAT,
        &[("a.sdfz", b"sdfzgame-a"), ("b.sdfz", b"sdfzgame-b")],
        "",
    );
    let locked = h.root.join("b.sdfz");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    if std::fs::read(&locked).is_ok() {
        // Permission bits do not bind this user (root); nothing to exercise.
        return;
    }

    let report = run(&h).await;
    assert_eq!(file(&report, "a.sdfz").outcome, OutcomeKind::Success);
    assert_eq!(file(&report, "b.sdfz").outcome, OutcomeKind::InputUnreadable);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.resets, report.attempted);
}

#[tokio::test]
async fn corrupted_input_fails_and_next_file_still_parses() {
    let h = harness(
        PARSER_WAT,
        &[("bad.sdfz", b"garbage-bytes"), ("good.sdfz", b"sdfzgood")],
        "",
    );
    let report = run(&h).await;

    assert_eq!(file(&report, "bad.sdfz").outcome, OutcomeKind::ParseFailed);
    assert_eq!(file(&report, "good.sdfz").game_id.as_deref(), Some("good"));
    assert_eq!(report.resets, 2);
    assert_eq!(report.reset_failures, 0);
}

#[tokio::test]
async fn same_input_twice_yields_same_game_id() {
    let h = harness(PARSER_WAT, &[("a.sdfz", b"sdfzrepeat")], "iterations: 2\n");
    let report = run(&h).await;

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files[0].iteration, 0);
    assert_eq!(report.files[1].iteration, 1);
    assert_eq!(report.files[0].game_id, report.files[1].game_id);
    assert_eq!(report.files[0].game_id.as_deref(), Some("repeat"));
}

#[tokio::test]
async fn one_reset_per_attempt() {
    let files: Vec<(String, Vec<u8>)> = (0..5)
        .map(|i| (format!("m{i}.sdfz"), format!("sdfzgame-{i}").into_bytes()))
        .collect();
    let borrowed: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(n, b)| (n.as_str(), b.as_slice()))
        .collect();
    let h = harness(PARSER_WAT, &borrowed, "iterations: 3\n");
    let report = run(&h).await;

    assert_eq!(report.attempted, 15);
    assert_eq!(report.succeeded, 15);
    assert_eq!(report.resets, 15);
}

#[tokio::test]
async fn many_iterations_do_not_exhaust_memory() {
    let big = {
        let mut bytes = b"sdfz".to_vec();
        bytes.extend(std::iter::repeat(b'x').take(200_000));
        bytes
    };
    let h = harness(PARSER_WAT, &[("big.sdfz", &big)], "iterations: 50\n");
    let report = run(&h).await;
    assert_eq!(report.succeeded, 50);
}

#[tokio::test]
async fn oversized_input_is_allocation_failure_then_recovers() {
    let mut huge = b"sdfz".to_vec();
    huge.resize(2 << 20, b'x');
    let h = harness(
        PARSER_WAT,
        &[("huge.sdfz", &huge), ("small.sdfz", b"sdfzsmall")],
        "",
    );
    let report = run(&h).await;

    let huge_report = file(&report, "huge.sdfz");
    assert_eq!(huge_report.outcome, OutcomeKind::AllocationFailed);
    assert_eq!(huge_report.input_bytes, 2 << 20);
    assert_eq!(file(&report, "small.sdfz").outcome, OutcomeKind::Success);
}

#[tokio::test]
async fn unparseable_output_is_malformed() {
    let h = harness(PARSER_WAT, &[("q.sdfz", b"sdfzbad\"id")], "");
    let report = run(&h).await;
    let q = file(&report, "q.sdfz");
    assert_eq!(q.outcome, OutcomeKind::MalformedOutput);
    assert!(q.message.as_deref().unwrap().contains("not JSON"));
}

#[tokio::test]
async fn null_output_pointer_is_output_unavailable() {
    let h = harness(PARSER_WAT, &[("a.sdfz", b"sdfzx")], "mode: 255\n");
    let report = run(&h).await;
    assert_eq!(file(&report, "a.sdfz").outcome, OutcomeKind::OutputUnavailable);
}

#[tokio::test]
async fn trap_is_recorded_and_batch_continues() {
    let h = harness(
        PARSER_WAT,
        &[("a.sdfz", b"sdfza"), ("b.sdfz", b"sdfzb")],
        "mode: 254\n",
    );
    let report = run(&h).await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.failures_by_kind()[&OutcomeKind::ModuleTrap], 2);
    assert_eq!(report.resets, 2);
    assert_eq!(report.reset_failures, 0);
}

#[tokio::test]
async fn path_protocol_without_allocator() {
    let wat = variant(r#"(func $alloc (export "alloc")"#, "(func $alloc");
    let h = harness(&wat, &[("a.sdfz", b"replay")], "guest_root: /replays\n");
    let mut session = Session::open(&h.config).await.unwrap();
    assert_eq!(session.instance().protocol(), CallProtocol::Path);

    let report = session.run_batch().await.unwrap();
    let a = file(&report, "a.sdfz");
    assert_eq!(a.game_id.as_deref(), Some("/replays/a.sdfz"));
    assert_eq!(a.input_bytes, 6);
}

#[tokio::test]
async fn path_longer_than_reserved_region_is_rejected() {
    let h = harness(
        PARSER_WAT,
        &[("a-rather-long-replay-name.sdfz", b"sdfzx")],
        "protocol: path\nlimits:\n  path_region_bytes: 8\n",
    );
    let report = run(&h).await;
    assert_eq!(report.files[0].outcome, OutcomeKind::PathTooLong);
    assert_eq!(report.resets, 1);
}

#[tokio::test]
async fn trapping_cleanup_is_counted_but_not_fatal() {
    let wat = variant(
        r#"(func (export "cleanup")"#,
        r#"(func (export "cleanup") unreachable"#,
    );
    let h = harness(&wat, &[("a.sdfz", b"sdfza"), ("b.sdfz", b"sdfzb")], "");
    let report = run(&h).await;

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.resets, 2);
    assert_eq!(report.reset_failures, 2);
}

#[tokio::test]
async fn parse_single_file() {
    let h = harness(PARSER_WAT, &[("one.sdfz", b"sdfzsolo")], "");
    let mut session = Session::open(&h.config).await.unwrap();

    let output = session.parse_file("one.sdfz").await.unwrap();
    assert_eq!(output.game_id, "solo");
    assert_eq!(output.document["header"]["game_id"], "solo");
    assert_eq!(session.instance().resets(), 1);

    assert!(session.parse_file("../one.sdfz").await.is_err());
    let err = session.parse_file("missing.sdfz").await.unwrap_err();
    assert!(err.to_string().contains("Failed to read replay"));
}

#[tokio::test]
async fn missing_export_fails_session_open() {
    let wat = variant(r#"(func (export "getOutput")"#, "(func $get_output");
    let h = harness(&wat, &[], "");
    let err = Session::open(&h.config).await.err().expect("getOutput is required");
    assert!(format!("{err:#}").contains("getOutput"), "got: {err:#}");
}

#[tokio::test]
async fn empty_root_yields_empty_report() {
    let h = harness(PARSER_WAT, &[], "");
    let report = run(&h).await;
    assert_eq!(report.attempted, 0);
    assert_eq!(report.resets, 0);
    assert!(h.root.exists());
}
