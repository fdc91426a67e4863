// Snapshot orchestration: preflight, confirmation gate, subsystem toggles and
// phase ordering

mod common;

use common::{test_config, FakeExecutor, FakeKv, DUMP_OUTPUT, SCHEMA_VERSION};
use dcadmin_core::errors::ExErrorKind;
use dcadmin_core::model::KeyValueSnapshot;
use dcadmin_engine::commands::snapshot::{
    is_confirmation, Phase, RestoreOutcome, SnapshotOptions, SnapshotOrchestrator,
};
use dcadmin_engine::preflight::Preflight;
use dcadmin_store::kv_file::write_kv_snapshot;
use dcadmin_store::layout::SnapshotDir;
use dcadmin_store::manifest::write_manifest;
use proptest::prelude::*;
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

fn no_preflight() -> Preflight {
    Preflight::new(Vec::<String>::new())
}

fn seeded_dir() -> (TempDir, SnapshotDir) {
    let temp_dir = TempDir::new().unwrap();
    let dir = SnapshotDir::new(temp_dir.path());
    write_manifest(&dir, SCHEMA_VERSION).unwrap();
    fs::write(dir.sql_path(), DUMP_OUTPUT).unwrap();
    let kv: KeyValueSnapshot = [("user_activity:1".to_string(), b"blob".to_vec())]
        .into_iter()
        .collect();
    write_kv_snapshot(&dir, &kv).unwrap();
    (temp_dir, dir)
}

fn restore_with_answer(answer: &[u8]) -> (FakeExecutor, FakeKv, RestoreOutcome, String) {
    let (_temp_dir, dir) = seeded_dir();
    let executor = FakeExecutor::healthy_cluster();
    let kv = FakeKv::new();
    let config = test_config();
    let mut out = Vec::new();

    let outcome = SnapshotOrchestrator::new(&executor, &kv, &config)
        .with_preflight(no_preflight())
        .restore(
            &SnapshotOptions::new(dir),
            &mut Cursor::new(answer.to_vec()),
            &mut out,
        )
        .unwrap();

    (executor, kv, outcome, String::from_utf8(out).unwrap())
}

#[test]
fn test_declined_restore_touches_nothing() {
    let answers: [&[u8]; 5] = [b"n\n", b"", b"\n", b"yes\n", b"N\n"];
    for answer in answers {
        let (executor, kv, outcome, _) = restore_with_answer(answer);

        assert!(
            matches!(outcome, RestoreOutcome::Aborted),
            "answer {:?} should abort",
            String::from_utf8_lossy(answer)
        );
        assert_eq!(executor.commands(), vec!["kubectl config current-context"]);
        assert!(executor.spawned().is_empty());
        assert_eq!(kv.len(), 0);
    }
}

#[test]
fn test_confirmed_restore_runs_both_subsystems() {
    let answers: [&[u8]; 4] = [b"y\n", b" y \n", b"Y\n", b"y"];
    for answer in answers {
        let (executor, kv, outcome, _) = restore_with_answer(answer);

        let summary = match outcome {
            RestoreOutcome::Restored(summary) => summary,
            RestoreOutcome::Aborted => panic!("answer {:?} should confirm", answer),
        };
        assert_eq!(summary.context, "test-context");
        assert!(summary.relational.is_some());
        assert!(summary.kv.unwrap().is_complete());
        assert!(executor.ran("TRUNCATE"));
        assert_eq!(kv.get("user_activity:1").unwrap(), b"blob");
    }
}

#[test]
fn test_restore_prompt_warns_and_describes_snapshot() {
    let (_, _, _, out) = restore_with_answer(b"n\n");

    assert!(out.contains("!!! IMPORTANT"));
    assert!(out.contains("replica count to 0"));
    assert!(out.contains("About to restore snapshot to cluster (pg=true, redis=true) test-context from "));
    assert!(out.contains(&format!("schema version {}", SCHEMA_VERSION)));
    assert!(out.ends_with("[y/N] "));
}

#[test]
fn test_relational_runs_before_key_value() {
    let (_temp_dir, dir) = seeded_dir();
    let executor = FakeExecutor::healthy_cluster();
    let kv = FakeKv::new();
    let config = test_config();
    let mut orchestrator =
        SnapshotOrchestrator::new(&executor, &kv, &config).with_preflight(no_preflight());

    orchestrator
        .restore(
            &SnapshotOptions::new(dir),
            &mut Cursor::new(b"y\n".to_vec()),
            &mut Vec::new(),
        )
        .unwrap();

    assert_eq!(
        orchestrator.history(),
        &[
            Phase::Idle,
            Phase::VerifyingPreconditions,
            Phase::Relational,
            Phase::KeyValue,
            Phase::Done
        ]
    );
    let load = executor.position("ON_ERROR_STOP").unwrap();
    let forward = executor.position("port-forward").unwrap();
    assert!(load < forward);
}

#[test]
fn test_create_with_only_key_value() {
    let temp_dir = TempDir::new().unwrap();
    let dir = SnapshotDir::new(temp_dir.path().join("nested").join("snap"));
    let executor = FakeExecutor::healthy_cluster();
    let kv = FakeKv::new().with("user_activity:1", b"blob");
    let config = test_config();
    let mut out = Vec::new();
    let mut orchestrator =
        SnapshotOrchestrator::new(&executor, &kv, &config).with_preflight(no_preflight());

    let opts = SnapshotOptions {
        include_relational: false,
        ..SnapshotOptions::new(dir.clone())
    };
    let summary = orchestrator.create(&opts, &mut out).unwrap();

    assert!(summary.relational.is_none());
    assert_eq!(summary.kv.unwrap().captured, 1);
    assert!(!executor.ran("psql"));
    assert!(!executor.ran("pg_dump"));
    assert!(dir.kv_path().is_file());
    assert!(!dir.sql_path().exists());
    assert!(!orchestrator.history().contains(&Phase::Relational));
    assert!(String::from_utf8(out)
        .unwrap()
        .starts_with("Snapshotting cluster (pg=false, redis=true) test-context to "));
}

#[test]
fn test_create_with_only_relational() {
    let temp_dir = TempDir::new().unwrap();
    let dir = SnapshotDir::new(temp_dir.path());
    let executor = FakeExecutor::healthy_cluster();
    let config = test_config();
    let kv = FakeKv::new();
    let mut orchestrator = SnapshotOrchestrator::new(&executor, &kv, &config)
        .with_preflight(no_preflight());

    let opts = SnapshotOptions {
        include_kv: false,
        ..SnapshotOptions::new(dir.clone())
    };
    orchestrator.create(&opts, &mut Vec::new()).unwrap();

    assert!(executor.spawned().is_empty());
    assert!(!dir.kv_path().exists());
    assert_eq!(fs::read_to_string(dir.sql_path()).unwrap(), DUMP_OUTPUT);
    assert_eq!(orchestrator.phase(), Phase::Done);
}

#[test]
fn test_relational_failure_skips_key_value() {
    let temp_dir = TempDir::new().unwrap();
    let dir = SnapshotDir::new(temp_dir.path());
    let executor = FakeExecutor::healthy_cluster()
        .respond("array_to_json", "[{\"version\":3,\"dirty\":true}]");
    let config = test_config();
    let kv = FakeKv::new();
    let mut orchestrator = SnapshotOrchestrator::new(&executor, &kv, &config)
        .with_preflight(no_preflight());

    let err = orchestrator
        .create(&SnapshotOptions::new(dir), &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::DirtySchema);
    assert_eq!(orchestrator.phase(), Phase::Relational);
    assert!(executor.spawned().is_empty());
}

#[test]
fn test_missing_command_fails_before_cluster_access() {
    let (_temp_dir, dir) = seeded_dir();
    let executor = FakeExecutor::healthy_cluster();
    let config = test_config();
    let kv = FakeKv::new();
    let mut orchestrator = SnapshotOrchestrator::new(&executor, &kv, &config)
        .with_preflight(Preflight::new(["kubectl"]).with_search_path(""));

    let err = orchestrator
        .restore(
            &SnapshotOptions::new(dir),
            &mut Cursor::new(b"y\n".to_vec()),
            &mut Vec::new(),
        )
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::MissingCommand);
    assert!(err.message().contains("kubectl"));
    assert!(executor.commands().is_empty());
}

proptest! {
    #[test]
    fn prop_only_y_confirms(answer in "\\PC{0,8}") {
        let expected = answer.trim().eq_ignore_ascii_case("y");
        prop_assert_eq!(is_confirmation(&answer), expected);
    }

    #[test]
    fn prop_padded_y_confirms(left in "[ \\t]{0,4}", right in "[ \\t\\r\\n]{0,4}", upper in any::<bool>()) {
        let y = if upper { "Y" } else { "y" };
        let answer = format!("{}{}{}", left, y, right);
        prop_assert!(is_confirmation(&answer));
    }

    #[test]
    fn prop_anything_else_aborts(answer in "[a-xzA-XZ0-9 ]{1,6}") {
        prop_assert!(!is_confirmation(&answer));
    }
}
