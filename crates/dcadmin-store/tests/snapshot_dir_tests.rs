// Integration tests for the snapshot directory
// Covers the on-disk layout the restore side depends on

use dcadmin_core::errors::ExErrorKind;
use dcadmin_core::model::KeyValueSnapshot;
use dcadmin_store::kv_file::{read_kv_snapshot, write_kv_snapshot};
use dcadmin_store::manifest::{read_manifest, write_manifest};
use dcadmin_store::SnapshotDir;
use std::fs;
use tempfile::TempDir;

fn setup_snapshot_dir() -> (TempDir, SnapshotDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp snapshot directory");
    let dir = SnapshotDir::new(temp_dir.path().join("sourcegraph-snapshot"));
    dir.ensure_exists().unwrap();
    (temp_dir, dir)
}

#[test]
fn test_kv_file_is_json_object_of_base64() {
    // Given: a snapshot with two keys
    let (_temp, dir) = setup_snapshot_dir();
    let mut snap = KeyValueSnapshot::new();
    snap.insert("user_activity:1", vec![0x01, 0x02]);
    snap.insert("user_activity:2", vec![0x03]);

    // When: it is written
    write_kv_snapshot(&dir, &snap).unwrap();

    // Then: the file is a flat JSON object of base64 strings
    let raw: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.kv_path()).unwrap()).unwrap();
    assert_eq!(raw["user_activity:1"], "AQI=");
    assert_eq!(raw["user_activity:2"], "Aw==");

    // And: it reads back identically
    assert_eq!(read_kv_snapshot(&dir).unwrap(), snap);
}

#[test]
fn test_reads_file_written_by_other_tools() {
    // Given: a file with whitespace and a key order that is not sorted
    let (_temp, dir) = setup_snapshot_dir();
    fs::write(
        dir.kv_path(),
        "{\n  \"user_activity:b\": \"Aw==\",\n  \"user_activity:a\": \"AQI=\"\n}\n",
    )
    .unwrap();

    // When / Then: both keys decode
    let snap = read_kv_snapshot(&dir).unwrap();
    assert_eq!(snap.len(), 2);
    assert_eq!(snap.get("user_activity:a"), Some(&[1u8, 2][..]));
    assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["user_activity:a", "user_activity:b"]);
}

#[test]
fn test_missing_kv_file() {
    let (_temp, dir) = setup_snapshot_dir();

    let err = read_kv_snapshot(&dir).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::MissingSnapshotFile);
}

#[test]
fn test_corrupt_kv_file() {
    let (_temp, dir) = setup_snapshot_dir();
    fs::write(dir.kv_path(), "[1, 2, 3]").unwrap();

    let err = read_kv_snapshot(&dir).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Serialization);
}

#[test]
fn test_manifest_overwrite_keeps_latest() {
    let (_temp, dir) = setup_snapshot_dir();

    write_manifest(&dir, 1).unwrap();
    write_manifest(&dir, 2).unwrap();

    assert_eq!(read_manifest(&dir).unwrap().schema_version, 2);
}
