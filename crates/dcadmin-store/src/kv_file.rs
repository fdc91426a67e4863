//! Key-value snapshot file (`redis-store.json`)

use crate::atomic::atomic_write;
use crate::layout::{require_regular_file, SnapshotDir};
use dcadmin_core::errors::{io_error, serde_error, Result};
use dcadmin_core::model::KeyValueSnapshot;
use std::fs::File;
use std::io::BufReader;

/// Persist a key-value snapshot as one JSON object
///
/// # Errors
///
/// Returns a `Serialization` or `Io` error.
pub fn write_kv_snapshot(dir: &SnapshotDir, snapshot: &KeyValueSnapshot) -> Result<()> {
    let bytes = serde_json::to_vec(snapshot).map_err(|e| serde_error("encode_kv_snapshot", e))?;
    atomic_write(&dir.kv_path(), &bytes)
}

/// Load a key-value snapshot
///
/// # Errors
///
/// Returns `MissingSnapshotFile` if the file is absent, and a
/// `Serialization` error if it is not a JSON object of base64 strings.
pub fn read_kv_snapshot(dir: &SnapshotDir) -> Result<KeyValueSnapshot> {
    let path = dir.kv_path();
    require_regular_file(&path)?;
    let file = File::open(&path)
        .map_err(|e| io_error("read_kv_snapshot", e).with_subject(path.display().to_string()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        serde_error("decode_kv_snapshot", e).with_subject(path.display().to_string())
    })
}
