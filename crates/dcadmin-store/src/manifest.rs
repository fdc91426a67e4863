//! Schema version manifest (`schema.txt`)
//!
//! The file holds the decimal schema version and nothing else. Its
//! modification time stands in for the capture timestamp.

use crate::atomic::atomic_write;
use crate::layout::SnapshotDir;
use chrono::{DateTime, Utc};
use dcadmin_core::errors::{io_error, AdminError, Result};
use dcadmin_core::model::SnapshotManifest;
use std::fs;

/// Record the schema version a relational snapshot was taken at
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be written.
pub fn write_manifest(dir: &SnapshotDir, schema_version: i64) -> Result<()> {
    atomic_write(
        &dir.schema_version_path(),
        schema_version.to_string().as_bytes(),
    )
}

/// Drop the recorded schema version, if any
///
/// # Errors
///
/// Returns an `Io` error if an existing file cannot be removed.
pub fn remove_manifest(dir: &SnapshotDir) -> Result<()> {
    let path = dir.schema_version_path();
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("remove_manifest", e).with_subject(path.display().to_string())),
    }
}

/// Read the recorded schema version and capture time
///
/// Surrounding whitespace is tolerated so a hand-edited file with a trailing
/// newline still parses.
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be read and
/// `InvalidSnapshotFile` if it does not hold a decimal integer.
pub fn read_manifest(dir: &SnapshotDir) -> Result<SnapshotManifest> {
    let path = dir.schema_version_path();
    let raw = fs::read_to_string(&path)
        .map_err(|e| io_error("read_manifest", e).with_subject(path.display().to_string()))?;
    let schema_version = raw
        .trim()
        .parse::<i64>()
        .map_err(|e| AdminError::InvalidSnapshotFile {
            path: path.display().to_string(),
            reason: format!("schema version {:?} is not an integer: {}", raw.trim(), e),
        })?;
    let captured_at = fs::metadata(&path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    Ok(SnapshotManifest {
        schema_version,
        captured_at,
    })
}
