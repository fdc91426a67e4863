//! Snapshot directory layout

use dcadmin_core::errors::{io_error, AdminError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Decimal schema version of the relational snapshot
pub const SCHEMA_VERSION_FILE: &str = "schema.txt";
/// Data-only relational dump
pub const SQL_FILE: &str = "snapshot.sql";
/// Key-value snapshot as a JSON object of base64 blobs
pub const KV_FILE: &str = "redis-store.json";

/// Default directory used by the CLI
pub const DEFAULT_SNAPSHOT_DIR: &str = "sourcegraph-snapshot";

/// A snapshot directory on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema_version_path(&self) -> PathBuf {
        self.root.join(SCHEMA_VERSION_FILE)
    }

    pub fn sql_path(&self) -> PathBuf {
        self.root.join(SQL_FILE)
    }

    pub fn kv_path(&self) -> PathBuf {
        self.root.join(KV_FILE)
    }

    /// Create the directory and any missing parents
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the directory cannot be created.
    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            io_error("create_snapshot_dir", e).with_subject(self.root.display().to_string())
        })
    }

    /// Check both relational snapshot files are present as regular files
    ///
    /// # Errors
    ///
    /// Returns `MissingSnapshotFile` naming the first file that is absent or
    /// not a regular file.
    pub fn require_relational_files(&self) -> Result<()> {
        for path in [self.sql_path(), self.schema_version_path()] {
            require_regular_file(&path)?;
        }
        Ok(())
    }
}

/// Fail unless `path` exists and is a regular file
///
/// # Errors
///
/// Returns `MissingSnapshotFile` otherwise.
pub fn require_regular_file(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(AdminError::MissingSnapshotFile {
            path: path.display().to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcadmin_core::errors::ExErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let dir = SnapshotDir::new("snap");
        assert_eq!(dir.schema_version_path(), Path::new("snap/schema.txt"));
        assert_eq!(dir.sql_path(), Path::new("snap/snapshot.sql"));
        assert_eq!(dir.kv_path(), Path::new("snap/redis-store.json"));
    }

    #[test]
    fn test_require_relational_files_missing_sql() {
        let temp_dir = TempDir::new().unwrap();
        let dir = SnapshotDir::new(temp_dir.path());
        fs::write(dir.schema_version_path(), "1").unwrap();

        let err = dir.require_relational_files().unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::MissingSnapshotFile);
        assert!(err.subject().unwrap().ends_with("snapshot.sql"));
    }

    #[test]
    fn test_require_relational_files_directory_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = SnapshotDir::new(temp_dir.path());
        fs::write(dir.sql_path(), "").unwrap();
        fs::create_dir(dir.schema_version_path()).unwrap();

        let err = dir.require_relational_files().unwrap_err();
        assert!(err.subject().unwrap().ends_with("schema.txt"));
    }

    #[test]
    fn test_ensure_exists_is_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let dir = SnapshotDir::new(temp_dir.path().join("a").join("b"));

        dir.ensure_exists().unwrap();
        dir.ensure_exists().unwrap();
        assert!(dir.root().is_dir());
    }
}
