//! Atomic write primitives
//!
//! Uses temp→rename so a crashed or failed write never leaves a partial
//! snapshot file under its final name.

use dcadmin_core::errors::{io_error, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

fn temp_path_for(target: &Path) -> PathBuf {
    target.with_extension("tmp")
}

/// Atomically write bytes to a file
///
/// # Errors
///
/// Returns an `Io` error if the parent cannot be created or the write or
/// rename fails.
pub fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    let mut file = AtomicFile::create(target_path)?;
    file.write_all(content)
        .map_err(|e| io_error("write_snapshot_temp", e))?;
    file.commit()
}

/// A file that only appears under its final name once committed
///
/// Writes go to a sibling temp file. Dropping without [`AtomicFile::commit`]
/// removes the temp file and leaves any previous target untouched.
pub struct AtomicFile {
    target: PathBuf,
    temp: PathBuf,
    file: Option<File>,
}

impl AtomicFile {
    /// Open a temp file next to `target`
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the parent directory or temp file cannot be
    /// created.
    pub fn create(target: &Path) -> Result<Self> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error("create_snapshot_dir", e))?;
        }
        let temp = temp_path_for(target);
        let file = File::create(&temp).map_err(|e| io_error("create_snapshot_temp", e))?;
        Ok(Self {
            target: target.to_path_buf(),
            temp,
            file: Some(file),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flush, sync, and rename the temp file onto the target
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if syncing or renaming fails; the temp file is
    /// removed in that case.
    pub fn commit(mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(|e| io_error("flush_snapshot_temp", e))?;
            file.sync_all()
                .map_err(|e| io_error("sync_snapshot_temp", e))?;
        }
        fs::rename(&self.temp, &self.target).map_err(|e| io_error("rename_snapshot_temp", e))?;
        Ok(())
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "atomic file already committed"))
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if self.temp.exists() {
            self.file.take();
            if let Err(e) = fs::remove_file(&self.temp) {
                tracing::warn!(path = %self.temp.display(), error = %e, "could not remove temp file");
            }
        }
    }
}
