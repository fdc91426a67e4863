//! Required-command checks run before any cluster interaction

use dcadmin_core::errors::{AdminError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Commands the snapshot workflow shells out to directly
pub const SNAPSHOT_REQUIRED_COMMANDS: &[&str] = &["bash", "kubectl", "cat"];

/// Verifies that external commands resolve on `PATH`
#[derive(Debug, Clone)]
pub struct Preflight {
    required: Vec<String>,
    search_path: Option<OsString>,
}

impl Preflight {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            search_path: None,
        }
    }

    pub fn snapshot_defaults() -> Self {
        Self::new(SNAPSHOT_REQUIRED_COMMANDS.iter().copied())
    }

    /// Search `path` instead of the process `PATH`
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// # Errors
    ///
    /// Returns `MissingCommand` naming the first command that does not
    /// resolve.
    pub fn verify(&self) -> Result<()> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();
        for command in &self.required {
            match find_on_path(command, &search_path) {
                Some(path) => tracing::debug!(command = %command, path = %path.display(), "found"),
                None => {
                    return Err(AdminError::MissingCommand {
                        command: command.clone(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }
}

/// First executable named `command` in the directories of `search_path`
pub fn find_on_path(command: &str, search_path: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
