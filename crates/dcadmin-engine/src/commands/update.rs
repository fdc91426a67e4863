//! Self-update
//!
//! Downloads the published binary for this platform and swaps it in place of
//! the running executable. The previous binary is moved aside first and put
//! back if the swap fails.

use dcadmin_core::config::UpdateConfig;
use dcadmin_core::errors::{io_error, AdminError, ExError, ExErrorKind, Result};
use dcadmin_core::{log_op_end, log_op_error, log_op_start};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Name of the published binary
pub const BINARY_NAME: &str = "sourcegraph-server-gen";

/// Platforms binaries are published for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    LinuxAmd64,
    DarwinAmd64,
}

impl Platform {
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` for anything but Linux and macOS.
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "linux" => Ok(Platform::LinuxAmd64),
            "macos" | "darwin" => Ok(Platform::DarwinAmd64),
            other => Err(AdminError::UnsupportedPlatform {
                os: other.to_string(),
            }
            .into()),
        }
    }

    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` when not running on Linux or macOS.
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Path segment of the download URL
    pub fn segment(&self) -> &'static str {
        match self {
            Platform::LinuxAmd64 => "linux_amd64",
            Platform::DarwinAmd64 => "darwin_amd64",
        }
    }
}

/// Download location of a release, or of the latest one when `version` is
/// `None`
pub fn download_url(config: &UpdateConfig, platform: Platform, version: Option<&str>) -> String {
    match version {
        Some(v) => format!(
            "{}/{}/{}/{}",
            config.base_url,
            v,
            platform.segment(),
            BINARY_NAME
        ),
        None => format!("{}/{}/{}", config.base_url, platform.segment(), BINARY_NAME),
    }
}

/// What an update installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub url: String,
    pub installed_at: PathBuf,
    pub bytes: usize,
    /// Hex SHA-256 of the installed binary
    pub sha256: String,
}

/// Fetch `url`, requiring a 200 response
///
/// # Errors
///
/// Returns `Http` if the request fails and `UpdateNotFound` for any other
/// status.
pub fn fetch_binary(url: &str, version: Option<&str>) -> Result<Vec<u8>> {
    let http_error = |e: reqwest::Error| {
        ExError::new(ExErrorKind::Http)
            .with_op("fetch_update")
            .with_subject(url)
            .with_message(e.to_string())
    };

    let response = reqwest::blocking::get(url).map_err(http_error)?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(ExError::from(AdminError::UpdateNotFound {
            version: version.unwrap_or("latest").to_string(),
            status: status.as_u16(),
        })
        .with_subject(url));
    }
    let body = response.bytes().map_err(http_error)?;
    Ok(body.to_vec())
}

fn apply_error(message: impl Into<String>, path: &Path, source: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::UpdateApply)
        .with_op("apply_update")
        .with_subject(path.display().to_string())
        .with_message(message)
        .with_source(io_error("apply_update", source))
}

/// The renames the binary swap is built from
pub trait Renamer {
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;
}

/// [`Renamer`] backed by [`fs::rename`]
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRenamer;

impl Renamer for FsRenamer {
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        fs::rename(from, to)
    }
}

/// Replace the file at `target` with `bytes`
///
/// The new binary is staged as `.<name>.new` in the same directory, the
/// current one moved to `.<name>.old`, then the staged file renamed into
/// place. If that last rename fails the old binary is moved back.
///
/// # Errors
///
/// Returns `UpdateApply` if staging or the swap fails (with the old binary
/// restored), and `RollbackFailed` if restoring the old binary also fails.
pub fn apply_binary(target: &Path, bytes: &[u8]) -> Result<()> {
    apply_binary_with(&FsRenamer, target, bytes)
}

/// [`apply_binary`] with the renames routed through `renamer`
///
/// # Errors
///
/// See [`apply_binary`].
pub fn apply_binary_with(renamer: &dyn Renamer, target: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ExError::new(ExErrorKind::UpdateApply)
                .with_op("apply_update")
                .with_subject(target.display().to_string())
                .with_message("target has no file name")
        })?;
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let new_path = dir.join(format!(".{}.new", file_name));
    let old_path = dir.join(format!(".{}.old", file_name));

    fs::write(&new_path, bytes)
        .map_err(|e| apply_error("could not stage new binary", &new_path, e))?;
    if let Err(e) = make_executable(&new_path) {
        let _ = fs::remove_file(&new_path);
        return Err(apply_error("could not mark new binary executable", &new_path, e));
    }

    // Left over from an earlier update that could not clean up
    let _ = fs::remove_file(&old_path);

    if let Err(e) = renamer.rename(target, &old_path) {
        let _ = fs::remove_file(&new_path);
        return Err(apply_error("could not move current binary aside", target, e));
    }

    if let Err(e) = renamer.rename(&new_path, target) {
        let failure = apply_error("could not move new binary into place", target, e);
        if let Err(rollback) = renamer.rename(&old_path, target) {
            return Err(ExError::from(AdminError::RollbackFailed {
                reason: rollback.to_string(),
            })
            .with_subject(target.display().to_string())
            .with_source(failure));
        }
        let _ = fs::remove_file(&new_path);
        return Err(failure);
    }

    if let Err(e) = fs::remove_file(&old_path) {
        tracing::warn!(path = %old_path.display(), error = %e, "could not remove previous binary");
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Download `url` and install it at `target`
///
/// # Errors
///
/// See [`fetch_binary`] and [`apply_binary`].
pub fn install_from(url: &str, version: Option<&str>, target: &Path) -> Result<UpdateOutcome> {
    let start = Instant::now();
    log_op_start!("update", url = %url, target = %target.display());

    let result = fetch_binary(url, version).and_then(|bytes| {
        apply_binary(target, &bytes)?;
        Ok(UpdateOutcome {
            url: url.to_string(),
            installed_at: target.to_path_buf(),
            bytes: bytes.len(),
            sha256: sha256_hex(&bytes),
        })
    });

    match &result {
        Ok(outcome) => {
            log_op_end!(
                "update",
                duration_ms = start.elapsed().as_millis() as u64,
                bytes = outcome.bytes,
                sha256 = %outcome.sha256
            );
        }
        Err(e) => log_op_error!("update", e, duration_ms = start.elapsed().as_millis() as u64),
    }
    result
}

/// Replace the running executable with the published build of `version`
///
/// # Errors
///
/// Returns `UnsupportedPlatform` off Linux and macOS, plus anything
/// [`install_from`] returns.
pub fn run_update(config: &UpdateConfig, version: Option<&str>) -> Result<UpdateOutcome> {
    let platform = Platform::current()?;
    let url = download_url(config, platform, version);
    let target = std::env::current_exe().map_err(|e| {
        ExError::new(ExErrorKind::UpdateApply)
            .with_op("update")
            .with_message("could not locate the running executable")
            .with_source(io_error("current_exe", e))
    })?;
    install_from(&url, version, &target)
}
