//! Scoped `kubectl port-forward`
//!
//! A [`PortForward`] owns the forwarding process. Dropping it kills the
//! process, so every exit path of the caller (early `?` return or panic)
//! tears the tunnel down.

use crate::exec::{BackgroundProcess, Executor};
use dcadmin_core::errors::{AdminError, Result};
use std::net::{Ipv4Addr, TcpListener};
use std::thread;
use std::time::Duration;

/// Check that nothing is listening on the local end of a tunnel
///
/// A bound port usually means a stale forward from an earlier run; reusing
/// it would silently talk to whatever that forward points at.
///
/// # Errors
///
/// Returns `PortUnavailable` if the port cannot be bound.
pub fn probe_local_port(port: u16) -> Result<()> {
    let listener =
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).map_err(|e| AdminError::PortUnavailable {
            port,
            reason: e.to_string(),
        })?;
    drop(listener);
    Ok(())
}

/// A live local-to-pod tunnel
pub struct PortForward {
    process: Option<Box<dyn BackgroundProcess>>,
    pod: String,
    local_port: u16,
    remote_port: u16,
}

impl std::fmt::Debug for PortForward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortForward")
            .field("pod", &self.pod)
            .field("local_port", &self.local_port)
            .field("remote_port", &self.remote_port)
            .field("open", &self.process.is_some())
            .finish()
    }
}

impl PortForward {
    /// Forward `local_port` on this machine to `remote_port` on `pod`
    ///
    /// Returns after `settle`, since kubectl gives no readiness signal.
    ///
    /// # Errors
    ///
    /// Returns `PortUnavailable` if the local port is taken, or
    /// `CommandFailed` if kubectl cannot be started.
    pub fn open(
        executor: &dyn Executor,
        pod: &str,
        local_port: u16,
        remote_port: u16,
        settle: Duration,
    ) -> Result<Self> {
        probe_local_port(local_port)?;

        let argv = vec![
            "kubectl".to_string(),
            "port-forward".to_string(),
            pod.to_string(),
            format!("{}:{}", local_port, remote_port),
        ];
        let process = executor.spawn(&argv)?;
        tracing::info!(pod, local_port, remote_port, "port-forward started");

        // Constructed before sleeping so the process is owned (and killed)
        // even if the wait is interrupted by a panic.
        let forward = Self {
            process: Some(process),
            pod: pod.to_string(),
            local_port,
            remote_port,
        };
        if !settle.is_zero() {
            thread::sleep(settle);
        }
        Ok(forward)
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Tear the tunnel down, reporting failure to reap the process
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the process could not be killed or reaped.
    pub fn close(mut self) -> Result<()> {
        match self.process.take() {
            Some(mut process) => {
                process.terminate()?;
                tracing::info!(pod = %self.pod, local_port = self.local_port, "port-forward closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for PortForward {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            match process.terminate() {
                Ok(()) => tracing::debug!(pod = %self.pod, "port-forward released"),
                Err(e) => tracing::warn!(
                    command = process.describe(),
                    error = %e,
                    "failed to stop port-forward"
                ),
            }
        }
    }
}
