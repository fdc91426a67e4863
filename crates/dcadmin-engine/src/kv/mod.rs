//! Redis snapshot engine
//!
//! The store is reached through a `kubectl port-forward` held open for the
//! duration of one create or restore. Connections come from a
//! [`KvConnector`] passed in by the caller.

pub mod redis_session;

use crate::cluster::ClusterLocator;
use crate::exec::Executor;
use crate::tunnel::{probe_local_port, PortForward};
use dcadmin_core::config::ClusterConfig;
use dcadmin_core::errors::{AdminError, ExError, ExErrorKind, Result};
use dcadmin_core::model::{KeyFailure, KeyValueSnapshot, KvRestoreReport, WorkloadRole};
use dcadmin_core::{log_op_end, log_op_error, log_op_start};
use dcadmin_store::kv_file::{read_kv_snapshot, write_kv_snapshot};
use dcadmin_store::layout::SnapshotDir;
use std::time::Instant;

pub use redis_session::RedisConnector;

/// One open connection to the key-value store
pub trait KvSession {
    /// Names of the keys matching a glob pattern
    ///
    /// # Errors
    ///
    /// Returns `KvCommand` or `KvConnection` on failure.
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>>;

    /// Serialized values of `keys`, in request order
    ///
    /// All requests are sent before any reply is read. A key that no longer
    /// exists yields `None`.
    ///
    /// # Errors
    ///
    /// Returns `KvCommand` or `KvConnection` on failure.
    fn dump_pipelined(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// `RESTORE key 0 blob REPLACE`
    ///
    /// # Errors
    ///
    /// Returns `KvCommand` if the server rejects the payload.
    fn restore_replace(&mut self, key: &str, blob: &[u8]) -> Result<()>;

    /// # Errors
    ///
    /// Returns `KvConnection` if the server does not answer.
    fn ping(&mut self) -> Result<()>;
}

/// Opens sessions against the local end of a tunnel
pub trait KvConnector {
    /// # Errors
    ///
    /// Returns `KvConnection` if nothing accepts on `local_port`.
    fn connect(&self, local_port: u16) -> Result<Box<dyn KvSession>>;
}

/// What a key-value create captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvCreateSummary {
    pub pod: String,
    pub matched: usize,
    pub captured: usize,
    /// Keys that disappeared between KEYS and DUMP
    pub skipped: Vec<String>,
}

pub struct KvSnapshotEngine<'a> {
    executor: &'a dyn Executor,
    connector: &'a dyn KvConnector,
    config: &'a ClusterConfig,
}

impl<'a> KvSnapshotEngine<'a> {
    pub fn new(
        executor: &'a dyn Executor,
        connector: &'a dyn KvConnector,
        config: &'a ClusterConfig,
    ) -> Self {
        Self {
            executor,
            connector,
            config,
        }
    }

    fn open_tunnel(&self) -> Result<PortForward> {
        // Checked before the pod lookup so a stale forward is reported
        // without a round trip to the cluster.
        probe_local_port(self.config.local_kv_port)?;
        let pod =
            ClusterLocator::new(self.executor, self.config).locate(WorkloadRole::KeyValueStore)?;
        PortForward::open(
            self.executor,
            &pod,
            self.config.local_kv_port,
            self.config.remote_kv_port,
            self.config.tunnel_settle,
        )
    }

    /// Capture every key matching the configured pattern into
    /// `redis-store.json`
    ///
    /// # Errors
    ///
    /// Fails on tunnel, connection or command errors, and with
    /// `UnexpectedOutput` if the pipeline returns the wrong number of
    /// replies. The tunnel is closed on every path.
    pub fn create_snapshot(&self, dir: &SnapshotDir) -> Result<KvCreateSummary> {
        let start = Instant::now();
        log_op_start!("create_kv", snapshot_dir = %dir.root().display());

        match self.create_inner(dir) {
            Ok(summary) => {
                log_op_end!(
                    "create_kv",
                    duration_ms = start.elapsed().as_millis() as u64,
                    pod = %summary.pod,
                    key_count = summary.captured
                );
                Ok(summary)
            }
            Err(e) => {
                log_op_error!(
                    "create_kv",
                    &e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(e)
            }
        }
    }

    fn create_inner(&self, dir: &SnapshotDir) -> Result<KvCreateSummary> {
        let tunnel = self.open_tunnel()?;
        let mut session = self.connector.connect(tunnel.local_port())?;

        let keys = session.keys(&self.config.kv_key_pattern)?;
        let blobs = session.dump_pipelined(&keys)?;
        drop(session);

        let (snapshot, skipped) = assemble_snapshot(keys.clone(), blobs)?;
        write_kv_snapshot(dir, &snapshot)?;

        let pod = tunnel.pod().to_string();
        tunnel.close()?;
        Ok(KvCreateSummary {
            pod,
            matched: keys.len(),
            captured: snapshot.len(),
            skipped,
        })
    }

    /// Replay `redis-store.json` key by key
    ///
    /// A key the server rejects is logged and recorded in the report; the
    /// remaining keys are still restored.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot cannot be read, the tunnel or connection cannot
    /// be set up, or the closing PING fails (`KvRestoreFailed`).
    pub fn restore_snapshot(&self, dir: &SnapshotDir) -> Result<KvRestoreReport> {
        let start = Instant::now();
        log_op_start!("restore_kv", snapshot_dir = %dir.root().display());

        match self.restore_inner(dir) {
            Ok(report) => {
                log_op_end!(
                    "restore_kv",
                    duration_ms = start.elapsed().as_millis() as u64,
                    key_count = report.restored,
                    failed_count = report.failed.len()
                );
                Ok(report)
            }
            Err(e) => {
                log_op_error!(
                    "restore_kv",
                    &e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(e)
            }
        }
    }

    fn restore_inner(&self, dir: &SnapshotDir) -> Result<KvRestoreReport> {
        let snapshot = read_kv_snapshot(dir)?;

        let tunnel = self.open_tunnel()?;
        let mut session = self.connector.connect(tunnel.local_port())?;

        let report = restore_each(session.as_mut(), &snapshot);

        session.ping().map_err(|e| {
            ExError::from(AdminError::KvRestoreFailed {
                reason: e.message().to_string(),
            })
            .with_source(e)
        })?;
        drop(session);

        tunnel.close()?;
        Ok(report)
    }
}

/// Restore every entry individually, collecting failures
pub fn restore_each(session: &mut dyn KvSession, snapshot: &KeyValueSnapshot) -> KvRestoreReport {
    let total = snapshot.len();
    let mut report = KvRestoreReport {
        total,
        ..KvRestoreReport::default()
    };
    for (i, (key, blob)) in snapshot.iter().enumerate() {
        let position = format!("{}/{}", i + 1, total);
        match session.restore_replace(key, blob) {
            Ok(()) => {
                tracing::info!(op = "restore_kv_key", key, position = %position, "restored key");
                report.restored += 1;
            }
            Err(e) => {
                tracing::warn!(
                    op = "restore_kv_key",
                    key,
                    position = %position,
                    error = %e.message(),
                    "RESTORE failed"
                );
                report.failed.push(KeyFailure {
                    key: key.to_string(),
                    reason: e.message().to_string(),
                });
            }
        }
    }
    report
}

/// Pair keys with their DUMP replies, skipping keys that vanished
///
/// # Errors
///
/// Returns `UnexpectedOutput` if the counts differ.
pub fn assemble_snapshot(
    keys: Vec<String>,
    blobs: Vec<Option<Vec<u8>>>,
) -> Result<(KeyValueSnapshot, Vec<String>)> {
    if keys.len() != blobs.len() {
        return Err(ExError::new(ExErrorKind::UnexpectedOutput)
            .with_op("create_kv")
            .with_message(format!(
                "requested {} DUMP replies, received {}",
                keys.len(),
                blobs.len()
            )));
    }
    let mut snapshot = KeyValueSnapshot::new();
    let mut skipped = Vec::new();
    for (key, blob) in keys.into_iter().zip(blobs) {
        match blob {
            Some(blob) => snapshot.insert(key, blob),
            None => {
                tracing::warn!(key = %key, "key expired before DUMP, skipping");
                skipped.push(key);
            }
        }
    }
    Ok((snapshot, skipped))
}
