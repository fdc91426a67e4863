//! Snapshot create/restore orchestration
//!
//! ## Phases (in order):
//! 1. Verify required commands (hard stop, nothing touched)
//! 2. Restore only: warning, banner and confirmation gate
//! 3. Relational snapshot, if enabled
//! 4. Key-value snapshot, if enabled
//!
//! A failure in any phase ends the run; later phases do not start.

use crate::cluster::ClusterLocator;
use crate::exec::Executor;
use crate::kv::{KvConnector, KvCreateSummary, KvSnapshotEngine};
use crate::preflight::Preflight;
use crate::relational::{
    RelationalCreateSummary, RelationalRestoreSummary, RelationalSnapshotEngine,
};
use dcadmin_core::config::ClusterConfig;
use dcadmin_core::errors::{io_error, Result};
use dcadmin_core::model::KvRestoreReport;
use dcadmin_core::types::schema::EVENT_PHASE;
use dcadmin_core::types::RunId;
use dcadmin_core::{log_op_end, log_op_error, log_op_start};
use dcadmin_store::layout::SnapshotDir;
use dcadmin_store::manifest::read_manifest;
use std::io::{BufRead, Write};
use std::time::Instant;

/// Options shared by create and restore
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub dir: SnapshotDir,
    /// Include PostgreSQL
    pub include_relational: bool,
    /// Include Redis
    pub include_kv: bool,
    /// Restore even if the snapshot was taken at another schema version
    pub ignore_schema_difference: bool,
}

impl SnapshotOptions {
    pub fn new(dir: SnapshotDir) -> Self {
        Self {
            dir,
            include_relational: true,
            include_kv: true,
            ignore_schema_difference: false,
        }
    }
}

/// Workflow position, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    VerifyingPreconditions,
    Relational,
    KeyValue,
    Done,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::VerifyingPreconditions => "verifying-preconditions",
            Phase::Relational => "relational",
            Phase::KeyValue => "key-value",
            Phase::Done => "done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateSummary {
    pub run_id: RunId,
    pub context: String,
    pub relational: Option<RelationalCreateSummary>,
    pub kv: Option<KvCreateSummary>,
}

#[derive(Debug, Clone)]
pub struct RestoreSummary {
    pub run_id: RunId,
    pub context: String,
    pub relational: Option<RelationalRestoreSummary>,
    pub kv: Option<KvRestoreReport>,
}

/// Result of a restore that passed preflight
#[derive(Debug, Clone)]
pub enum RestoreOutcome {
    /// The operator declined; nothing was changed
    Aborted,
    Restored(RestoreSummary),
}

/// The restore gate accepts exactly `y`, ignoring case and whitespace
pub fn is_confirmation(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("y")
}

/// Read one answer from `input`; EOF and undecodable bytes count as a refusal
///
/// # Errors
///
/// Returns an `Io` error if reading fails.
pub fn read_confirmation(input: &mut dyn BufRead) -> Result<bool> {
    let mut line = Vec::new();
    let read = input
        .read_until(b'\n', &mut line)
        .map_err(|e| io_error("read_confirmation", e))?;
    Ok(read > 0 && is_confirmation(&String::from_utf8_lossy(&line)))
}

pub struct SnapshotOrchestrator<'a> {
    executor: &'a dyn Executor,
    connector: &'a dyn KvConnector,
    config: &'a ClusterConfig,
    preflight: Preflight,
    run_id: RunId,
    phase: Phase,
    history: Vec<Phase>,
}

impl<'a> SnapshotOrchestrator<'a> {
    pub fn new(
        executor: &'a dyn Executor,
        connector: &'a dyn KvConnector,
        config: &'a ClusterConfig,
    ) -> Self {
        Self {
            executor,
            connector,
            config,
            preflight: Preflight::snapshot_defaults(),
            run_id: RunId::new(),
            phase: Phase::Idle,
            history: vec![Phase::Idle],
        }
    }

    pub fn with_preflight(mut self, preflight: Preflight) -> Self {
        self.preflight = preflight;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, starting with `Idle`
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    fn enter(&mut self, phase: Phase) {
        tracing::info!(
            event = EVENT_PHASE,
            run_id = %self.run_id,
            from = self.phase.name(),
            to = phase.name(),
            "phase transition"
        );
        self.phase = phase;
        self.history.push(phase);
    }

    /// Take a snapshot of the enabled subsystems into `opts.dir`
    ///
    /// Banner lines go to `out`.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any phase.
    pub fn create(&mut self, opts: &SnapshotOptions, out: &mut dyn Write) -> Result<CreateSummary> {
        let span = tracing::info_span!("snapshot", run_id = %self.run_id);
        let _guard = span.enter();
        let start = Instant::now();
        log_op_start!("create_snapshot", run_id = %self.run_id, snapshot_dir = %opts.dir.root().display());

        let result = self.create_inner(opts, out);
        match &result {
            Ok(_) => {
                log_op_end!(
                    "create_snapshot",
                    duration_ms = start.elapsed().as_millis() as u64,
                    run_id = %self.run_id
                );
            }
            Err(e) => log_op_error!(
                "create_snapshot",
                e,
                duration_ms = start.elapsed().as_millis() as u64,
                run_id = %self.run_id
            ),
        }
        result
    }

    fn create_inner(&mut self, opts: &SnapshotOptions, out: &mut dyn Write) -> Result<CreateSummary> {
        self.enter(Phase::VerifyingPreconditions);
        self.preflight.verify()?;
        opts.dir.ensure_exists()?;

        let context = ClusterLocator::new(self.executor, self.config).current_context()?;
        writeln!(
            out,
            "Snapshotting cluster (pg={}, redis={}) {} to {}",
            opts.include_relational,
            opts.include_kv,
            context,
            opts.dir.root().display()
        )
        .map_err(|e| io_error("write_banner", e))?;

        let mut summary = CreateSummary {
            run_id: self.run_id.clone(),
            context,
            relational: None,
            kv: None,
        };

        if opts.include_relational {
            self.enter(Phase::Relational);
            let engine = RelationalSnapshotEngine::new(self.executor, self.config);
            summary.relational = Some(engine.create_snapshot(&opts.dir)?);
        }
        if opts.include_kv {
            self.enter(Phase::KeyValue);
            let engine = KvSnapshotEngine::new(self.executor, self.connector, self.config);
            summary.kv = Some(engine.create_snapshot(&opts.dir)?);
        }

        self.enter(Phase::Done);
        Ok(summary)
    }

    /// Restore the enabled subsystems from `opts.dir` after confirmation
    ///
    /// The warning and prompt go to `out`; the answer is read from `input`.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any phase. Declining the prompt is not an
    /// error; it yields [`RestoreOutcome::Aborted`].
    pub fn restore(
        &mut self,
        opts: &SnapshotOptions,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<RestoreOutcome> {
        let span = tracing::info_span!("snapshot", run_id = %self.run_id);
        let _guard = span.enter();
        let start = Instant::now();
        log_op_start!("restore_snapshot", run_id = %self.run_id, snapshot_dir = %opts.dir.root().display());

        let result = self.restore_inner(opts, input, out);
        match &result {
            Ok(RestoreOutcome::Aborted) => {
                tracing::warn!(run_id = %self.run_id, "restore declined by operator");
            }
            Ok(RestoreOutcome::Restored(_)) => {
                log_op_end!(
                    "restore_snapshot",
                    duration_ms = start.elapsed().as_millis() as u64,
                    run_id = %self.run_id
                );
            }
            Err(e) => log_op_error!(
                "restore_snapshot",
                e,
                duration_ms = start.elapsed().as_millis() as u64,
                run_id = %self.run_id
            ),
        }
        result
    }

    fn restore_inner(
        &mut self,
        opts: &SnapshotOptions,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<RestoreOutcome> {
        self.enter(Phase::VerifyingPreconditions);
        self.preflight.verify()?;

        let context = ClusterLocator::new(self.executor, self.config).current_context()?;
        write_restore_prompt(opts, &context, out).map_err(|e| io_error("write_prompt", e))?;

        if !read_confirmation(input)? {
            return Ok(RestoreOutcome::Aborted);
        }

        let mut summary = RestoreSummary {
            run_id: self.run_id.clone(),
            context,
            relational: None,
            kv: None,
        };

        if opts.include_relational {
            self.enter(Phase::Relational);
            let engine = RelationalSnapshotEngine::new(self.executor, self.config);
            summary.relational =
                Some(engine.restore_snapshot(&opts.dir, opts.ignore_schema_difference)?);
        }
        if opts.include_kv {
            self.enter(Phase::KeyValue);
            let engine = KvSnapshotEngine::new(self.executor, self.connector, self.config);
            summary.kv = Some(engine.restore_snapshot(&opts.dir)?);
        }

        self.enter(Phase::Done);
        Ok(RestoreOutcome::Restored(summary))
    }
}

fn write_restore_prompt(
    opts: &SnapshotOptions,
    context: &str,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    writeln!(
        out,
        "\n\t!!! IMPORTANT: Make sure you've set sourcegraph-frontend replica count to 0 before running this operation."
    )?;
    write!(
        out,
        "About to restore snapshot to cluster (pg={}, redis={}) {} from {}",
        opts.include_relational,
        opts.include_kv,
        context,
        opts.dir.root().display()
    )?;
    // Best effort: the files are checked properly once the restore starts.
    if let Ok(manifest) = read_manifest(&opts.dir) {
        match manifest.captured_at {
            Some(at) => write!(
                out,
                " (schema version {}, taken {})",
                manifest.schema_version,
                at.format("%Y-%m-%d %H:%M:%S UTC")
            )?,
            None => write!(out, " (schema version {})", manifest.schema_version)?,
        }
    }
    writeln!(out)?;
    write!(
        out,
        "Clear existing data and restore from snapshot? (This operation cannot be undone.) [y/N] "
    )?;
    out.flush()
}
