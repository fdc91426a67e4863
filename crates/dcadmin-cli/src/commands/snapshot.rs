//! Snapshot create/restore command

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, ValueEnum};
use dcadmin_core::config::ClusterConfig;
use dcadmin_engine::commands::snapshot::{
    CreateSummary, RestoreOutcome, RestoreSummary, SnapshotOptions, SnapshotOrchestrator,
};
use dcadmin_engine::kv::RedisConnector;
use dcadmin_engine::ShellExecutor;
use dcadmin_store::layout::{SnapshotDir, DEFAULT_SNAPSHOT_DIR};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SnapshotAction {
    /// Capture the cluster's data into the snapshot directory
    Create,
    /// Replace the cluster's data with the snapshot (destructive)
    Restore,
}

impl std::fmt::Display for SnapshotAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotAction::Create => f.write_str("create"),
            SnapshotAction::Restore => f.write_str("restore"),
        }
    }
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Snapshot directory
    #[arg(short = 'd', long = "dir", default_value = DEFAULT_SNAPSHOT_DIR)]
    pub dir: PathBuf,

    /// Include Redis (-redis=false to skip)
    #[arg(
        long,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true"
    )]
    pub redis: bool,

    /// Include PostgreSQL (-pg=false to skip)
    #[arg(
        long,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true"
    )]
    pub pg: bool,

    /// Restore even if the snapshot's schema version differs from the
    /// database's
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    #[arg(value_enum)]
    pub action: SnapshotAction,
}

pub fn execute(args: SnapshotArgs) -> anyhow::Result<ExitCode> {
    let config = ClusterConfig::from_env()?;
    let executor = ShellExecutor::new();
    let connector = RedisConnector::new();
    let opts = SnapshotOptions {
        dir: SnapshotDir::new(args.dir),
        include_relational: args.pg,
        include_kv: args.redis,
        ignore_schema_difference: args.force,
    };
    let mut orchestrator = SnapshotOrchestrator::new(&executor, &connector, &config);
    tracing::debug!(run_id = %orchestrator.run_id(), action = %args.action, "snapshot command");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.action {
        SnapshotAction::Create => {
            let summary = orchestrator.create(&opts, &mut out)?;
            print_create_summary(&mut out, &summary)?;
            Ok(ExitCode::SUCCESS)
        }
        SnapshotAction::Restore => {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            match orchestrator.restore(&opts, &mut input, &mut out)? {
                RestoreOutcome::Aborted => {
                    eprintln!("Aborting");
                    Ok(ExitCode::from(1))
                }
                RestoreOutcome::Restored(summary) => {
                    print_restore_summary(&mut out, &summary)?;
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
    }
}

fn print_create_summary(out: &mut dyn Write, summary: &CreateSummary) -> io::Result<()> {
    if let Some(pg) = &summary.relational {
        writeln!(
            out,
            "Created PostgreSQL snapshot: schema version {}, {} tables from {}.",
            pg.schema_version,
            pg.tables.len(),
            pg.pod
        )?;
    }
    if let Some(kv) = &summary.kv {
        writeln!(
            out,
            "Created Redis snapshot: {} keys from {}.",
            kv.captured, kv.pod
        )?;
        if !kv.skipped.is_empty() {
            eprintln!(
                "WARNING: {} keys expired before they could be captured",
                kv.skipped.len()
            );
        }
    }
    Ok(())
}

fn print_restore_summary(out: &mut dyn Write, summary: &RestoreSummary) -> io::Result<()> {
    if let Some(pg) = &summary.relational {
        if pg.forced() {
            eprintln!(
                "WARNING: restored schema version {} data into schema version {}",
                pg.snapshot_version, pg.current_version
            );
        }
        writeln!(
            out,
            "Restored PostgreSQL: {} tables into {}.",
            pg.truncated.len(),
            pg.pod
        )?;
    }
    if let Some(kv) = &summary.kv {
        writeln!(out, "Restored Redis: {} of {} keys.", kv.restored, kv.total)?;
        for failure in &kv.failed {
            eprintln!(
                "WARNING: RESTORE of key {:?} failed: {}",
                failure.key, failure.reason
            );
        }
    }
    Ok(())
}
