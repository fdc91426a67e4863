//! PostgreSQL snapshot engine
//!
//! ## Create
//! 1. Locate the database pod
//! 2. Read `schema_migrations` (exactly one clean row)
//! 3. Enumerate public base tables, excluding the migrations table
//! 4. `pg_dump -a` the tables into a temp file next to `snapshot.sql`
//! 5. Remove `schema.txt`, rename the dump into place, then write the
//!    version to `schema.txt`. A failed dump leaves the previous pair intact.
//!
//! ## Restore
//! 1. Both snapshot files must exist, before any query is issued
//! 2. Live schema version must be clean and equal the recorded one (unless
//!    forced)
//! 3. `TRUNCATE ... RESTART IDENTITY` every table in one statement
//! 4. Pipe `snapshot.sql` into `psql` with `ON_ERROR_STOP=1`

use crate::cluster::ClusterLocator;
use crate::exec::{shell_quote, Executor};
use dcadmin_core::config::ClusterConfig;
use dcadmin_core::errors::{AdminError, ExError, ExErrorKind, Result};
use dcadmin_core::model::{SchemaVersionRecord, WorkloadRole};
use dcadmin_core::{log_op_end, log_op_error, log_op_start};
use dcadmin_store::atomic::{atomic_write, AtomicFile};
use dcadmin_store::layout::SnapshotDir;
use dcadmin_store::manifest::{read_manifest, remove_manifest, write_manifest};
use std::time::Instant;

/// What a relational create produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalCreateSummary {
    pub pod: String,
    pub schema_version: i64,
    /// Tables in catalog order
    pub tables: Vec<String>,
}

/// What a relational restore did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalRestoreSummary {
    pub pod: String,
    pub snapshot_version: i64,
    pub current_version: i64,
    pub truncated: Vec<String>,
}

impl RelationalRestoreSummary {
    /// True when the restore went ahead across a schema version difference
    pub fn forced(&self) -> bool {
        self.snapshot_version != self.current_version
    }
}

pub struct RelationalSnapshotEngine<'a> {
    executor: &'a dyn Executor,
    config: &'a ClusterConfig,
}

impl<'a> RelationalSnapshotEngine<'a> {
    pub fn new(executor: &'a dyn Executor, config: &'a ClusterConfig) -> Self {
        Self { executor, config }
    }

    /// Current schema version of the live database on `pod`
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedSchemaRows` unless exactly one row exists,
    /// `DirtySchema` if it is dirty, and `UnexpectedOutput` if psql prints
    /// something that is not the expected JSON.
    pub fn schema_version(&self, pod: &str) -> Result<SchemaVersionRecord> {
        let command = schema_version_command(pod, self.config);
        let out = self.executor.run(&command)?;
        let rows = parse_schema_rows(&String::from_utf8_lossy(&out))
            .map_err(|e| e.with_command(command))?;
        SchemaVersionRecord::from_rows(rows)
    }

    /// User tables of the live database in catalog order
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` if the query fails.
    pub fn list_tables(&self, pod: &str) -> Result<Vec<String>> {
        let out = self.executor.run(&list_tables_command(pod, self.config))?;
        Ok(parse_table_list(&String::from_utf8_lossy(&out)))
    }

    /// # Errors
    ///
    /// Fails if the pod cannot be found, the schema is not in a single clean
    /// version, or `pg_dump` fails. A failed dump leaves any previous
    /// `snapshot.sql` in place.
    pub fn create_snapshot(&self, dir: &SnapshotDir) -> Result<RelationalCreateSummary> {
        let start = Instant::now();
        log_op_start!("create_relational", snapshot_dir = %dir.root().display());

        match self.create_inner(dir) {
            Ok(summary) => {
                log_op_end!(
                    "create_relational",
                    duration_ms = start.elapsed().as_millis() as u64,
                    pod = %summary.pod,
                    table_count = summary.tables.len()
                );
                Ok(summary)
            }
            Err(e) => {
                log_op_error!(
                    "create_relational",
                    &e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(e)
            }
        }
    }

    fn create_inner(&self, dir: &SnapshotDir) -> Result<RelationalCreateSummary> {
        let pod = ClusterLocator::new(self.executor, self.config)
            .locate(WorkloadRole::RelationalDatabase)?;

        let record = self.schema_version(&pod)?;
        let tables = self.list_tables(&pod)?;

        let staged = if tables.is_empty() {
            tracing::warn!(pod = %pod, "no user tables found, writing empty dump");
            None
        } else {
            let mut file = AtomicFile::create(&dir.sql_path())?;
            self.executor
                .run_to(&dump_command(&pod, self.config, &tables), &mut file)?;
            Some(file)
        };

        // schema.txt is written last; until then the directory has no version
        remove_manifest(dir)?;
        match staged {
            Some(file) => file.commit()?,
            None => atomic_write(&dir.sql_path(), b"")?,
        }
        write_manifest(dir, record.version)?;

        Ok(RelationalCreateSummary {
            pod,
            schema_version: record.version,
            tables,
        })
    }

    /// # Errors
    ///
    /// Fails before touching the database if a snapshot file is missing, the
    /// live schema is dirty, or the versions differ and `ignore_schema_difference`
    /// is false. After TRUNCATE, fails if `psql` rejects any statement.
    pub fn restore_snapshot(
        &self,
        dir: &SnapshotDir,
        ignore_schema_difference: bool,
    ) -> Result<RelationalRestoreSummary> {
        let start = Instant::now();
        log_op_start!("restore_relational", snapshot_dir = %dir.root().display());

        match self.restore_inner(dir, ignore_schema_difference) {
            Ok(summary) => {
                log_op_end!(
                    "restore_relational",
                    duration_ms = start.elapsed().as_millis() as u64,
                    pod = %summary.pod,
                    table_count = summary.truncated.len()
                );
                Ok(summary)
            }
            Err(e) => {
                log_op_error!(
                    "restore_relational",
                    &e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(e)
            }
        }
    }

    fn restore_inner(
        &self,
        dir: &SnapshotDir,
        ignore_schema_difference: bool,
    ) -> Result<RelationalRestoreSummary> {
        dir.require_relational_files()?;

        let pod = ClusterLocator::new(self.executor, self.config)
            .locate(WorkloadRole::RelationalDatabase)?;

        let current = self.schema_version(&pod)?;
        let manifest = read_manifest(dir)?;
        if manifest.schema_version != current.version {
            if !ignore_schema_difference {
                return Err(AdminError::SchemaVersionMismatch {
                    snapshot: manifest.schema_version,
                    current: current.version,
                }
                .into());
            }
            tracing::warn!(
                snapshot = manifest.schema_version,
                current = current.version,
                "restoring across a schema version difference"
            );
        }

        let tables = self.list_tables(&pod)?;
        match truncate_sql(&tables) {
            Some(sql) => {
                self.executor.run(&truncate_command(&pod, self.config, &sql))?;
                tracing::info!(pod = %pod, table_count = tables.len(), "truncated tables");
            }
            None => tracing::warn!(pod = %pod, "no user tables to truncate"),
        }

        self.executor.run(&restore_command(
            &pod,
            self.config,
            &dir.sql_path().display().to_string(),
        ))?;

        Ok(RelationalRestoreSummary {
            pod,
            snapshot_version: manifest.schema_version,
            current_version: current.version,
            truncated: tables,
        })
    }
}

// ========== Command construction ==========

pub fn schema_version_command(pod: &str, config: &ClusterConfig) -> String {
    format!(
        "kubectl exec {} -- psql -U {} -t -c 'select array_to_json(array_agg({table})) from {table}'",
        pod,
        config.db_user,
        table = config.migrations_table
    )
}

pub fn list_tables_command(pod: &str, config: &ClusterConfig) -> String {
    format!(
        "kubectl exec {} -- psql -t -U {} -c \"SELECT table_name FROM information_schema.tables \
         WHERE table_schema='public' AND table_type='BASE TABLE' AND table_name != '{}'\"",
        pod, config.db_user, config.migrations_table
    )
}

/// `pg_dump` of the data only, one `-t` per table
pub fn dump_command(pod: &str, config: &ClusterConfig, tables: &[String]) -> String {
    format!(
        "kubectl exec {} -- pg_dump -a -U {} {}",
        pod,
        config.db_user,
        pg_dump_table_args(tables).join(" ")
    )
}

pub fn truncate_command(pod: &str, config: &ClusterConfig, sql: &str) -> String {
    format!(
        "kubectl exec {} -- psql -U {} -c {}",
        pod,
        config.db_user,
        shell_quote(sql)
    )
}

pub fn restore_command(pod: &str, config: &ClusterConfig, sql_path: &str) -> String {
    format!(
        "cat {} | kubectl exec -i {} -- psql -v ON_ERROR_STOP=1 -U {}",
        shell_quote(sql_path),
        pod,
        config.db_user
    )
}

/// `-t <table>` arguments in reverse catalog order
///
/// The reversal has always been part of the dump format; it is kept so
/// snapshots stay byte-comparable across versions of this tool.
pub fn pg_dump_table_args(tables: &[String]) -> Vec<String> {
    tables
        .iter()
        .rev()
        .flat_map(|t| ["-t".to_string(), t.clone()])
        .collect()
}

/// One TRUNCATE statement covering every table, or `None` for no tables
pub fn truncate_sql(tables: &[String]) -> Option<String> {
    if tables.is_empty() {
        return None;
    }
    Some(format!("TRUNCATE {} RESTART IDENTITY", tables.join(", ")))
}

// ========== Output parsing ==========

/// Decode the `array_to_json(array_agg(...))` column
///
/// An empty table aggregates to SQL NULL, which `psql -t` prints as an empty
/// line; both that and a literal `null` mean zero rows.
///
/// # Errors
///
/// Returns `UnexpectedOutput` if the text is not a JSON array of records.
pub fn parse_schema_rows(raw: &str) -> Result<Vec<SchemaVersionRecord>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| {
        ExError::new(ExErrorKind::UnexpectedOutput)
            .with_op("schema_version")
            .with_message(format!("could not decode schema_migrations rows: {}", e))
    })
}

/// Table names from `psql -t` output, one per line
pub fn parse_table_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
