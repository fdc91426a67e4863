//! dcadmin Core - shared kernel for the cluster administration tool
//!
//! This crate provides the pieces every other dcadmin crate builds on:
//! - The canonical error facility (`ExError`, `ExErrorKind`, `AdminError`)
//! - The structured logging facility and its `log_op_*` macros
//! - Snapshot data model (schema version record, key-value snapshot, reports)
//! - Cluster and update configuration with environment overrides

pub mod config;
pub mod errors;
pub mod logging_facility;
pub mod model;

pub use dcadmin_core_types as types;

// Re-export commonly used types
pub use config::{ClusterConfig, UpdateConfig};
pub use errors::{AdminError, ErrorCategory, ExError, ExErrorKind, Result};
pub use model::{
    KeyFailure, KeyValueSnapshot, KvRestoreReport, SchemaVersionRecord, SnapshotManifest,
    WorkloadRole,
};
