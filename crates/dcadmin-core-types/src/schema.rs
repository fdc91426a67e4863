//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_RUN_ID: &str = "run_id";

// Cluster identifiers
pub const FIELD_POD: &str = "pod";
pub const FIELD_ROLE: &str = "role";
pub const FIELD_LOCAL_PORT: &str = "local_port";

// Snapshot fields
pub const FIELD_SNAPSHOT_DIR: &str = "snapshot_dir";
pub const FIELD_KEY: &str = "key";
pub const FIELD_TABLE_COUNT: &str = "table_count";
pub const FIELD_KEY_COUNT: &str = "key_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_PHASE: &str = "phase";
