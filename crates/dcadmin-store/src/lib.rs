//! dcadmin Store - the on-disk snapshot directory
//!
//! Provides:
//! - The directory layout (`schema.txt`, `snapshot.sql`, `redis-store.json`)
//! - Atomic temp-then-rename writes, whole-buffer and streaming
//! - The schema version manifest and key-value snapshot file codecs

pub mod atomic;
pub mod kv_file;
pub mod layout;
pub mod manifest;

pub use atomic::{atomic_write, AtomicFile};
pub use layout::SnapshotDir;
