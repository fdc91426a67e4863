//! Snapshot data model
//!
//! These types are constructed fresh per invocation. The only state that
//! outlives a run is what the store crate writes into the snapshot directory.

use crate::errors::{AdminError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A workload whose running instance the tool needs to reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadRole {
    /// The PostgreSQL instance holding the application schema
    RelationalDatabase,
    /// The Redis instance holding `user_activity*` keys
    KeyValueStore,
}

impl WorkloadRole {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            WorkloadRole::RelationalDatabase => "relational-database",
            WorkloadRole::KeyValueStore => "key-value-store",
        }
    }
}

impl std::fmt::Display for WorkloadRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the live `schema_migrations` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersionRecord {
    pub version: i64,
    pub dirty: bool,
}

impl SchemaVersionRecord {
    /// Reject a schema left mid-migration
    ///
    /// # Errors
    ///
    /// Returns `DirtySchema` when the dirty flag is set.
    pub fn ensure_clean(&self) -> Result<()> {
        if self.dirty {
            return Err(AdminError::DirtySchema {
                version: self.version,
            }
            .into());
        }
        Ok(())
    }

    /// Select the single record out of a decoded result set
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedSchemaRows` unless exactly one row is present, and
    /// `DirtySchema` if that row is dirty.
    pub fn from_rows(rows: Vec<SchemaVersionRecord>) -> Result<Self> {
        let [record] = <[SchemaVersionRecord; 1]>::try_from(rows).map_err(|rows| {
            AdminError::UnexpectedSchemaRows { count: rows.len() }
        })?;
        record.ensure_clean()?;
        Ok(record)
    }
}

/// The relational half of a snapshot's metadata
///
/// Present if and only if a relational snapshot was taken. `captured_at` is
/// not stored; it is the modification time of `schema.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotManifest {
    pub schema_version: i64,
    pub captured_at: Option<DateTime<Utc>>,
}

/// Key to opaque DUMP blob mapping for the key-value store
///
/// Serializes as a JSON object whose values are standard base64 strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValueSnapshot {
    #[serde(with = "blob_map")]
    entries: BTreeMap<String, Vec<u8>>,
}

impl KeyValueSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one key's blob
    pub fn insert(&mut self, key: impl Into<String>, blob: Vec<u8>) {
        self.entries.insert(key.into(), blob);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Vec<u8>)> for KeyValueSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

mod blob_map {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(entries: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(entries.iter().map(|(k, v)| (k, STANDARD.encode(v))))
    }

    // A null value decodes to an empty blob.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, Option<String>>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                let blob = match value {
                    Some(encoded) => STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                        D::Error::custom(format!("key {:?}: invalid base64: {}", key, e))
                    })?,
                    None => Vec::new(),
                };
                Ok((key, blob))
            })
            .collect()
    }
}

/// A key whose RESTORE failed during a key-value restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFailure {
    pub key: String,
    pub reason: String,
}

/// Outcome of a key-value restore that reached its final confirmation
///
/// Individual key failures do not fail the restore; they are listed here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvRestoreReport {
    pub total: usize,
    pub restored: usize,
    pub failed: Vec<KeyFailure>,
}

impl KvRestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.restored == self.total
    }
}
