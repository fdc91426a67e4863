//! Cluster and update configuration
//!
//! Values are fixed for the one deployment this tool administers; only the
//! local tunnel port and the update base URL can be overridden from the
//! environment.

use crate::errors::{AdminError, Result};
use crate::model::WorkloadRole;
use std::time::Duration;

/// Overrides the local end of the key-value tunnel
pub const LOCAL_KV_PORT_ENV: &str = "LOCAL_REDIS_PORT";
/// Overrides where self-update downloads binaries from
pub const UPDATE_BASE_URL_ENV: &str = "DCADMIN_UPDATE_BASE_URL";

pub const DEFAULT_LOCAL_KV_PORT: u16 = 6380;
pub const DEFAULT_REMOTE_KV_PORT: u16 = 6379;
pub const DEFAULT_TUNNEL_SETTLE: Duration = Duration::from_secs(10);
pub const DEFAULT_UPDATE_BASE_URL: &str =
    "https://storage.googleapis.com/sourcegraph-assets/sourcegraph-server-gen";

/// Everything the snapshot engines need to know about the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Label selector of the PostgreSQL pod
    pub relational_selector: String,
    /// Label selector of the Redis pod
    pub kv_selector: String,
    /// Role passed to `psql -U` / `pg_dump -U`
    pub db_user: String,
    /// Migration bookkeeping table, excluded from dumps and truncation
    pub migrations_table: String,
    /// Glob of the keys captured from the key-value store
    pub kv_key_pattern: String,
    pub local_kv_port: u16,
    pub remote_kv_port: u16,
    /// How long to wait after starting a port-forward before using it
    pub tunnel_settle: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            relational_selector: "app=pgsql".to_string(),
            kv_selector: "app=redis-store".to_string(),
            db_user: "sg".to_string(),
            migrations_table: "schema_migrations".to_string(),
            kv_key_pattern: "user_activity*".to_string(),
            local_kv_port: DEFAULT_LOCAL_KV_PORT,
            remote_kv_port: DEFAULT_REMOTE_KV_PORT,
            tunnel_settle: DEFAULT_TUNNEL_SETTLE,
        }
    }
}

impl ClusterConfig {
    /// Defaults plus overrides from the process environment
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `LOCAL_REDIS_PORT` is set but is not a port.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults plus overrides from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the port override is not a valid port.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(LOCAL_KV_PORT_ENV).filter(|v| !v.is_empty()) {
            config.local_kv_port = raw.trim().parse().map_err(|e| AdminError::InvalidConfig {
                name: LOCAL_KV_PORT_ENV.to_string(),
                reason: format!("{:?}: {}", raw, e),
            })?;
        }
        Ok(config)
    }

    pub fn with_local_kv_port(mut self, port: u16) -> Self {
        self.local_kv_port = port;
        self
    }

    pub fn with_tunnel_settle(mut self, settle: Duration) -> Self {
        self.tunnel_settle = settle;
        self
    }

    /// Label selector for a workload role
    pub fn selector_for(&self, role: WorkloadRole) -> &str {
        match role {
            WorkloadRole::RelationalDatabase => &self.relational_selector,
            WorkloadRole::KeyValueStore => &self.kv_selector,
        }
    }
}

/// Where self-update fetches binaries from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfig {
    pub base_url: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPDATE_BASE_URL.to_string(),
        }
    }
}

impl UpdateConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(UPDATE_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            Some(url) => Self {
                base_url: url.trim().trim_end_matches('/').to_string(),
            },
            None => Self::default(),
        }
    }
}
