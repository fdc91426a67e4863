//! Redis protocol binding for [`KvSession`]

use super::{KvConnector, KvSession};
use dcadmin_core::errors::{ExError, ExErrorKind, Result};
use redis::{Client, Connection, RedisError};

/// Connects to a tunnel endpoint on the loopback interface
#[derive(Debug, Clone)]
pub struct RedisConnector {
    host: String,
}

impl Default for RedisConnector {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
        }
    }
}

impl RedisConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvConnector for RedisConnector {
    fn connect(&self, local_port: u16) -> Result<Box<dyn KvSession>> {
        let url = format!("redis://{}:{}/", self.host, local_port);
        let client = Client::open(url.as_str()).map_err(|e| redis_error("kv_connect", e))?;
        let conn = client
            .get_connection()
            .map_err(|e| redis_error("kv_connect", e).with_subject(url.clone()))?;
        tracing::debug!(url = %url, "connected to key-value store");
        Ok(Box::new(RedisSession { conn }))
    }
}

struct RedisSession {
    conn: Connection,
}

impl KvSession for RedisSession {
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        redis::cmd("KEYS")
            .arg(pattern)
            .query(&mut self.conn)
            .map_err(|e| redis_error("kv_keys", e).with_subject(pattern))
    }

    fn dump_pipelined(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("DUMP").arg(key);
        }
        pipe.query(&mut self.conn)
            .map_err(|e| redis_error("kv_dump", e))
    }

    fn restore_replace(&mut self, key: &str, blob: &[u8]) -> Result<()> {
        redis::cmd("RESTORE")
            .arg(key)
            .arg(0)
            .arg(blob)
            .arg("REPLACE")
            .query(&mut self.conn)
            .map_err(|e| redis_error("kv_restore", e).with_subject(key))
    }

    fn ping(&mut self) -> Result<()> {
        redis::cmd("PING")
            .query(&mut self.conn)
            .map_err(|e| redis_error("kv_ping", e))
    }
}

fn redis_error(op: &str, err: RedisError) -> ExError {
    let kind = if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped()
    {
        ExErrorKind::KvConnection
    } else {
        ExErrorKind::KvCommand
    };
    ExError::new(kind).with_op(op).with_message(err.to_string())
}
