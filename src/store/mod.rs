//! Store Clients
//!
//! The blocking, backend-specific client a connector wraps. A client is
//! created on the owner thread, moved into the worker at start-up and from
//! then on touched only by the worker.
//!
//! Two backends ship with the crate:
//! - [`memory`]: an in-process Redis-like key/value server
//! - [`ordered`]: an embedded ordered key/value engine with typed operations

pub mod memory;
pub mod ordered;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::env_u64;
use crate::core::reply::ReplyValue;
use crate::dispatch::opcode::OpTable;

pub use memory::{MemoryServer, MemoryStore};
pub use ordered::{OrderedDb, OrderedOps, OrderedStore};

/// Errors reported by a store client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Could not reach the backend.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// Credentials rejected.
    #[error("authentication failed")]
    AuthFailed,
    /// Connection lost.
    #[error("connection lost")]
    Disconnected,
    /// No connection established yet.
    #[error("not connected")]
    NotConnected,
    /// Command rejected by the client before reaching the backend.
    #[error("command failed: {0}")]
    Command(String),
}

/// Blocking client for one backend.
///
/// `command` and `pipe` leave their replies pending inside the client;
/// the worker collects them with [`StoreClient::pop_reply`] in order.
pub trait StoreClient: Send + 'static {
    /// Connect (or reconnect) using `config`.
    fn connect(&mut self, config: &StoreConfig) -> Result<(), StoreError>;

    /// Drop the connection. Pending replies are discarded.
    fn close(&mut self);

    /// Reconnect/keepalive housekeeping. Called on every worker iteration.
    fn update(&mut self);

    /// True while the connection is usable.
    fn is_alive(&self) -> bool;

    /// Run one command; its reply becomes pending.
    fn command(&mut self, name: &str, params: &[&[u8]]) -> Result<(), StoreError>;

    /// Queue one sub-command of a pipeline; its reply becomes pending.
    fn pipe(&mut self, name: &str, params: &[&[u8]]) -> Result<(), StoreError>;

    /// Take the oldest pending reply.
    fn pop_reply(&mut self) -> Option<ReplyValue>;

    /// Register backend-specific opcodes. The default registers nothing.
    fn register_ops(ops: &mut OpTable<Self>)
    where
        Self: Sized,
    {
        let _ = ops;
    }
}

/// Backend connection settings. Fields a backend does not use are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Host name, or filesystem path for embedded engines.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Credential, if the backend requires one.
    pub password: Option<String>,
    /// Selected database / namespace index.
    pub db_index: u32,
    /// Connect timeout (milliseconds).
    pub connect_timeout_ms: u64,
    /// Per-command timeout (milliseconds).
    pub command_timeout_ms: u64,
    /// Keepalive / reconnect interval (milliseconds).
    pub keepalive_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db_index: 0,
            connect_timeout_ms: 3_000,
            command_timeout_ms: 3_000,
            keepalive_interval_ms: 1_000,
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("STORE_HOST").unwrap_or(defaults.host),
            port: env_u64("STORE_PORT")
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or(defaults.port),
            password: std::env::var("STORE_PASSWORD").ok().or(defaults.password),
            db_index: env_u64("STORE_DB")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.db_index),
            connect_timeout_ms: env_u64("STORE_CONNECT_TIMEOUT_MS")
                .unwrap_or(defaults.connect_timeout_ms),
            command_timeout_ms: env_u64("STORE_COMMAND_TIMEOUT_MS")
                .unwrap_or(defaults.command_timeout_ms),
            keepalive_interval_ms: env_u64("STORE_KEEPALIVE_MS")
                .unwrap_or(defaults.keepalive_interval_ms),
        }
    }

    /// Parse from a JSON document. Missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize for the connect opcode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize a connect opcode payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_partial_fields() {
        let config = StoreConfig::from_json(r#"{"host":"cache.local","db_index":3}"#).unwrap();
        assert_eq!(config.host, "cache.local");
        assert_eq!(config.db_index, 3);
        assert_eq!(config.port, 6379);
        assert_eq!(config.password, None);
    }

    #[test]
    fn test_binary_form() {
        let config = StoreConfig {
            password: Some("hunter2".into()),
            keepalive_interval_ms: 50,
            ..Default::default()
        };
        let bytes = config.to_bytes().unwrap();
        assert_eq!(StoreConfig::from_bytes(&bytes).unwrap(), config);
        assert!(StoreConfig::from_bytes(&bytes[..3]).is_err());
    }

    #[test]
    fn test_store_error_messages() {
        assert_eq!(StoreError::AuthFailed.to_string(), "authentication failed");
        assert_eq!(
            StoreError::ConnectFailed("refused".into()).to_string(),
            "connect failed: refused"
        );
    }
}
