//! In-Process Key/Value Backend
//!
//! A Redis-like server living in shared memory. [`MemoryServer`] owns the
//! data (one keyspace per database index) and can be taken down to simulate
//! an outage; [`MemoryStore`] is the blocking client a connector wraps.
//!
//! Supported commands: `PING`, `ECHO`, `GET`, `SET`, `DEL`, `EXISTS`,
//! `INCR`, `INCRBY`, `APPEND`, `MGET`, `HSET`, `HGET`, `HGETALL`, `HDEL`,
//! `DBSIZE`, `FLUSHDB`. Unknown commands and type mismatches are answered
//! with store-native error replies (`ERR ...`, `WRONGTYPE ...`).

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::core::reply::ReplyValue;

use super::{StoreClient, StoreConfig, StoreError};

/// Stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(Vec<u8>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
}

type Keyspace = BTreeMap<Vec<u8>, Value>;

#[derive(Debug)]
struct ServerState {
    databases: Mutex<BTreeMap<u32, Keyspace>>,
    password: Option<String>,
    down: AtomicBool,
}

/// Shared backing store. Cheap to clone; clones see the same data.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<ServerState>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// Server without authentication.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Server requiring `password` on connect.
    pub fn with_password(password: impl Into<String>) -> Self {
        Self::build(Some(password.into()))
    }

    fn build(password: Option<String>) -> Self {
        Self {
            state: Arc::new(ServerState {
                databases: Mutex::new(BTreeMap::new()),
                password,
                down: AtomicBool::new(false),
            }),
        }
    }

    /// New unconnected client.
    pub fn client(&self) -> MemoryStore {
        MemoryStore {
            server: self.clone(),
            config: None,
            alive: false,
            pending: VecDeque::new(),
            latency: Duration::ZERO,
            last_attempt: None,
        }
    }

    /// Simulate an outage (`true`) or recovery (`false`).
    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::Release);
    }

    /// True while simulating an outage.
    pub fn is_down(&self) -> bool {
        self.state.down.load(Ordering::Acquire)
    }

    /// Number of keys in database `db`.
    pub fn key_count(&self, db: u32) -> usize {
        self.state.databases.lock().get(&db).map_or(0, BTreeMap::len)
    }
}

/// Blocking client for a [`MemoryServer`].
#[derive(Debug)]
pub struct MemoryStore {
    server: MemoryServer,
    /// Config of the last successful connect; cleared by `close`.
    config: Option<StoreConfig>,
    alive: bool,
    pending: VecDeque<ReplyValue>,
    latency: Duration,
    last_attempt: Option<Instant>,
}

impl MemoryStore {
    /// Sleep `latency` before every command (simulates a slow backend).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn check_link(&mut self) -> Result<u32, StoreError> {
        let db = match (&self.config, self.alive) {
            (Some(config), true) => config.db_index,
            (Some(_), false) => return Err(StoreError::Disconnected),
            (None, _) => return Err(StoreError::NotConnected),
        };
        if self.server.is_down() {
            warn!("memory store connection lost");
            self.alive = false;
            return Err(StoreError::Disconnected);
        }
        Ok(db)
    }

    /// Reach the server and authenticate. Does not touch the current link.
    fn handshake(&mut self, config: &StoreConfig) -> Result<(), StoreError> {
        self.last_attempt = Some(Instant::now());
        if config.host.is_empty() {
            return Err(StoreError::ConnectFailed("empty host".into()));
        }
        if self.server.is_down() {
            return Err(StoreError::ConnectFailed(format!(
                "{}:{} unreachable",
                config.host, config.port
            )));
        }
        if self.server.state.password.is_some()
            && config.password != self.server.state.password
        {
            return Err(StoreError::AuthFailed);
        }
        Ok(())
    }

    fn run(&mut self, name: &str, params: &[&[u8]]) -> Result<(), StoreError> {
        let db = self.check_link()?;
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let reply = {
            let mut databases = self.server.state.databases.lock();
            let keyspace = databases.entry(db).or_default();
            execute(keyspace, name, params)
        };
        self.pending.push_back(reply);
        Ok(())
    }
}

impl StoreClient for MemoryStore {
    fn connect(&mut self, config: &StoreConfig) -> Result<(), StoreError> {
        // The previous link is gone whether or not the new one comes up.
        self.close();
        self.handshake(config)?;
        self.config = Some(config.clone());
        self.alive = true;
        Ok(())
    }

    fn close(&mut self) {
        self.config = None;
        self.alive = false;
        self.pending.clear();
    }

    fn update(&mut self) {
        if self.alive {
            return;
        }
        let Some(config) = self.config.clone() else {
            return;
        };
        let interval = Duration::from_millis(config.keepalive_interval_ms);
        if self
            .last_attempt
            .is_some_and(|at| at.elapsed() < interval)
        {
            return;
        }
        match self.handshake(&config) {
            Ok(()) => {
                self.alive = true;
                info!(host = %config.host, "memory store reconnected");
            }
            Err(e) => warn!(error = %e, "memory store reconnect failed"),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive && !self.server.is_down()
    }

    fn command(&mut self, name: &str, params: &[&[u8]]) -> Result<(), StoreError> {
        self.run(name, params)
    }

    fn pipe(&mut self, name: &str, params: &[&[u8]]) -> Result<(), StoreError> {
        self.run(name, params)
    }

    fn pop_reply(&mut self) -> Option<ReplyValue> {
        self.pending.pop_front()
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

fn wrong_args(name: &str) -> ReplyValue {
    ReplyValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn parse_int(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn execute(keyspace: &mut Keyspace, name: &str, params: &[&[u8]]) -> ReplyValue {
    let cmd = name.to_ascii_uppercase();
    match (cmd.as_str(), params) {
        ("PING", []) => ReplyValue::str("PONG"),
        ("PING", [msg]) | ("ECHO", [msg]) => ReplyValue::str(*msg),
        ("GET", [key]) => match keyspace.get(*key) {
            None => ReplyValue::Nil,
            Some(Value::Str(v)) => ReplyValue::str(v.clone()),
            Some(Value::Hash(_)) => ReplyValue::error(WRONGTYPE),
        },
        ("SET", [key, value]) => {
            keyspace.insert(key.to_vec(), Value::Str(value.to_vec()));
            ReplyValue::str("OK")
        }
        ("DEL", keys) if !keys.is_empty() => {
            let removed = keys.iter().filter(|k| keyspace.remove(**k).is_some()).count();
            ReplyValue::Int(removed as i64)
        }
        ("EXISTS", keys) if !keys.is_empty() => {
            let found = keys.iter().filter(|k| keyspace.contains_key(**k)).count();
            ReplyValue::Int(found as i64)
        }
        ("INCR", [key]) => incr_by(keyspace, key, 1),
        ("INCRBY", [key, delta]) => match parse_int(delta) {
            Some(delta) => incr_by(keyspace, key, delta),
            None => ReplyValue::error("ERR value is not an integer or out of range"),
        },
        ("APPEND", [key, value]) => match keyspace
            .entry(key.to_vec())
            .or_insert_with(|| Value::Str(Vec::new()))
        {
            Value::Str(v) => {
                v.extend_from_slice(value);
                ReplyValue::Int(v.len() as i64)
            }
            Value::Hash(_) => ReplyValue::error(WRONGTYPE),
        },
        ("MGET", keys) if !keys.is_empty() => {
            let mut reply = ReplyValue::Nil;
            reply.reserve_array(keys.len());
            for key in keys {
                reply.append_array(match keyspace.get(*key) {
                    Some(Value::Str(v)) => ReplyValue::str(v.clone()),
                    _ => ReplyValue::Nil,
                });
            }
            reply
        }
        ("HSET", [key, rest @ ..]) if !rest.is_empty() && rest.len() % 2 == 0 => {
            match keyspace
                .entry(key.to_vec())
                .or_insert_with(|| Value::Hash(BTreeMap::new()))
            {
                Value::Hash(hash) => {
                    let added = rest
                        .chunks(2)
                        .filter(|kv| hash.insert(kv[0].to_vec(), kv[1].to_vec()).is_none())
                        .count();
                    ReplyValue::Int(added as i64)
                }
                Value::Str(_) => ReplyValue::error(WRONGTYPE),
            }
        }
        ("HGET", [key, field]) => match keyspace.get(*key) {
            None => ReplyValue::Nil,
            Some(Value::Hash(hash)) => hash
                .get(*field)
                .map_or(ReplyValue::Nil, |v| ReplyValue::str(v.clone())),
            Some(Value::Str(_)) => ReplyValue::error(WRONGTYPE),
        },
        ("HGETALL", [key]) => match keyspace.get(*key) {
            None => ReplyValue::Array(Vec::new()),
            Some(Value::Hash(hash)) => {
                let mut reply = ReplyValue::Nil;
                reply.reserve_array(hash.len() * 2);
                for (field, value) in hash {
                    reply.append_array(ReplyValue::str(field.clone()));
                    reply.append_array(ReplyValue::str(value.clone()));
                }
                reply
            }
            Some(Value::Str(_)) => ReplyValue::error(WRONGTYPE),
        },
        ("HDEL", [key, fields @ ..]) if !fields.is_empty() => match keyspace.get_mut(*key) {
            None => ReplyValue::Int(0),
            Some(Value::Hash(hash)) => {
                let removed = fields.iter().filter(|f| hash.remove(**f).is_some()).count();
                if hash.is_empty() {
                    keyspace.remove(*key);
                }
                ReplyValue::Int(removed as i64)
            }
            Some(Value::Str(_)) => ReplyValue::error(WRONGTYPE),
        },
        ("DBSIZE", []) => ReplyValue::Int(keyspace.len() as i64),
        ("FLUSHDB", []) => {
            keyspace.clear();
            ReplyValue::str("OK")
        }
        ("PING" | "ECHO" | "GET" | "SET" | "DEL" | "EXISTS" | "INCR" | "INCRBY" | "APPEND"
        | "MGET" | "HSET" | "HGET" | "HGETALL" | "HDEL" | "DBSIZE" | "FLUSHDB", _) => {
            wrong_args(name)
        }
        _ => ReplyValue::error(format!("ERR unknown command '{name}'")),
    }
}

fn incr_by(keyspace: &mut Keyspace, key: &[u8], delta: i64) -> ReplyValue {
    let current = match keyspace.get(key) {
        None => 0,
        Some(Value::Str(v)) => match parse_int(v) {
            Some(n) => n,
            None => return ReplyValue::error("ERR value is not an integer or out of range"),
        },
        Some(Value::Hash(_)) => return ReplyValue::error(WRONGTYPE),
    };
    match current.checked_add(delta) {
        Some(next) => {
            keyspace.insert(key.to_vec(), Value::Str(next.to_string().into_bytes()));
            ReplyValue::Int(next)
        }
        None => ReplyValue::error("ERR increment or decrement would overflow"),
    }
}
