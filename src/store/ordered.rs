//! Embedded Ordered Key/Value Backend
//!
//! An in-process ordered engine ([`OrderedDb`], a sorted byte map) and its
//! client ([`OrderedStore`]). Besides the generic `command` interface it
//! registers typed extension opcodes whose results are built directly on
//! the worker, and [`OrderedOps`] exposes them on the owner side.
//!
//! The engine stays a flat ordered map. Plain keys and hash fields live in
//! disjoint prefixed ranges:
//!
//! ```text
//! plain : 'k' | key
//! hash  : 'h' | name_len:u32 (big-endian) | name | field
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::connector::AsyncConnector;
use crate::core::codec::{ArgReader, ArgWriter};
use crate::core::error::{ConnectorError, Result};
use crate::core::reply::ReplyValue;
use crate::dispatch::opcode::{OpTable, Opcode};

use super::{StoreClient, StoreConfig, StoreError};

/// Get one key. Reply: `Str` or `Nil`.
pub const ORDERED_GET: Opcode = Opcode(Opcode::EXTENSION_BASE);
/// Put one key. Reply: `Bool(true)`.
pub const ORDERED_PUT: Opcode = Opcode(Opcode::EXTENSION_BASE + 1);
/// Delete one key. Reply: `Bool(existed)`.
pub const ORDERED_DELETE: Opcode = Opcode(Opcode::EXTENSION_BASE + 2);
/// Set one hash field. Reply: `Bool(newly added)`.
pub const ORDERED_HSET: Opcode = Opcode(Opcode::EXTENSION_BASE + 3);
/// Get one hash field. Reply: `Str` or `Nil`.
pub const ORDERED_HGET: Opcode = Opcode(Opcode::EXTENSION_BASE + 4);
/// Set many hash fields. Reply: `Int(fields written)`.
pub const ORDERED_HMSET: Opcode = Opcode(Opcode::EXTENSION_BASE + 5);
/// All fields of a hash. Reply: `Array` of alternating field, value.
pub const ORDERED_HGETALL: Opcode = Opcode(Opcode::EXTENSION_BASE + 6);
/// Delete one hash field. Reply: `Bool(existed)`.
pub const ORDERED_HDEL: Opcode = Opcode(Opcode::EXTENSION_BASE + 7);
/// Approximate bytes of plain keys in `[start, end)`. Reply: `Int`.
pub const ORDERED_APPROXIMATE_SIZE: Opcode = Opcode(Opcode::EXTENSION_BASE + 8);

const HASH_PREFIX: u8 = b'h';
const KEY_PREFIX: u8 = b'k';

/// Shared ordered engine. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct OrderedDb {
    data: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl OrderedDb {
    /// Empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// New unopened client.
    pub fn client(&self) -> OrderedStore {
        OrderedStore {
            db: self.clone(),
            path: None,
            pending: VecDeque::new(),
        }
    }

    /// Number of raw entries (hash fields count individually).
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

fn plain_key(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(KEY_PREFIX);
    out.extend_from_slice(key);
    out
}

fn hash_key(name: &[u8], field: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(5 + name.len() + field.len());
    key.push(HASH_PREFIX);
    key.extend_from_slice(&(name.len() as u32).to_be_bytes());
    key.extend_from_slice(name);
    key.extend_from_slice(field);
    key
}

/// Client for an [`OrderedDb`]. `StoreConfig::host` is the database path.
#[derive(Debug)]
pub struct OrderedStore {
    db: OrderedDb,
    path: Option<String>,
    pending: VecDeque<ReplyValue>,
}

impl OrderedStore {
    fn data(&self) -> std::result::Result<parking_lot::MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, StoreError> {
        if self.path.is_none() {
            return Err(StoreError::NotConnected);
        }
        Ok(self.db.data.lock())
    }

    fn run(&mut self, name: &str, params: &[&[u8]]) -> std::result::Result<(), StoreError> {
        let reply = {
            let mut data = self.data()?;
            match (name.to_ascii_uppercase().as_str(), params) {
                ("GET", [key]) => data
                    .get(&plain_key(key))
                    .map_or(ReplyValue::Nil, |v| ReplyValue::str(v.clone())),
                ("PUT", [key, value]) => {
                    data.insert(plain_key(key), value.to_vec());
                    ReplyValue::Bool(true)
                }
                ("DEL", [key]) => ReplyValue::Bool(data.remove(&plain_key(key)).is_some()),
                ("COUNT", []) => ReplyValue::Int(data.len() as i64),
                _ => ReplyValue::error(format!("ERR unsupported command '{name}'")),
            }
        };
        self.pending.push_back(reply);
        Ok(())
    }
}

impl StoreClient for OrderedStore {
    fn connect(&mut self, config: &StoreConfig) -> std::result::Result<(), StoreError> {
        if config.host.is_empty() {
            return Err(StoreError::ConnectFailed("empty database path".into()));
        }
        info!(path = %config.host, "ordered store opened");
        self.path = Some(config.host.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.path = None;
        self.pending.clear();
    }

    fn update(&mut self) {}

    fn is_alive(&self) -> bool {
        self.path.is_some()
    }

    fn command(&mut self, name: &str, params: &[&[u8]]) -> std::result::Result<(), StoreError> {
        self.run(name, params)
    }

    fn pipe(&mut self, name: &str, params: &[&[u8]]) -> std::result::Result<(), StoreError> {
        self.run(name, params)
    }

    fn pop_reply(&mut self) -> Option<ReplyValue> {
        self.pending.pop_front()
    }

    fn register_ops(ops: &mut OpTable<Self>) {
        ops.register(ORDERED_GET, "get", op_get);
        ops.register(ORDERED_PUT, "put", op_put);
        ops.register(ORDERED_DELETE, "delete", op_delete);
        ops.register(ORDERED_HSET, "hset", op_hset);
        ops.register(ORDERED_HGET, "hget", op_hget);
        ops.register(ORDERED_HMSET, "hmset", op_hmset);
        ops.register(ORDERED_HGETALL, "hgetall", op_hgetall);
        ops.register(ORDERED_HDEL, "hdel", op_hdel);
        ops.register(ORDERED_APPROXIMATE_SIZE, "approximate_size", op_approximate_size);
    }
}

// =============================================================================
// TYPED HANDLERS (worker side)
// =============================================================================

fn op_get(store: &mut OrderedStore, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let key = args.read_bytes()?;
    args.finish()?;
    let data = store.data()?;
    Ok(Some(
        data.get(&plain_key(key))
            .map_or(ReplyValue::Nil, |v| ReplyValue::str(v.clone())),
    ))
}

fn op_put(store: &mut OrderedStore, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let (key, value) = args.read_pair()?;
    args.finish()?;
    store.data()?.insert(plain_key(key), value.to_vec());
    Ok(Some(ReplyValue::Bool(true)))
}

fn op_delete(store: &mut OrderedStore, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let key = args.read_bytes()?;
    args.finish()?;
    let existed = store.data()?.remove(&plain_key(key)).is_some();
    Ok(Some(ReplyValue::Bool(existed)))
}

fn op_hset(store: &mut OrderedStore, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let name = args.read_bytes()?;
    let (field, value) = args.read_pair()?;
    args.finish()?;
    let added = store
        .data()?
        .insert(hash_key(name, field), value.to_vec())
        .is_none();
    Ok(Some(ReplyValue::Bool(added)))
}

fn op_hget(store: &mut OrderedStore, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let name = args.read_bytes()?;
    let field = args.read_bytes()?;
    args.finish()?;
    let data = store.data()?;
    Ok(Some(
        data.get(&hash_key(name, field))
            .map_or(ReplyValue::Nil, |v| ReplyValue::str(v.clone())),
    ))
}

fn op_hmset(store: &mut OrderedStore, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let name = args.read_bytes()?;
    let mut pairs = Vec::new();
    while !args.is_empty() {
        pairs.push(args.read_pair()?);
    }
    if pairs.is_empty() {
        return Err(ConnectorError::invalid("hmset needs at least one field"));
    }
    let mut data = store.data()?;
    for (field, value) in &pairs {
        data.insert(hash_key(name, field), value.to_vec());
    }
    Ok(Some(ReplyValue::Int(pairs.len() as i64)))
}

fn op_hgetall(store: &mut OrderedStore, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let name = args.read_bytes()?;
    args.finish()?;
    let prefix = hash_key(name, b"");
    let data = store.data()?;
    let mut reply = ReplyValue::Nil;
    reply.reserve_array(0);
    for (key, value) in data
        .range::<[u8], _>((Bound::Included(prefix.as_slice()), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(&prefix))
    {
        reply.append_array(ReplyValue::str(&key[prefix.len()..]));
        reply.append_array(ReplyValue::str(value.clone()));
    }
    Ok(Some(reply))
}

fn op_hdel(store: &mut OrderedStore, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let name = args.read_bytes()?;
    let field = args.read_bytes()?;
    args.finish()?;
    let existed = store.data()?.remove(&hash_key(name, field)).is_some();
    Ok(Some(ReplyValue::Bool(existed)))
}

fn op_approximate_size(
    store: &mut OrderedStore,
    args: &mut ArgReader<'_>,
) -> Result<Option<ReplyValue>> {
    let start = args.read_bytes()?;
    let end = args.read_bytes()?;
    args.finish()?;
    if !end.is_empty() && start > end {
        return Err(ConnectorError::invalid("range start after end"));
    }
    // An empty end means "to the last plain key".
    let lower = plain_key(start);
    let upper = if end.is_empty() {
        vec![KEY_PREFIX + 1]
    } else {
        plain_key(end)
    };
    let data = store.data()?;
    let bytes: usize = data
        .range::<[u8], _>((Bound::Included(lower.as_slice()), Bound::Excluded(upper.as_slice())))
        .map(|(k, v)| k.len() - 1 + v.len())
        .sum();
    Ok(Some(ReplyValue::Int(bytes as i64)))
}

// =============================================================================
// TYPED FACADE (owner side)
// =============================================================================

/// Typed requests for connectors backed by an [`OrderedStore`].
///
/// Each call encodes its arguments and submits the matching extension
/// opcode; the reply arrives through `callback` during `update()`.
pub trait OrderedOps {
    /// Get `key`.
    fn get(&mut self, key: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64>;
    /// Put `key = value`.
    fn put(&mut self, key: &[u8], value: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64>;
    /// Delete `key`.
    fn delete(&mut self, key: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64>;
    /// Set one field of hash `name`.
    fn hset(
        &mut self,
        name: &[u8],
        field: &[u8],
        value: &[u8],
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64>;
    /// Get one field of hash `name`.
    fn hget(&mut self, name: &[u8], field: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64>;
    /// Set several fields of hash `name`.
    fn hmset(
        &mut self,
        name: &[u8],
        fields: &[(&[u8], &[u8])],
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64>;
    /// All fields of hash `name`.
    fn hgetall(&mut self, name: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64>;
    /// Delete one field of hash `name`.
    fn hdel(&mut self, name: &[u8], field: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64>;
    /// Approximate bytes of plain keys in `[start, end)`; empty `end` means unbounded.
    fn approximate_size(
        &mut self,
        start: &[u8],
        end: &[u8],
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64>;
}

impl OrderedOps for AsyncConnector {
    fn get(&mut self, key: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_bytes(key);
        self.submit(ORDERED_GET, w.into_bytes(), callback)
    }

    fn put(&mut self, key: &[u8], value: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_pair(key, value);
        self.submit(ORDERED_PUT, w.into_bytes(), callback)
    }

    fn delete(&mut self, key: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_bytes(key);
        self.submit(ORDERED_DELETE, w.into_bytes(), callback)
    }

    fn hset(
        &mut self,
        name: &[u8],
        field: &[u8],
        value: &[u8],
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_bytes(name).put_pair(field, value);
        self.submit(ORDERED_HSET, w.into_bytes(), callback)
    }

    fn hget(&mut self, name: &[u8], field: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_bytes(name).put_bytes(field);
        self.submit(ORDERED_HGET, w.into_bytes(), callback)
    }

    fn hmset(
        &mut self,
        name: &[u8],
        fields: &[(&[u8], &[u8])],
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64> {
        if fields.is_empty() {
            return Err(ConnectorError::invalid("hmset needs at least one field"));
        }
        let mut w = ArgWriter::new();
        w.put_bytes(name);
        for (field, value) in fields {
            w.put_pair(field, value);
        }
        self.submit(ORDERED_HMSET, w.into_bytes(), callback)
    }

    fn hgetall(&mut self, name: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_bytes(name);
        self.submit(ORDERED_HGETALL, w.into_bytes(), callback)
    }

    fn hdel(&mut self, name: &[u8], field: &[u8], callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_bytes(name).put_bytes(field);
        self.submit(ORDERED_HDEL, w.into_bytes(), callback)
    }

    fn approximate_size(
        &mut self,
        start: &[u8],
        end: &[u8],
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_bytes(start).put_bytes(end);
        self.submit(ORDERED_APPROXIMATE_SIZE, w.into_bytes(), callback)
    }
}
