//! Opcodes and Handler Table
//!
//! Maps each [`Opcode`] to the handler that decodes its payload and drives
//! the store client. The core opcodes are registered for every backend;
//! backends add their own through [`StoreClient::register_ops`].
//!
//! A handler returns:
//! - `Ok(Some(reply))` for a direct typed result
//! - `Ok(None)` when the store client holds the reply (collected with `pop_reply`)
//! - `Err(e)` to answer the request with an error reply

use std::collections::BTreeMap;
use std::fmt;

use crate::core::codec::{decode_command, ArgReader};
use crate::core::error::{ConnectorError, Result};
use crate::core::reply::ReplyValue;
use crate::store::{StoreClient, StoreConfig};

/// Operation selector carried by every queue item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Connect with a bincode-encoded [`StoreConfig`].
    pub const CONNECT: Opcode = Opcode(0x01);
    /// One command: `name, [params]`.
    pub const COMMAND: Opcode = Opcode(0x02);
    /// Pipeline: repeated `name, [params]`.
    pub const PIPELINE: Opcode = Opcode(0x03);
    /// Close the store connection.
    pub const CLOSE: Opcode = Opcode(0x04);
    /// First opcode available to backends.
    pub const EXTENSION_BASE: u16 = 0x100;

    /// True for backend-defined opcodes.
    pub fn is_extension(self) -> bool {
        self.0 >= Self::EXTENSION_BASE
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Handler signature.
pub type Handler<C> = fn(&mut C, &mut ArgReader<'_>) -> Result<Option<ReplyValue>>;

/// Registration table from opcode to handler.
pub struct OpTable<C> {
    handlers: BTreeMap<Opcode, (&'static str, Handler<C>)>,
}

impl<C: StoreClient> OpTable<C> {
    /// Table with the core opcodes and the backend's extensions.
    pub fn for_client() -> Self {
        let mut table = Self {
            handlers: BTreeMap::new(),
        };
        table.register(Opcode::CONNECT, "connect", op_connect::<C>);
        table.register(Opcode::COMMAND, "command", op_command::<C>);
        table.register(Opcode::PIPELINE, "pipeline", op_pipeline::<C>);
        table.register(Opcode::CLOSE, "close", op_close::<C>);
        C::register_ops(&mut table);
        table
    }

    /// Register (or replace) a handler.
    pub fn register(&mut self, opcode: Opcode, name: &'static str, handler: Handler<C>) {
        self.handlers.insert(opcode, (name, handler));
    }

    /// Look up a handler.
    pub fn get(&self, opcode: Opcode) -> Option<Handler<C>> {
        self.handlers.get(&opcode).map(|(_, h)| *h)
    }

    /// Registered name of an opcode.
    pub fn name(&self, opcode: Opcode) -> Option<&'static str> {
        self.handlers.get(&opcode).map(|(n, _)| *n)
    }

    /// Number of registered opcodes.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// =============================================================================
// CORE HANDLERS
// =============================================================================

fn op_connect<C: StoreClient>(client: &mut C, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let blob = args.read_bytes()?;
    args.finish()?;
    let config = StoreConfig::from_bytes(blob)
        .map_err(|e| ConnectorError::invalid(format!("bad connect config: {e}")))?;
    client.connect(&config)?;
    Ok(Some(ReplyValue::Bool(true)))
}

fn op_command<C: StoreClient>(client: &mut C, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let (name, params) = decode_command(args)?;
    args.finish()?;
    client.command(name, &params)?;
    Ok(None)
}

fn op_close<C: StoreClient>(client: &mut C, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    // Close carries a single marker field so the payload is never empty.
    args.read_bool()?;
    client.close();
    Ok(Some(ReplyValue::Bool(true)))
}

/// Run every sub-command and gather one reply per sub-command, in order.
///
/// The payload is fully decoded before anything reaches the client. A
/// sub-command the client refuses occupies its slot as an error reply.
fn op_pipeline<C: StoreClient>(client: &mut C, args: &mut ArgReader<'_>) -> Result<Option<ReplyValue>> {
    let mut commands = Vec::new();
    while !args.is_empty() {
        commands.push(decode_command(args)?);
    }
    if commands.is_empty() {
        return Err(ConnectorError::invalid("empty pipeline"));
    }

    let slots: Vec<Option<ReplyValue>> = commands
        .iter()
        .map(|(name, params)| match client.pipe(name, params) {
            Ok(()) => None,
            Err(e) => Some(ReplyValue::from_error(&e.into())),
        })
        .collect();

    let mut reply = ReplyValue::Nil;
    reply.reserve_array(slots.len());
    for slot in slots {
        let child = slot.unwrap_or_else(|| {
            client
                .pop_reply()
                .unwrap_or_else(|| ReplyValue::from_error(&ConnectorError::ReplyNotFound))
        });
        reply.append_array(child);
    }
    Ok(Some(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{encode_command, ArgWriter};
    use crate::core::error::ErrorCode;
    use crate::store::memory::MemoryServer;
    use crate::store::ordered::{OrderedStore, ORDERED_GET};

    fn connected_memory() -> crate::store::MemoryStore {
        let server = MemoryServer::new();
        let mut client = server.client();
        client.connect(&StoreConfig::default()).unwrap();
        client
    }

    #[test]
    fn test_core_opcodes_registered() {
        let table = OpTable::<crate::store::MemoryStore>::for_client();
        for op in [Opcode::CONNECT, Opcode::COMMAND, Opcode::PIPELINE, Opcode::CLOSE] {
            assert!(table.get(op).is_some(), "missing {op}");
        }
        assert_eq!(table.name(Opcode::PIPELINE), Some("pipeline"));
        assert!(table.get(Opcode(0x7777)).is_none());
    }

    #[test]
    fn test_backend_extensions_registered() {
        let table = OpTable::<OrderedStore>::for_client();
        assert!(table.get(ORDERED_GET).is_some());
        assert!(ORDERED_GET.is_extension());
        assert!(table.len() > 4);

        let memory = OpTable::<crate::store::MemoryStore>::for_client();
        assert_eq!(memory.len(), 4);
    }

    #[test]
    fn test_command_leaves_reply_pending() {
        let mut client = connected_memory();
        let mut w = ArgWriter::new();
        encode_command(&mut w, "SET", &["k", "v"]);
        let payload = w.into_bytes();

        let out = op_command(&mut client, &mut ArgReader::new(&payload)).unwrap();
        assert!(out.is_none());
        assert_eq!(client.pop_reply(), Some(ReplyValue::str("OK")));
    }

    #[test]
    fn test_pipeline_orders_replies_and_marks_refused_slots() {
        let mut client = connected_memory();
        let mut w = ArgWriter::new();
        encode_command(&mut w, "SET", &["a", "1"]);
        encode_command(&mut w, "INCR", &["a"]);
        encode_command(&mut w, "GET", &["a"]);
        let payload = w.into_bytes();

        let reply = op_pipeline(&mut client, &mut ArgReader::new(&payload))
            .unwrap()
            .unwrap();
        assert_eq!(reply.array_len(), 3);
        assert_eq!(reply.get_array()[1], ReplyValue::Int(2));
        assert_eq!(reply.get_array()[2], ReplyValue::str("2"));

        // Disconnected client refuses every pipe; each slot becomes an error.
        client.close();
        let reply = op_pipeline(&mut client, &mut ArgReader::new(&payload))
            .unwrap()
            .unwrap();
        assert_eq!(reply.array_len(), 3);
        assert!(reply
            .get_array()
            .iter()
            .all(|r| r.error_code() == Some(ErrorCode::Store)));
    }

    #[test]
    fn test_malformed_pipeline_reaches_no_sub_command() {
        let mut client = connected_memory();
        let mut w = ArgWriter::new();
        encode_command(&mut w, "SET", &["a", "1"]);
        w.put_int(5);
        let payload = w.into_bytes();

        assert!(op_pipeline(&mut client, &mut ArgReader::new(&payload)).is_err());
        assert!(client.pop_reply().is_none());
    }

    #[test]
    fn test_connect_rejects_garbage_config() {
        let mut client = MemoryServer::new().client();
        let mut w = ArgWriter::new();
        w.put_bytes([0xffu8; 2]);
        let payload = w.into_bytes();
        let err = op_connect(&mut client, &mut ArgReader::new(&payload)).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidArgument(_)));
        assert!(!client.is_alive());
    }
}
