//! Pooled Queue Items
//!
//! The envelope that carries one request to the worker and its reply back.
//! Items are owned by exactly one side at a time; they change hands only
//! when a whole batch is spliced through a [`super::Channel`].

use crate::core::error::{ConnectorError, Result};
use crate::core::reply::ReplyValue;
use crate::dispatch::opcode::Opcode;

/// One request/response envelope.
#[derive(Debug, Default)]
pub struct QueueItem {
    /// Correlation id.
    pub id: u64,
    /// Operation selector.
    pub opcode: Opcode,
    /// Codec-encoded arguments.
    pub payload: Vec<u8>,
    /// Reply attached by the worker.
    pub reply: Option<ReplyValue>,
}

impl QueueItem {
    /// Clear for reuse. The payload keeps its capacity.
    fn reset(&mut self) {
        self.id = 0;
        self.opcode = Opcode::default();
        self.payload.clear();
        self.reply = None;
    }
}

/// Boxed item, the unit moved between threads.
pub type ItemBox = Box<QueueItem>;

/// Owner-side item allocator.
///
/// A bounded free-list in front of the global allocator. `outstanding`
/// counts every item handed out and not yet released, wherever it currently
/// lives; it is the leak detector for shutdown and timeout paths.
#[derive(Debug)]
pub struct ItemPool {
    free: Vec<ItemBox>,
    free_cap: usize,
    outstanding: usize,
    max_outstanding: usize,
}

impl ItemPool {
    /// Create a pool. `max_outstanding == 0` disables the limit.
    pub fn new(max_outstanding: usize, free_cap: usize) -> Self {
        Self {
            free: Vec::with_capacity(free_cap.min(64)),
            free_cap,
            outstanding: 0,
            max_outstanding,
        }
    }

    /// Take an item from the pool.
    pub fn acquire(&mut self) -> Result<ItemBox> {
        if self.max_outstanding != 0 && self.outstanding >= self.max_outstanding {
            return Err(ConnectorError::MemoryNotEnough {
                limit: self.max_outstanding,
            });
        }
        let item = self.free.pop().unwrap_or_default();
        self.outstanding += 1;
        Ok(item)
    }

    /// Return an item.
    pub fn release(&mut self, mut item: ItemBox) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.free.len() < self.free_cap {
            item.reset();
            self.free.push(item);
        }
    }

    /// Items handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Items parked for reuse.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }
}
