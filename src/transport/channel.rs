//! Swap Channels
//!
//! One direction of the owner/worker transport. Each thread keeps its own
//! local list and touches it without locking; the only shared state is the
//! swap list behind a mutex.
//!
//! The swap list holds whole batches. Publishing moves the sender's entire
//! local list in as one batch and collecting takes every batch out at once,
//! so the lock is held for a pointer move no matter how deep the queue is.
//! Flattening batches into the receiver's local list happens after unlock.

use std::collections::VecDeque;
use std::mem;

use parking_lot::Mutex;

use super::item::ItemBox;

/// Thread-local FIFO of items.
pub type ItemList = VecDeque<ItemBox>;

/// Mutex-guarded batch swap list for one direction.
#[derive(Debug, Default)]
pub struct Channel {
    swap: Mutex<Vec<ItemList>>,
}

impl Channel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the whole of `local` onto the swap list. Returns items moved.
    pub fn publish(&self, local: &mut ItemList) -> usize {
        if local.is_empty() {
            return 0;
        }
        let batch = mem::take(local);
        let moved = batch.len();
        self.swap.lock().push(batch);
        moved
    }

    /// Append every published item to `local`, oldest first. Returns items moved.
    pub fn collect(&self, local: &mut ItemList) -> usize {
        let batches = mem::take(&mut *self.swap.lock());
        let mut moved = 0;
        for mut batch in batches {
            moved += batch.len();
            if local.is_empty() {
                mem::swap(local, &mut batch);
            } else {
                local.append(&mut batch);
            }
        }
        moved
    }

    /// Take everything left on the swap list. Used during shutdown.
    pub fn drain(&self) -> Vec<ItemBox> {
        let batches = mem::take(&mut *self.swap.lock());
        batches.into_iter().flatten().collect()
    }

    /// True if nothing is waiting on the swap list.
    pub fn is_empty(&self) -> bool {
        self.swap.lock().iter().all(VecDeque::is_empty)
    }
}
