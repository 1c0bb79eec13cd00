//! Worker Dispatch Loop
//!
//! Runs on the connector's dedicated thread. Each iteration collects the
//! request batch, dispatches every item against the store client in FIFO
//! order, lets the client do its housekeeping and publishes the replies.
//!
//! Every dispatched item leaves with exactly one reply, failures included,
//! so the owner never waits on a request that was actually processed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::codec::ArgReader;
use crate::core::error::ConnectorError;
use crate::core::reply::ReplyValue;
use crate::store::StoreClient;
use crate::transport::{Channel, ItemList, QueueItem};

use super::opcode::OpTable;

/// Bytes of a rejected payload included in log lines.
const LOG_PAYLOAD_PREFIX: usize = 16;

/// Flags shared between the owner and its worker.
#[derive(Debug, Default)]
pub struct WorkerSignals {
    /// Cleared by the owner to stop the loop.
    pub running: AtomicBool,
    /// Set while the worker holds unflushed work.
    pub busy: AtomicBool,
}

/// Items still held by the worker when it exited.
#[derive(Debug, Default)]
pub struct WorkerRemains {
    /// Requests collected but not dispatched.
    pub inbox: ItemList,
    /// Replies not yet published.
    pub outbox: ItemList,
}

/// Worker-side state of one connector.
pub struct Worker<C: StoreClient> {
    client: C,
    ops: OpTable<C>,
    requests: Arc<Channel>,
    responses: Arc<Channel>,
    signals: Arc<WorkerSignals>,
    inbox: ItemList,
    outbox: ItemList,
    idle_sleep: Duration,
    spin_rounds: u32,
}

impl<C: StoreClient> Worker<C> {
    /// Create a worker around `client`.
    pub fn new(
        client: C,
        requests: Arc<Channel>,
        responses: Arc<Channel>,
        signals: Arc<WorkerSignals>,
        idle_sleep: Duration,
        spin_rounds: u32,
    ) -> Self {
        Self {
            client,
            ops: OpTable::for_client(),
            requests,
            responses,
            signals,
            inbox: ItemList::new(),
            outbox: ItemList::new(),
            idle_sleep,
            spin_rounds,
        }
    }

    /// Loop until the running flag is cleared, then close the client and
    /// hand back whatever was still in flight.
    pub fn run(mut self) -> WorkerRemains {
        info!(opcodes = self.ops.len(), "store worker started");
        let mut idle_rounds: u32 = 0;

        while self.signals.running.load(Ordering::Acquire) {
            if self.pump() > 0 {
                idle_rounds = 0;
                continue;
            }
            idle_rounds = idle_rounds.saturating_add(1);
            if idle_rounds <= self.spin_rounds {
                thread::yield_now();
            } else {
                thread::sleep(self.idle_sleep);
            }
        }

        self.client.close();
        info!(
            undispatched = self.inbox.len(),
            unpublished = self.outbox.len(),
            "store worker stopped"
        );
        WorkerRemains {
            inbox: self.inbox,
            outbox: self.outbox,
        }
    }

    /// One iteration. Returns the number of items dispatched.
    pub fn pump(&mut self) -> usize {
        self.requests.collect(&mut self.inbox);
        if !self.inbox.is_empty() {
            self.signals.busy.store(true, Ordering::Release);
        }

        let mut dispatched = 0;
        while let Some(mut item) = self.inbox.pop_front() {
            self.dispatch(&mut item);
            self.outbox.push_back(item);
            dispatched += 1;
            if !self.signals.running.load(Ordering::Acquire) {
                break;
            }
        }

        self.client.update();

        self.responses.publish(&mut self.outbox);
        if self.inbox.is_empty() {
            self.signals.busy.store(false, Ordering::Release);
        }
        dispatched
    }

    /// Attach exactly one reply to `item`.
    fn dispatch(&mut self, item: &mut QueueItem) {
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(id = item.id, opcode = %item.opcode, bytes = item.payload.len(), "dispatch");

        if item.payload.is_empty() {
            warn!(id = item.id, opcode = %item.opcode, "empty payload rejected");
            item.reply = Some(ReplyValue::from_error(&ConnectorError::invalid(
                "empty payload",
            )));
            return;
        }

        let Some(handler) = self.ops.get(item.opcode) else {
            warn!(
                id = item.id,
                opcode = %item.opcode,
                payload = %hex::encode(&item.payload[..item.payload.len().min(LOG_PAYLOAD_PREFIX)]),
                "unknown opcode"
            );
            item.reply = Some(ReplyValue::from_error(&ConnectorError::invalid(format!(
                "unknown opcode {}",
                item.opcode
            ))));
            return;
        };

        let mut args = ArgReader::new(&item.payload);
        let reply = match handler(&mut self.client, &mut args) {
            Ok(Some(direct)) => direct,
            Ok(None) => self
                .client
                .pop_reply()
                .unwrap_or_else(|| ReplyValue::from_error(&ConnectorError::ReplyNotFound)),
            Err(e) => {
                if matches!(e, ConnectorError::InvalidArgument(_)) {
                    warn!(
                        id = item.id,
                        op = self.ops.name(item.opcode).unwrap_or("?"),
                        payload = %hex::encode(&item.payload[..item.payload.len().min(LOG_PAYLOAD_PREFIX)]),
                        error = %e,
                        "malformed payload"
                    );
                } else {
                    debug!(id = item.id, error = %e, "operation failed");
                }
                ReplyValue::from_error(&e)
            }
        };

        // Anything the client still holds belongs to this item, never the next.
        let mut stale = 0usize;
        while self.client.pop_reply().is_some() {
            stale += 1;
        }
        if stale > 0 {
            debug!(id = item.id, stale, "discarded stale replies");
        }

        item.reply = Some(reply);
    }
}
