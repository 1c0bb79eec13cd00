//! Async Connector
//!
//! Public, owner-thread face of one store connection. Every call returns
//! right after a local enqueue; the request goes out on the next
//! [`AsyncConnector::update`], and its callback fires during a later
//! `update()` on the same thread.
//!
//! ```text
//!  owner thread                                   worker thread
//!  ───────────                                    ─────────────
//!  command()/submit() ─► outgoing ─┐          ┌─► inbox ─► dispatch ─► StoreClient
//!                                  │ requests │                │
//!  update() ──────────── publish ──┴──────────┘                ▼
//!     │                                                     outbox
//!     └── collect ◄── incoming ◄──── responses ◄── publish ────┘
//!            │
//!            └─► correlation table ─► callback(reply)
//! ```

use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info};

use crate::core::codec::{check_command, encode_command, ArgWriter};
use crate::core::config::ConnectorConfig;
use crate::core::error::{ConnectorError, Result};
use crate::core::reply::ReplyValue;
use crate::dispatch::opcode::Opcode;
use crate::dispatch::worker::{Worker, WorkerRemains, WorkerSignals};
use crate::store::{StoreClient, StoreConfig};
use crate::transport::{Channel, ItemBox, ItemList, ItemPool};

use super::correlation::{Callback, CorrelationTable};
use super::pipeline::PipelineStaging;

static CONNECTOR_SEQ: AtomicU64 = AtomicU64::new(0);

/// Outcome of one [`AsyncConnector::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Callbacks invoked.
    pub delivered: usize,
    /// Responses dropped because their request had already timed out.
    pub orphaned: usize,
    /// Requests evicted by timeout.
    pub timed_out: usize,
}

impl AddAssign for UpdateReport {
    fn add_assign(&mut self, rhs: Self) {
        self.delivered += rhs.delivered;
        self.orphaned += rhs.orphaned;
        self.timed_out += rhs.timed_out;
    }
}

/// Non-blocking, callback-based connector backed by one worker thread.
pub struct AsyncConnector {
    name: String,
    pool: ItemPool,
    table: CorrelationTable,
    staging: Option<PipelineStaging>,
    /// Owner-local request list.
    outgoing: ItemList,
    /// Owner-local response list.
    incoming: ItemList,
    requests: Arc<Channel>,
    responses: Arc<Channel>,
    signals: Arc<WorkerSignals>,
    worker: Option<JoinHandle<WorkerRemains>>,
    stopped: bool,
}

impl AsyncConnector {
    /// Move `client` onto a new worker thread and return the owner handle.
    ///
    /// The client is not connected yet; call [`AsyncConnector::connect`].
    pub fn start<C: StoreClient>(client: C, config: ConnectorConfig) -> Result<Self> {
        let seq = CONNECTOR_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", config.worker_name, seq);

        let requests = Arc::new(Channel::new());
        let responses = Arc::new(Channel::new());
        let signals = Arc::new(WorkerSignals::default());
        signals.running.store(true, Ordering::Release);

        let worker = Worker::new(
            client,
            requests.clone(),
            responses.clone(),
            signals.clone(),
            config.idle_sleep,
            config.spin_rounds,
        );
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run())?;

        info!(
            connector = %name,
            req_timeout_ms = config.req_timeout.as_millis() as u64,
            "connector started"
        );

        Ok(Self {
            name,
            pool: ItemPool::new(config.max_outstanding, config.free_list_cap),
            table: CorrelationTable::new(config.req_timeout),
            staging: None,
            outgoing: ItemList::new(),
            incoming: ItemList::new(),
            requests,
            responses,
            signals,
            worker: Some(handle),
            stopped: false,
        })
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Queue a connect. Success or failure arrives through `callback`
    /// (`Bool(true)` or an error reply).
    pub fn connect(
        &mut self,
        config: &StoreConfig,
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64> {
        self.ensure_running()?;
        let blob = config
            .to_bytes()
            .map_err(|e| ConnectorError::invalid(format!("unencodable store config: {e}")))?;
        let mut w = ArgWriter::new();
        w.put_bytes(blob);
        self.submit(Opcode::CONNECT, w.into_bytes(), callback)
    }

    /// Queue one command. Any pipeline being staged is cancelled first.
    pub fn command<P: AsRef<[u8]>>(
        &mut self,
        name: &str,
        params: &[P],
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64> {
        self.ensure_running()?;
        check_command(name, params)?;
        self.cancel_pipe();

        let mut item = self.pool.acquire()?;
        let mut w = ArgWriter::reuse(std::mem::take(&mut item.payload));
        encode_command(&mut w, name, params);
        item.opcode = Opcode::COMMAND;
        item.payload = w.into_bytes();
        Ok(self.enqueue(item, Box::new(callback)))
    }

    /// Stage one sub-command of a pipeline.
    pub fn add_pipe<P: AsRef<[u8]>>(&mut self, name: &str, params: &[P]) -> Result<()> {
        self.ensure_running()?;
        check_command(name, params)?;
        if self.staging.is_none() {
            let item = self.pool.acquire()?;
            self.staging = Some(PipelineStaging::new(item));
        }
        if let Some(staging) = self.staging.as_mut() {
            staging.push(name, params);
        }
        Ok(())
    }

    /// Send the staged pipeline. `callback` receives an array with one
    /// reply per sub-command, in the order they were added.
    pub fn commit_pipe(&mut self, callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64> {
        self.ensure_running()?;
        let staging = self
            .staging
            .take()
            .ok_or_else(|| ConnectorError::state("no pipeline staged"))?;
        let mut item = staging.finish();
        item.opcode = Opcode::PIPELINE;
        Ok(self.enqueue(item, Box::new(callback)))
    }

    /// Discard the staged pipeline. Returns the number of dropped sub-commands.
    pub fn cancel_pipe(&mut self) -> usize {
        match self.staging.take() {
            Some(staging) => {
                let dropped = staging.len();
                self.pool.release(staging.discard());
                dropped
            }
            None => 0,
        }
    }

    /// Queue a close of the store connection.
    pub fn close(&mut self, callback: impl FnOnce(ReplyValue) + 'static) -> Result<u64> {
        let mut w = ArgWriter::new();
        w.put_bool(true);
        self.submit(Opcode::CLOSE, w.into_bytes(), callback)
    }

    /// Queue a raw request. The payload is handed to the opcode's handler
    /// untouched; an empty payload is answered with an error reply.
    pub fn submit(
        &mut self,
        opcode: Opcode,
        payload: Vec<u8>,
        callback: impl FnOnce(ReplyValue) + 'static,
    ) -> Result<u64> {
        self.ensure_running()?;
        let mut item = self.pool.acquire()?;
        item.opcode = opcode;
        item.payload = payload;
        Ok(self.enqueue(item, Box::new(callback)))
    }

    fn enqueue(&mut self, mut item: ItemBox, callback: Callback) -> u64 {
        let id = self.table.next_id();
        item.id = id;
        self.table.insert(id, Instant::now(), callback);
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(connector = %self.name, id, opcode = %item.opcode, "enqueue");
        self.outgoing.push_back(item);
        id
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped {
            return Err(ConnectorError::state(format!("connector {} stopped", self.name)));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Publish queued requests, deliver arrived replies and evict timed-out
    /// requests. Call once per frame from the owner thread.
    pub fn update(&mut self) -> UpdateReport {
        let mut report = UpdateReport::default();
        if self.stopped {
            return report;
        }

        self.requests.publish(&mut self.outgoing);
        self.responses.collect(&mut self.incoming);

        while let Some(mut item) = self.incoming.pop_front() {
            let reply = item
                .reply
                .take()
                .unwrap_or_else(|| ReplyValue::from_error(&ConnectorError::ReplyNotFound));
            if self.table.complete(item.id, reply) {
                report.delivered += 1;
            } else {
                debug!(connector = %self.name, id = item.id, "dropping orphan response");
                report.orphaned += 1;
            }
            self.pool.release(item);
        }

        report.timed_out = self.table.expire(Instant::now()).len();
        report
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Stop the worker and free everything still in flight without invoking
    /// any callback. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.signals.running.store(false, Ordering::Release);

        let remains = match self.worker.take().map(JoinHandle::join) {
            Some(Ok(remains)) => remains,
            Some(Err(_)) => {
                error!(connector = %self.name, "store worker panicked");
                WorkerRemains::default()
            }
            None => WorkerRemains::default(),
        };

        let mut freed = 0usize;
        if let Some(staging) = self.staging.take() {
            self.pool.release(staging.discard());
            freed += 1;
        }
        let leftovers = self
            .outgoing
            .drain(..)
            .chain(self.incoming.drain(..))
            .chain(self.requests.drain())
            .chain(self.responses.drain())
            .chain(remains.inbox)
            .chain(remains.outbox);
        for item in leftovers {
            self.pool.release(item);
            freed += 1;
        }
        let dropped = self.table.clear();
        self.signals.busy.store(false, Ordering::Release);

        info!(
            connector = %self.name,
            freed_items = freed,
            dropped_requests = dropped,
            outstanding = self.pool.outstanding(),
            "connector stopped"
        );
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Advisory: true while the worker holds unflushed work.
    pub fn is_busy(&self) -> bool {
        self.signals.busy.load(Ordering::Acquire)
    }

    /// True after [`AsyncConnector::stop`].
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.table.len()
    }

    /// Queue items alive anywhere (owner lists, swap lists, worker, staging).
    pub fn outstanding_items(&self) -> usize {
        self.pool.outstanding()
    }

    /// Sub-commands currently staged.
    pub fn staged_commands(&self) -> usize {
        self.staging.as_ref().map_or(0, PipelineStaging::len)
    }

    /// Connector (and worker thread) name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for AsyncConnector {
    fn drop(&mut self) {
        self.stop();
    }
}
