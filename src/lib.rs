//! # Store Connector
//!
//! Non-blocking access to blocking key/value stores from a single-threaded
//! game loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      STORE CONNECTOR                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── codec.rs    - Tagged argument encoding                  │
//! │  ├── reply.rs    - Reply value tree                          │
//! │  ├── error.rs    - Error taxonomy                            │
//! │  └── config.rs   - Connector configuration                   │
//! │                                                              │
//! │  transport/      - Owner <-> worker plumbing                 │
//! │  ├── item.rs     - Pooled queue items                        │
//! │  └── channel.rs  - Batch swap lists                          │
//! │                                                              │
//! │  dispatch/       - Worker side                               │
//! │  ├── opcode.rs   - Opcode registration table                 │
//! │  └── worker.rs   - Dedicated worker loop                     │
//! │                                                              │
//! │  connector/      - Owner side                                │
//! │  ├── correlation.rs - Callbacks and timeouts                 │
//! │  ├── pipeline.rs - Pipeline staging                          │
//! │  ├── facade.rs   - AsyncConnector                            │
//! │  └── pool.rs     - ConnectorPool                             │
//! │                                                              │
//! │  store/          - Blocking clients                          │
//! │  ├── memory.rs   - In-process key/value server               │
//! │  └── ordered.rs  - Embedded ordered engine + typed ops       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Threading
//!
//! Every connector owns exactly one worker thread, and its store client
//! lives there. Everything else (issuing requests, `update()`, callbacks)
//! happens on the owner thread. Callbacks are `FnOnce` and fire at most
//! once; a request that times out never gets its callback.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod connector;
pub mod core;
pub mod dispatch;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use connector::{AsyncConnector, ConnectorPool, UpdateReport};
pub use crate::core::{ArgReader, ArgWriter, ConnectorConfig, ConnectorError, ErrorCode, ReplyValue, Result};
pub use dispatch::Opcode;
pub use store::{MemoryServer, MemoryStore, OrderedDb, OrderedOps, OrderedStore, StoreClient, StoreConfig, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
