//! Core building blocks.
//!
//! Types shared by both sides of a connector: the argument codec, reply
//! values, the error taxonomy and per-connector configuration.

pub mod codec;
pub mod config;
pub mod error;
pub mod reply;

// Re-export core types
pub use codec::{ArgReader, ArgTag, ArgWriter};
pub use config::ConnectorConfig;
pub use error::{ConnectorError, ErrorCode, Result};
pub use reply::{ReplyKind, ReplyValue};
