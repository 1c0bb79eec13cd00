//! Dual-Queue Transport
//!
//! Two independent [`Channel`]s per connector (requests, responses) plus the
//! pooled [`QueueItem`] envelope that travels through them.

pub mod channel;
pub mod item;

pub use channel::{Channel, ItemList};
pub use item::{ItemBox, ItemPool, QueueItem};
