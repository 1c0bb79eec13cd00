//! Worker-side dispatch.
//!
//! - `opcode`: opcode constants and the handler registration table
//! - `worker`: the dedicated-thread dispatch loop

pub mod opcode;
pub mod worker;

pub use opcode::{Handler, OpTable, Opcode};
pub use worker::{Worker, WorkerRemains, WorkerSignals};
