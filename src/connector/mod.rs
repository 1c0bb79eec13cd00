//! Owner-side connector layer: request correlation, pipeline staging, the
//! [`AsyncConnector`] facade and [`ConnectorPool`].

pub mod correlation;
pub mod facade;
pub mod pipeline;
pub mod pool;

pub use correlation::{Callback, CorrelationTable, PendingRequest};
pub use facade::{AsyncConnector, UpdateReport};
pub use pipeline::PipelineStaging;
pub use pool::ConnectorPool;
