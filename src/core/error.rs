//! Connector Errors
//!
//! Error taxonomy shared by every layer of the connector.
//!
//! Build-time errors (bad arguments, pool exhaustion, wrong state) are
//! returned synchronously from the call that detected them. Runtime errors
//! travel back to the owner as an `Error` reply whose text starts with the
//! matching [`ErrorCode`].

use std::fmt;

use crate::store::StoreError;

/// Crate result type.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Errors raised by the connector framework.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Empty command, malformed payload or unknown opcode.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the current state.
    #[error("invalid state: {0}")]
    StateInvalid(String),

    /// Item pool exhausted.
    #[error("item pool exhausted ({limit} items outstanding)")]
    MemoryNotEnough {
        /// Configured outstanding-item limit.
        limit: usize,
    },

    /// Error reported by the store client.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A dispatched item produced no reply.
    #[error("store produced no reply")]
    ReplyNotFound,

    /// The worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

impl ConnectorError {
    /// Shorthand for [`ConnectorError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for [`ConnectorError::StateInvalid`].
    pub fn state(msg: impl Into<String>) -> Self {
        Self::StateInvalid(msg.into())
    }

    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::StateInvalid(_) | Self::WorkerSpawn(_) => ErrorCode::StateInvalid,
            Self::MemoryNotEnough { .. } => ErrorCode::MemoryNotEnough,
            Self::Store(_) => ErrorCode::Store,
            Self::ReplyNotFound => ErrorCode::ReplyNotFound,
        }
    }
}

/// Stable error codes carried in error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Bad arguments or protocol violation.
    InvalidArgument,
    /// Wrong state for the operation.
    StateInvalid,
    /// Allocation limit reached.
    MemoryNotEnough,
    /// Store client failure.
    Store,
    /// No reply was produced for a processed item.
    ReplyNotFound,
}

impl ErrorCode {
    /// All codes, in declaration order.
    pub const ALL: [ErrorCode; 5] = [
        ErrorCode::InvalidArgument,
        ErrorCode::StateInvalid,
        ErrorCode::MemoryNotEnough,
        ErrorCode::Store,
        ErrorCode::ReplyNotFound,
    ];

    /// Textual form used as the error reply prefix.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::StateInvalid => "STATE_INVALID",
            ErrorCode::MemoryNotEnough => "MEMORY_NOT_ENOUGH",
            ErrorCode::Store => "STORE",
            ErrorCode::ReplyNotFound => "REPLY_NOT_FOUND",
        }
    }

    /// Parse the code prefix of an error reply (`"CODE: message"`).
    pub fn from_reply(text: &[u8]) -> Option<Self> {
        let end = text.iter().position(|&b| b == b':')?;
        let prefix = &text[..end];
        Self::ALL
            .into_iter()
            .find(|code| code.as_str().as_bytes() == prefix)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
