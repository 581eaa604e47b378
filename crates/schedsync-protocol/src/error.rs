//! Wire framing errors.

use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while framing or parsing a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("empty message")]
    EmptyMessage,

    #[error("malformed message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout during {operation}")]
    Timeout { operation: &'static str },
}
