//! Service error types.

use schedsync_calendar::GatewayError;
use schedsync_core::CoreError;
use schedsync_protocol::ProtocolError;
use thiserror::Error;

use crate::store::StoreError;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Coarse classification of a [`ServiceError`].
///
/// Recovery decisions and the caller-facing error code are both derived
/// from this rather than from individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A token was rejected, or the user never linked a calendar.
    Unauthorized,
    /// A remote calendar or event, or a local record, is missing.
    NotFound,
    /// The publisher has stopped.
    ChannelClosed,
    /// The publisher queue is full.
    Backpressure,
    /// Credential or relational store I/O failed.
    Storage,
    /// The caller is not allowed to act on the resource.
    PermissionDenied,
    /// The request itself is malformed.
    InvalidArgument,
    /// Anything else.
    Internal,
}

/// Errors that can occur in the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The user has no usable calendar session.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Calendar provider failure.
    #[error("calendar gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Credential, binding, schedule or group store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The publisher no longer accepts messages.
    #[error("publisher channel closed")]
    ChannelClosed,

    /// The publisher queue is full.
    #[error("publisher queue is full")]
    Backpressure,

    /// The caller is not the owner or participant the operation requires.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed ids, empty filters, invalid windows.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced group or link does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// JSON encoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing failure on the socket.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Another daemon is already serving the socket.
    #[error("socket already in use: {0}")]
    SocketInUse(String),
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl ServiceError {
    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates a permission denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Gateway(e) if e.is_unauthorized() => ErrorKind::Unauthorized,
            Self::Gateway(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Gateway(_) => ErrorKind::Internal,
            Self::Storage(StoreError::NotFound(_)) => ErrorKind::NotFound,
            Self::Storage(StoreError::Conflict(_)) => ErrorKind::InvalidArgument,
            Self::Storage(_) => ErrorKind::Storage,
            Self::ChannelClosed => ErrorKind::ChannelClosed,
            Self::Backpressure => ErrorKind::Backpressure,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Serialization(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Protocol(_)
            | Self::SocketInUse(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if a token was rejected or no session exists.
    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    /// Returns true if the provider reported a missing calendar or event.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, Self::Gateway(e) if e.is_not_found())
    }
}
