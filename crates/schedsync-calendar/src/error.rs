//! Error types for calendar gateway operations.
//!
//! Every provider failure is classified into a [`GatewayErrorCode`]. The
//! orchestrator only branches on two of them: [`GatewayErrorCode::Unauthorized`]
//! (refresh the session and retry once) and [`GatewayErrorCode::NotFound`]
//! (the remote calendar or event is gone). Everything else is propagated.

use std::fmt;
use thiserror::Error;

/// The category of a gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorCode {
    /// The provider rejected the access token, refresh token or grant.
    Unauthorized,
    /// The token is valid but lacks permission for the resource.
    Forbidden,
    /// The calendar or event does not exist (404, 410).
    NotFound,
    /// Connection failed, timed out, or the body could not be read.
    Network,
    /// Too many requests.
    RateLimited,
    /// The provider returned a 5xx or an unexpected status.
    Server,
    /// The response body could not be parsed.
    InvalidResponse,
    /// The request was rejected as malformed (400).
    BadRequest,
    /// Missing or invalid gateway configuration.
    Configuration,
    /// Unexpected internal state.
    Internal,
}

impl GatewayErrorCode {
    /// Returns a stable snake_case name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Network => "network_error",
            Self::RateLimited => "rate_limited",
            Self::Server => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::BadRequest => "bad_request",
            Self::Configuration => "configuration_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to a calendar provider.
#[derive(Debug, Error)]
pub struct GatewayError {
    code: GatewayErrorCode,
    message: String,
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GatewayError {
    /// Creates a new gateway error with the given code and message.
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Unauthorized, message)
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Forbidden, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NotFound, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Network, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::RateLimited, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Server, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidResponse, message)
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::BadRequest, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Configuration, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Internal, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> GatewayErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if the provider rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        self.code == GatewayErrorCode::Unauthorized
    }

    /// Returns true if the remote resource is missing.
    pub fn is_not_found(&self) -> bool {
        self.code == GatewayErrorCode::NotFound
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
