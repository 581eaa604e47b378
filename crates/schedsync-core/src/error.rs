//! Validation errors for core types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for core validation.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised when constructing or validating core types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An identifier could not be parsed.
    #[error("invalid {kind} id: {value:?}")]
    InvalidId { kind: &'static str, value: String },

    /// A filter was built without any criteria.
    #[error("filter must set at least one of: {fields}")]
    EmptyFilter { fields: &'static str },

    /// A time window whose end is not after its start.
    #[error("invalid time window: start {start} is not before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A required text field was blank.
    #[error("{field} must not be empty")]
    Blank { field: &'static str },
}

impl CoreError {
    /// Creates an invalid id error.
    pub fn invalid_id(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidId {
            kind,
            value: value.into(),
        }
    }

    /// Creates a blank field error.
    pub fn blank(field: &'static str) -> Self {
        Self::Blank { field }
    }
}
