//! Request and response types for the schedsync service.
//!
//! Identifiers travel as strings and are parsed by the handler, so a
//! malformed id surfaces as [`ErrorCode::InvalidArgument`] rather than a
//! decode failure.

use chrono::{DateTime, Utc};
use schedsync_core::{Group, Schedule};
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Wire wrapper around every request and response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub protocol_version: String,
    /// Echoed back on the response for correlation.
    pub request_id: String,
    /// Verified caller identity, stamped by the fronting gateway. Absent
    /// for anonymous requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates a request envelope on behalf of `caller_id`.
    pub fn request(request_id: impl Into<String>, caller_id: Option<String>, request: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id: request_id.into(),
            caller_id,
            payload: request,
        }
    }

    /// Creates a response envelope.
    pub fn response(request_id: impl Into<String>, response: T) -> Self {
        Self::request(request_id, None, response)
    }

    /// Checks if this envelope uses a compatible protocol version.
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

/// Requests accepted by the service.
///
/// The caller's verified identity is passed alongside the request, never
/// inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Book a session for one student.
    CreateSchedule {
        group_id: String,
        title: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        trainer_id: String,
        student_id: String,
    },

    /// Book a session for every student of a group.
    CreateScheduleForGroup {
        group_id: String,
        title: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        trainer_id: String,
    },

    /// List schedule rows. At least one id must be set.
    GetSchedules {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trainer_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        student_id: Option<String>,
    },

    /// Remove every row of a group run by the trainer.
    DeleteSchedule { group_id: String, trainer_id: String },

    /// Create a group owned by the trainer.
    CreateGroup { name: String, trainer_id: String },

    /// List groups by trainer and/or student.
    GetGroups {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trainer_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        student_id: Option<String>,
    },

    /// Fetch a single group.
    GetGroup { group_id: String },

    /// Delete a group owned by the trainer.
    DeleteGroup { group_id: String, trainer_id: String },

    /// Join a group through its invitation link.
    JoinGroup { student_id: String, link: String },

    /// Issue a calendar consent URL for the caller.
    LoginUrl,

    /// Complete the OAuth callback for the caller.
    Authorize { code: String, state: String },

    /// Check whether the caller has linked a calendar.
    IsAuthorized,

    /// List the caller's calendar events in a window.
    ListEvents {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Request {
    /// Returns the snake_case operation name, for logging.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateSchedule { .. } => "create_schedule",
            Self::CreateScheduleForGroup { .. } => "create_schedule_for_group",
            Self::GetSchedules { .. } => "get_schedules",
            Self::DeleteSchedule { .. } => "delete_schedule",
            Self::CreateGroup { .. } => "create_group",
            Self::GetGroups { .. } => "get_groups",
            Self::GetGroup { .. } => "get_group",
            Self::DeleteGroup { .. } => "delete_group",
            Self::JoinGroup { .. } => "join_group",
            Self::LoginUrl => "login_url",
            Self::Authorize { .. } => "authorize",
            Self::IsAuthorized => "is_authorized",
            Self::ListEvents { .. } => "list_events",
        }
    }
}

/// A calendar event as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventView {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Responses returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Generic success.
    Ok,

    /// Schedule rows.
    Schedules { schedules: Vec<Schedule> },

    /// Groups.
    Groups { groups: Vec<Group> },

    /// A single group.
    Group { group: Group },

    /// Consent URL. Empty when the service could not record the login state.
    LoginUrl { url: String },

    /// Calendar link status.
    Authorized { authorized: bool },

    /// Calendar events.
    Events { events: Vec<EventView> },

    /// Error response.
    Error {
        #[serde(flatten)]
        error: ErrorResponse,
    },
}

impl Response {
    /// Creates an Error response.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorResponse::new(code, message),
        }
    }

    /// Returns true unless this is an error response.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }

    /// Returns the error if this is an error response.
    pub fn as_error(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// Error codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed ids, empty filters, invalid windows.
    InvalidArgument,
    /// No verified caller identity was supplied.
    Unauthenticated,
    /// The caller is not a participant of the resource.
    PermissionDenied,
    /// The referenced group or link does not exist.
    NotFound,
    /// Anything else. Details stay in the server log.
    Internal,
}

impl ErrorCode {
    /// Returns a human-readable description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "not found",
            Self::Internal => "internal error",
        }
    }
}

/// Error response details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new error response.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates the opaque internal error.
    pub fn internal() -> Self {
        Self::new(ErrorCode::Internal, ErrorCode::Internal.description())
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl std::error::Error for ErrorResponse {}
