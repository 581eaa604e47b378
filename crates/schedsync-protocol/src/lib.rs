//! Request/response types for the schedsync service.
//!
//! Every operation a caller can invoke is one [`Request`] variant; every
//! result is one [`Response`] variant. Failures are reported as
//! [`Response::Error`] with a coarse [`ErrorCode`]; internal details never
//! cross this boundary.
//!
//! Over the daemon's Unix socket each message travels as an [`Envelope`]
//! framed with a 4-byte big-endian length prefix (see [`encode_message`]).
//!
//! # Example
//!
//! ```rust
//! use schedsync_protocol::{Request, Response};
//!
//! let request: Request = serde_json::from_str(r#"{"type":"login_url"}"#).unwrap();
//! assert_eq!(request, Request::LoginUrl);
//!
//! let response = Response::Authorized { authorized: true };
//! assert!(response.is_success());
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{HEADER_LEN, decode_payload, encode_message, frame_length};
pub use types::{Envelope, ErrorCode, ErrorResponse, EventView, Request, Response};

/// Protocol version carried in every envelope.
pub const PROTOCOL_VERSION: &str = "1";

/// Largest accepted payload (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
