//! Length-prefixed JSON framing.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```
//!
//! The helpers here do no I/O. The server reads the 4-byte header, asks
//! [`frame_length`] how much payload follows, reads it, then hands it to
//! [`decode_payload`].

use serde::{Serialize, de::DeserializeOwned};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Serializes `message` and prepends its length.
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    let len = checked_len(json.len())?;

    let mut frame = Vec::with_capacity(HEADER_LEN + json.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&json);
    Ok(frame)
}

/// Payload length announced by a header, rejecting empty and oversized
/// frames before anything is allocated.
pub fn frame_length(header: [u8; HEADER_LEN]) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }
    checked_len(len)?;
    Ok(len)
}

/// Parses a payload read after [`frame_length`].
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(payload)?)
}

fn checked_len(len: usize) -> ProtocolResult<u32> {
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    // MAX_MESSAGE_SIZE fits in u32.
    Ok(len as u32)
}
