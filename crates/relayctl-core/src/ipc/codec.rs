//! Wire framing for the relay socket.
//!
//! A connection carries one JSON value in each direction. The sender may
//! terminate it with a newline or simply half-close the stream; the reader
//! stops at whichever comes first, or as soon as the bytes received so far
//! already form a complete JSON value.

use relayctl_config::ALL_RELAYS;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::types::{RelayRequest, RelayResponse, RelayStatus, StatusMap};

/// Largest request the daemon will buffer.
pub const MAX_FRAME_LEN: usize = 4096;

/// Errors from framing or decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("connection closed before a message was received")]
    Empty,

    #[error("message exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one framed message of at most `limit` bytes.
///
/// Returns the message bytes without any trailing newline.
pub async fn read_frame<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        frame.extend_from_slice(&chunk[..n]);

        if let Some(end) = frame.iter().position(|&b| b == b'\n') {
            frame.truncate(end);
            break;
        }
        if frame.len() > limit {
            return Err(ProtocolError::TooLarge { limit });
        }
        if is_complete(&frame) {
            break;
        }
    }

    if frame.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::Empty);
    }
    if frame.len() > limit {
        return Err(ProtocolError::TooLarge { limit });
    }
    Ok(frame)
}

/// Whether `bytes` holds a full JSON value. Syntax errors other than
/// running out of input also count as complete; the decoder reports them.
fn is_complete(bytes: &[u8]) -> bool {
    match serde_json::from_slice::<IgnoredAny>(bytes) {
        Ok(_) => true,
        Err(e) => !e.is_eof(),
    }
}

/// Serialize `message` as one newline-terminated JSON line.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn decode_request(bytes: &[u8]) -> Result<RelayRequest, ProtocolError> {
    decode(bytes)
}

/// An `{"error": ...}` reply with no other keys.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ErrorReply {
    error: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SingleReply {
    Error(ErrorReply),
    Single { relay: String, status: RelayStatus },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AllReply {
    Error(ErrorReply),
    All(StatusMap),
}

/// Decode the daemon's reply to `request`.
///
/// A single-relay request is answered with `{"relay", "status"}` and an
/// `all` request with a name → status map; either may instead be an exact
/// `{"error": ...}` object.
pub fn decode_reply(request: &RelayRequest, bytes: &[u8]) -> Result<RelayResponse, ProtocolError> {
    let response = if request.relay == ALL_RELAYS {
        match decode::<AllReply>(bytes)? {
            AllReply::Error(ErrorReply { error }) => RelayResponse::Error { error },
            AllReply::All(statuses) => RelayResponse::All(statuses),
        }
    } else {
        match decode::<SingleReply>(bytes)? {
            SingleReply::Error(ErrorReply { error }) => RelayResponse::Error { error },
            SingleReply::Single { relay, status } => RelayResponse::Single { relay, status },
        }
    };
    Ok(response)
}
