//! # courier-wire: the courier wire protocol
//!
//! Length-prefixed binary frames over TCP. Each frame is a 4-byte
//! little-endian payload length followed by a postcard-encoded [`Request`]
//! or [`Response`] envelope. Three calls exist: send a message, receive
//! messages addressed to a user, and list messages a user sent.
//!
//! Frames are capped at [`MAX_FRAME_LEN`]; a peer announcing more is
//! protocol-broken and the connection is dropped.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use courier_types::Message;

/// Bytes of the length prefix in front of every frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// Upper bound on a frame payload.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while framing or (de)serializing.
#[derive(Debug, Error)]
pub enum WireError {
    /// Payload failed to decode.
    #[error("decode error: {0}")]
    Decode(postcard::Error),

    /// Payload failed to encode.
    #[error("encode error: {0}")]
    Encode(postcard::Error),

    /// The length prefix exceeds [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),

    /// A message arrived with an empty addressee list.
    #[error("message has no addressees")]
    EmptyAddressees,
}

/// One length-prefixed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The postcard-encoded envelope.
    pub payload: Bytes,
}

impl Frame {
    /// Pops one complete frame off `buf`, or returns `None` until enough
    /// bytes have accumulated.
    pub fn decode(buf: &mut BytesMut) -> WireResult<Option<Frame>> {
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&buf[..FRAME_HEADER_LEN]);
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge(len));
        }
        if buf.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }
        buf.advance(FRAME_HEADER_LEN);
        let payload = buf.split_to(len).freeze();
        Ok(Some(Frame { payload }))
    }

    /// Appends the frame to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        out.reserve(FRAME_HEADER_LEN + self.payload.len());
        out.put_u32_le(self.payload.len() as u32);
        out.extend_from_slice(&self.payload);
    }
}

/// Correlates a response with its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Call outcome reported inside the response payload. A storage failure is
/// an `Error` status on an otherwise successfully delivered response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The call succeeded.
    Ok,
    /// The call failed server-side; details are in the server log.
    Error,
}

/// A client request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Echoed verbatim in the response.
    pub id: RequestId,
    /// The call itself.
    pub payload: RequestPayload,
}

/// The three calls of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestPayload {
    /// Store a message for its addressees.
    Send {
        /// The message to store.
        message: Message,
    },
    /// Fetch messages addressed to `user`, expanded through group
    /// membership.
    Receive {
        /// The requesting login.
        user: String,
    },
    /// Fetch messages previously sent by `user`.
    Sent {
        /// The requesting login.
        user: String,
    },
}

/// A server response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// The id of the request this answers.
    pub id: RequestId,
    /// The call result.
    pub payload: ResponsePayload,
}

/// Response bodies, one per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Answer to [`RequestPayload::Send`].
    Send {
        /// Call outcome.
        status: Status,
    },
    /// Answer to [`RequestPayload::Receive`].
    Receive {
        /// Call outcome.
        status: Status,
        /// Matching messages, unordered.
        messages: Vec<Message>,
    },
    /// Answer to [`RequestPayload::Sent`].
    Sent {
        /// Call outcome.
        status: Status,
        /// Matching messages, unordered.
        messages: Vec<Message>,
    },
}

impl Request {
    /// Decodes a request from a frame, rejecting messages without
    /// addressees.
    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        let request: Self = postcard::from_bytes(&frame.payload).map_err(WireError::Decode)?;
        if let RequestPayload::Send { message } = &request.payload {
            if message.to.is_empty() {
                return Err(WireError::EmptyAddressees);
            }
        }
        Ok(request)
    }

    /// Encodes the request into a frame.
    pub fn to_frame(&self) -> WireResult<Frame> {
        let payload = postcard::to_allocvec(self).map_err(WireError::Encode)?;
        Ok(Frame {
            payload: Bytes::from(payload),
        })
    }
}

impl Response {
    /// Decodes a response from a frame.
    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        postcard::from_bytes(&frame.payload).map_err(WireError::Decode)
    }

    /// Encodes the response into a frame.
    pub fn to_frame(&self) -> WireResult<Frame> {
        let payload = postcard::to_allocvec(self).map_err(WireError::Encode)?;
        Ok(Frame {
            payload: Bytes::from(payload),
        })
    }
}
