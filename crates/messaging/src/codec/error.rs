use thiserror::Error;

/// Error type for wire encoding and decoding.
///
/// Decode failures are protocol errors: reported per frame, the frame
/// dropped, and the receive loop left running.
#[derive(Debug, Error)]
pub enum Error {
    /// The frame ended before a fixed-width field or prefixed payload.
    #[error("frame is truncated")]
    Truncated,

    /// A length prefix was negative (and not the absent marker).
    #[error("invalid length prefix {0}")]
    InvalidLength(i32),

    /// A required string field carried the absent marker.
    #[error("required string field is absent")]
    AbsentString,

    /// A string field was not valid UTF-8.
    #[error("string field is not valid utf-8")]
    InvalidUtf8,

    /// The message-type discriminant names no known classification.
    #[error("unknown message type id {0}")]
    UnknownMessageType(i32),

    /// The packet type id has no registered coder.
    #[error(transparent)]
    Registry(#[from] crate::packet::registry::Error),

    /// A coder was handed a packet of a different shape.
    #[error("packet is not a {0}")]
    UnexpectedPacket(&'static str),
}
