use thiserror::Error;

/// Error type for stream queue operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No codec registered for the message shape. Sending an unregistered
    /// message is a programmer error, surfaced at the send site.
    #[error("no message codec registered for `{0}`")]
    UnknownMessageType(String),

    /// The codec name is already taken; the first registration stands.
    #[error("message codec `{0}` is already registered")]
    DuplicateMessageType(String),

    /// The entry lacks a reserved or payload field.
    #[error("stream entry is missing field `{0}`")]
    MissingField(&'static str),

    /// A reserved field could not be parsed.
    #[error("stream entry field `{0}` is malformed")]
    MalformedField(&'static str),

    /// A codec was handed a message of a different shape.
    #[error("message is not a {0}")]
    UnexpectedMessage(&'static str),

    /// The broker rejected the operation.
    #[error("broker error: {0}")]
    Broker(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The queue was started twice.
    #[error("stream queue is already running")]
    AlreadyRunning,
}
