use thiserror::Error;

/// Error type for bus operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] crate::codec::Error),

    /// The packet shape is not registered.
    #[error(transparent)]
    Registry(#[from] crate::packet::registry::Error),

    /// The broker rejected the operation.
    #[error("broker error: {0}")]
    Broker(#[source] Box<dyn std::error::Error + Send + Sync>),
}
