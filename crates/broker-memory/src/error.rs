use courier_broker::{PubSubError, StreamBrokerError};
use thiserror::Error;

/// Error type for in-memory broker operations.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The consumer group was never created on the log.
    #[error("unknown consumer group `{group}` on log `{log}`")]
    UnknownGroup {
        /// The log that was read.
        log: String,

        /// The group that was not found.
        group: String,
    },
}

impl PubSubError for Error {}

impl StreamBrokerError for Error {}
