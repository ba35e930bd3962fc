//! Abstract interface for the shared broker transport.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Channel-based broadcast of raw frames.
pub mod pubsub;

/// Durable append logs with consumer-group delivery.
pub mod stream;

pub use pubsub::{PubSubBroker, PubSubError};
pub use stream::{StreamBroker, StreamBrokerError, StreamEntry};
