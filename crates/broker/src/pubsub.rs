use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_stream::wrappers::ReceiverStream;

/// Marker trait for pub/sub transport errors.
pub trait PubSubError: Debug + Error + Send + Sync + 'static {}

/// A channel-based broadcast transport.
///
/// Frames are opaque to the broker; delivery is at-most-once and fan-out
/// (every live subscriber of a channel receives every frame published to it).
#[async_trait]
pub trait PubSubBroker
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the broker.
    type Error: PubSubError;

    /// Publishes one raw frame to a channel.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), Self::Error>;

    /// Subscribes to a channel, returning the stream of frames delivered to
    /// it. Dropping the stream ends the subscription.
    async fn subscribe(&self, channel: &str) -> Result<ReceiverStream<Bytes>, Self::Error>;
}
