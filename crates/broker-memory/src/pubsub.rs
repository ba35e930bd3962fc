use crate::{Error, MemoryBroker};

use async_trait::async_trait;
use bytes::Bytes;
use courier_broker::PubSubBroker;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

const CHANNEL_CAPACITY: usize = 128;

#[async_trait]
impl PubSubBroker for MemoryBroker {
    type Error = Error;

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), Error> {
        let mut channels = self.channels.lock().await;
        let Some(senders) = channels.get_mut(channel) else {
            return Ok(());
        };

        // Drop senders whose subscriber went away; a lagging subscriber just
        // misses the frame (delivery is at-most-once).
        senders.retain(|sender| match sender.try_send(payload.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%channel, "subscriber lagging, dropping frame");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<ReceiverStream<Bytes>, Error> {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        self.channels
            .lock()
            .await
            .entry(channel.to_owned())
            .or_default()
            .push(sender);
        Ok(ReceiverStream::new(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::StreamExt;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let broker = MemoryBroker::new();
        let mut first = broker.subscribe("events").await.unwrap();
        let mut second = broker.subscribe("events").await.unwrap();

        broker
            .publish("events", Bytes::from_static(b"frame"))
            .await
            .unwrap();

        for stream in [&mut first, &mut second] {
            let frame = timeout(Duration::from_secs(1), stream.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame, Bytes::from_static(b"frame"));
        }
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let broker = MemoryBroker::new();
        let mut other = broker.subscribe("other").await.unwrap();

        broker
            .publish("events", Bytes::from_static(b"frame"))
            .await
            .unwrap();

        let result = timeout(Duration::from_millis(50), other.next()).await;
        assert!(result.is_err(), "frame leaked across channels");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let broker = MemoryBroker::new();
        let stream = broker.subscribe("events").await.unwrap();
        drop(stream);

        broker
            .publish("events", Bytes::from_static(b"frame"))
            .await
            .unwrap();

        assert!(broker.channels.lock().await.get("events").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let broker = MemoryBroker::new();
        broker
            .publish("events", Bytes::from_static(b"frame"))
            .await
            .unwrap();
    }
}
