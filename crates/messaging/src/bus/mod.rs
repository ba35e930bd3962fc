mod error;

pub use error::Error;

use crate::clock::epoch_millis;
use crate::codec;
use crate::correlation::{
    self, AckCallback, CorrelationEngine, PacketFuture, ResponseCallback, TimeoutCallback,
};
use crate::packet::builtin::AckPacket;
use crate::packet::registry::PacketRegistry;
use crate::packet::{InboundPacket, MessageType, Packet, PacketMetadata, WILDCARD_RECEIVER};
use crate::router::Router;

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_broker::PubSubBroker;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as ChannelEntry;
use futures::StreamExt;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Correlation deadline applied when a publish does not set one.
pub const DEFAULT_CORRELATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one bus instance.
#[derive(Clone, Debug)]
pub struct BusOptions {
    /// This server's id: the metadata sender, and the identity inbound
    /// receiver lists are checked against.
    pub server_id: String,

    /// Correlation deadline applied when a publish does not set one.
    pub default_timeout: Duration,
}

impl BusOptions {
    /// Options for `server_id` with the default correlation timeout.
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            default_timeout: DEFAULT_CORRELATION_TIMEOUT,
        }
    }
}

/// Per-publish settings: addressing, reply callbacks, and deadline.
///
/// The presence of an ack (response) callback is what requests the
/// acknowledgement (response); a publish with neither is fire-and-forget.
pub struct PublishOptions {
    receivers: Vec<String>,
    on_ack: Option<AckCallback>,
    on_response: Option<ResponseCallback>,
    timeout: Option<Duration>,
    on_timeout: Option<TimeoutCallback>,
}

impl PublishOptions {
    /// Options addressing every server, with no reply callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            receivers: vec![WILDCARD_RECEIVER.to_owned()],
            on_ack: None,
            on_response: None,
            timeout: None,
            on_timeout: None,
        }
    }

    /// Addresses the packet to exactly these servers.
    #[must_use]
    pub fn to<I, S>(mut self, receivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.receivers = receivers.into_iter().map(Into::into).collect();
        self
    }

    /// Requests an acknowledgement and fires `callback` when it arrives.
    #[must_use]
    pub fn on_ack(mut self, callback: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_ack = Some(Box::new(callback));
        self
    }

    /// Requests a response and fires `callback` when it arrives.
    #[must_use]
    pub fn on_response(mut self, callback: impl FnOnce(InboundPacket) + Send + Sync + 'static) -> Self {
        self.on_response = Some(Box::new(callback));
        self
    }

    /// Overrides the bus default correlation deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fires `callback` once if neither reply arrives before the deadline.
    #[must_use]
    pub fn on_timeout(mut self, callback: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Box::new(callback));
        self
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub(crate) trait RespondTarget: Send + Sync {
    async fn respond(
        &self,
        channel: &str,
        origin: &PacketMetadata,
        response: Box<dyn Packet>,
    ) -> Result<(), Error>;
}

/// One decoded PUBLISH handed to subject handlers.
#[derive(Clone)]
pub struct Delivery {
    /// The channel the packet arrived on.
    pub channel: String,

    /// The decoded packet and its metadata.
    pub packet: InboundPacket,

    responder: Option<Arc<dyn RespondTarget>>,
}

impl Delivery {
    /// Recovers the concrete packet shape.
    #[must_use]
    pub fn downcast_ref<P: Packet>(&self) -> Option<&P> {
        self.packet.downcast_ref()
    }

    /// Publishes `response` back to this packet's sender, correlated to its
    /// message id.
    ///
    /// # Errors
    /// Fails when the response shape is unregistered or the broker rejects
    /// the publish.
    pub async fn respond<P: Packet>(&self, response: P) -> Result<(), Error> {
        match &self.responder {
            Some(responder) => {
                responder
                    .respond(&self.channel, &self.packet.metadata, Box::new(response))
                    .await
            }
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(channel: &str, packet: InboundPacket) -> Self {
        Self {
            channel: channel.to_owned(),
            packet,
            responder: None,
        }
    }
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("channel", &self.channel)
            .field("packet", &self.packet)
            .finish_non_exhaustive()
    }
}

/// The pub/sub façade: typed publish with reply correlation on the way out;
/// classification, auto-acknowledgement, and subject dispatch on the way in.
pub struct PubSubBus<B>
where
    B: PubSubBroker,
{
    inner: Arc<BusInner<B>>,
}

impl<B> Clone for PubSubBus<B>
where
    B: PubSubBroker,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct BusInner<B>
where
    B: PubSubBroker,
{
    broker: B,
    options: BusOptions,
    registry: Arc<PacketRegistry>,
    correlation: CorrelationEngine,
    router: Router,
    channels: DashMap<String, AbortHandle>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl<B> PubSubBus<B>
where
    B: PubSubBroker,
{
    /// Creates a bus for `options.server_id` over `broker`, resolving packet
    /// shapes through `registry`.
    #[must_use]
    pub fn new(broker: B, registry: Arc<PacketRegistry>, options: BusOptions) -> Self {
        Self {
            inner: Arc::new(BusInner {
                broker,
                options,
                registry,
                correlation: CorrelationEngine::new(),
                router: Router::new(),
                channels: DashMap::new(),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// This bus's router; subject handlers register here.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// The engine tracking in-flight correlated sends.
    #[must_use]
    pub fn correlation(&self) -> &CorrelationEngine {
        &self.inner.correlation
    }

    /// Starts delivering `channel`'s frames to this bus. Idempotent: a
    /// second subscription to the same channel is a no-op.
    ///
    /// # Errors
    /// Fails when the broker rejects the subscription.
    pub async fn subscribe(&self, channel: &str) -> Result<(), Error> {
        if self.inner.channels.contains_key(channel) {
            return Ok(());
        }

        let frames = self
            .inner
            .broker
            .subscribe(channel)
            .await
            .map_err(|broker_error| Error::Broker(Box::new(broker_error)))?;

        match self.inner.channels.entry(channel.to_owned()) {
            ChannelEntry::Occupied(_) => {
                // Lost a subscribe race; the other loop already delivers.
            }
            ChannelEntry::Vacant(entry) => {
                let inner = self.inner.clone();
                let channel = channel.to_owned();
                let handle = self.inner.tracker.spawn(async move {
                    let mut frames = frames;
                    loop {
                        tokio::select! {
                            biased;
                            () = inner.shutdown.cancelled() => {
                                debug!(%channel, "shutdown requested, exiting delivery loop");
                                break;
                            }
                            frame = frames.next() => {
                                match frame {
                                    Some(frame) => {
                                        BusInner::handle_frame(&inner, &channel, &frame).await;
                                    }
                                    None => {
                                        debug!(%channel, "broker closed the subscription");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                });
                entry.insert(handle.abort_handle());
            }
        }

        Ok(())
    }

    /// Whether `channel` is currently subscribed.
    #[must_use]
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.inner.channels.contains_key(channel)
    }

    /// Stops delivering `channel`'s frames. In-flight handler invocations
    /// are not retracted.
    pub fn unsubscribe(&self, channel: &str) {
        if let Some((_, handle)) = self.inner.channels.remove(channel) {
            handle.abort();
        }
    }

    /// Publishes `packet` on `channel`.
    ///
    /// When the options request an acknowledgement and/or response, the
    /// correlation entry is registered before the frame leaves, so a fast
    /// reply can never beat the bookkeeping. A failed send explicitly fails
    /// the entry rather than leaving it dangling.
    ///
    /// # Errors
    /// Fails when the shape is unregistered, the body fails to encode, or
    /// the broker rejects the publish.
    pub async fn publish<P: Packet>(
        &self,
        channel: &str,
        packet: P,
        options: PublishOptions,
    ) -> Result<PacketFuture, Error> {
        let inner = &self.inner;
        let metadata = PacketMetadata {
            packet_type_id: inner.registry.type_id_of(&packet)?,
            message_type: MessageType::Publish,
            message_id: Uuid::new_v4().to_string(),
            sender: inner.options.server_id.clone(),
            receivers: options.receivers,
            requires_ack: options.on_ack.is_some(),
            requires_response: options.on_response.is_some(),
            callback_id: None,
            publish_time: epoch_millis(),
        };

        let future = inner
            .correlation
            .register(
                &metadata.message_id,
                correlation::Registration {
                    requires_ack: metadata.requires_ack,
                    requires_response: metadata.requires_response,
                    on_ack: options.on_ack,
                    on_response: options.on_response,
                    timeout: options.timeout.unwrap_or(inner.options.default_timeout),
                    on_timeout: options.on_timeout,
                },
            )
            .unwrap_or_else(PacketFuture::new);

        let frame = match codec::encode_frame(&inner.registry, &metadata, &packet) {
            Ok(frame) => frame,
            Err(codec_error) => {
                inner.correlation.fail(
                    &metadata.message_id,
                    &correlation::Error::SendFailed(codec_error.to_string()),
                );
                return Err(codec_error.into());
            }
        };

        if let Err(broker_error) = inner.broker.publish(channel, frame).await {
            inner.correlation.fail(
                &metadata.message_id,
                &correlation::Error::SendFailed(broker_error.to_string()),
            );
            return Err(Error::Broker(Box::new(broker_error)));
        }

        Ok(future)
    }

    /// Publishes an application response to `origin`, addressed back to its
    /// sender and correlated to its message id.
    ///
    /// # Errors
    /// Fails when the response shape is unregistered or the broker rejects
    /// the publish.
    pub async fn respond<P: Packet>(
        &self,
        channel: &str,
        origin: &PacketMetadata,
        response: P,
    ) -> Result<(), Error> {
        self.inner
            .send_reply(channel, origin, MessageType::Response, &response)
            .await
    }

    /// Stops delivery loops and the correlation engine and clears the
    /// router.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let channels: Vec<String> = self
            .inner
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for channel in channels {
            if let Some((_, handle)) = self.inner.channels.remove(&channel) {
                handle.abort();
            }
        }

        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.correlation.shutdown().await;
        self.inner.router.clear();
    }
}

impl<B> BusInner<B>
where
    B: PubSubBroker,
{
    async fn handle_frame(inner: &Arc<Self>, channel: &str, frame: &Bytes) {
        let (metadata, packet) = match codec::decode_frame(&inner.registry, frame) {
            Ok(decoded) => decoded,
            Err(codec_error) => {
                warn!(%channel, error = %codec_error, "dropping undecodable frame");
                return;
            }
        };

        if !metadata.addressed_to(&inner.options.server_id) {
            return;
        }

        match metadata.message_type {
            MessageType::Publish => {
                let metadata = Arc::new(metadata);

                // Acknowledge before dispatch so a slow handler never delays
                // the sender's ack.
                if metadata.requires_ack {
                    if let Err(reply_error) = inner
                        .send_reply(channel, &metadata, MessageType::Ack, &AckPacket)
                        .await
                    {
                        error!(%channel, error = %reply_error, "failed to acknowledge packet");
                    }
                }

                let responder: Arc<dyn RespondTarget> = inner.clone();
                let delivery = Delivery {
                    channel: channel.to_owned(),
                    packet: InboundPacket {
                        metadata,
                        packet: Arc::from(packet),
                    },
                    responder: Some(responder),
                };
                inner.router.dispatch(&delivery);
            }
            MessageType::Ack => match metadata.callback_id.as_deref() {
                Some(callback_id) => inner.correlation.complete_ack(callback_id),
                None => warn!(%channel, "dropping ack frame without callback id"),
            },
            MessageType::Response => match metadata.callback_id.clone() {
                Some(callback_id) => {
                    let response = InboundPacket {
                        metadata: Arc::new(metadata),
                        packet: Arc::from(packet),
                    };
                    inner.correlation.complete_response(&callback_id, response);
                }
                None => warn!(%channel, "dropping response frame without callback id"),
            },
        }
    }

    async fn send_reply(
        &self,
        channel: &str,
        origin: &PacketMetadata,
        message_type: MessageType,
        packet: &dyn Packet,
    ) -> Result<(), Error> {
        let metadata = PacketMetadata {
            packet_type_id: self.registry.type_id_of(packet)?,
            message_type,
            message_id: Uuid::new_v4().to_string(),
            sender: self.options.server_id.clone(),
            receivers: vec![origin.sender.clone()],
            requires_ack: false,
            requires_response: false,
            callback_id: Some(origin.message_id.clone()),
            publish_time: epoch_millis(),
        };
        let frame = codec::encode_frame(&self.registry, &metadata, packet)?;
        self.broker
            .publish(channel, frame)
            .await
            .map_err(|broker_error| Error::Broker(Box::new(broker_error)))
    }
}

#[async_trait]
impl<B> RespondTarget for BusInner<B>
where
    B: PubSubBroker,
{
    async fn respond(
        &self,
        channel: &str,
        origin: &PacketMetadata,
        response: Box<dyn Packet>,
    ) -> Result<(), Error> {
        self.send_reply(channel, origin, MessageType::Response, response.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::packet::builtin::{STRING_PACKET_TYPE_ID, StringPacket};
    use crate::router::{HandlerResult, SubjectHandler};

    use std::sync::Mutex;

    use courier_broker_memory::MemoryBroker;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(2);

    fn bus(broker: &MemoryBroker, server_id: &str) -> PubSubBus<MemoryBroker> {
        PubSubBus::new(
            broker.clone(),
            Arc::new(PacketRegistry::new()),
            BusOptions::new(server_id),
        )
    }

    async fn eventually(description: &str, check: impl Fn() -> bool) {
        timeout(WAIT, async {
            while !check() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {description}"));
    }

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SubjectHandler for RecordingHandler {
        async fn handle(&self, delivery: Delivery) -> HandlerResult {
            let packet = delivery
                .downcast_ref::<StringPacket>()
                .ok_or("unexpected packet shape")?;
            self.seen.lock().unwrap().push(packet.payload().to_owned());
            Ok(())
        }
    }

    struct PongHandler;

    #[async_trait]
    impl SubjectHandler for PongHandler {
        async fn handle(&self, delivery: Delivery) -> HandlerResult {
            delivery.respond(StringPacket::new("ping", "pong")).await?;
            Ok(())
        }
    }

    fn record_into(
        bus: &PubSubBus<MemoryBroker>,
        channel: &str,
        subject: &str,
    ) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.router().register(
            channel,
            STRING_PACKET_TYPE_ID,
            subject,
            0,
            Arc::new(RecordingHandler { seen: seen.clone() }),
        );
        seen
    }

    #[tokio::test]
    async fn test_targeted_packet_reaches_only_its_receiver() {
        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");
        let bus_b = bus(&broker, "B");
        bus_a.subscribe("c").await.unwrap();
        bus_b.subscribe("c").await.unwrap();
        let seen_a = record_into(&bus_a, "c", "greet");
        let seen_b = record_into(&bus_b, "c", "greet");

        bus_a
            .publish(
                "c",
                StringPacket::new("greet", "hi"),
                PublishOptions::new().to(["B"]),
            )
            .await
            .unwrap();

        eventually("B to receive the packet", || {
            seen_b.lock().unwrap().len() == 1
        })
        .await;
        assert_eq!(*seen_b.lock().unwrap(), ["hi"]);

        // Not addressed to A: dropped silently even though A is subscribed.
        sleep(Duration::from_millis(50)).await;
        assert!(seen_a.lock().unwrap().is_empty());

        bus_a.shutdown().await;
        bus_b.shutdown().await;
    }

    #[tokio::test]
    async fn test_wildcard_packet_reaches_every_server() {
        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");
        let bus_b = bus(&broker, "B");
        bus_a.subscribe("c").await.unwrap();
        bus_b.subscribe("c").await.unwrap();
        let seen_a = record_into(&bus_a, "c", "greet");
        let seen_b = record_into(&bus_b, "c", "greet");

        bus_a
            .publish(
                "c",
                StringPacket::new("greet", "everyone"),
                PublishOptions::new(),
            )
            .await
            .unwrap();

        eventually("both servers to receive the packet", || {
            seen_a.lock().unwrap().len() == 1 && seen_b.lock().unwrap().len() == 1
        })
        .await;

        bus_a.shutdown().await;
        bus_b.shutdown().await;
    }

    #[tokio::test]
    async fn test_ack_arrives_before_the_response() {
        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");
        let bus_b = bus(&broker, "B");
        bus_a.subscribe("c").await.unwrap();
        bus_b.subscribe("c").await.unwrap();
        bus_b
            .router()
            .register("c", STRING_PACKET_TYPE_ID, "ping", 0, Arc::new(PongHandler));

        let events = Arc::new(Mutex::new(Vec::new()));
        let ack_events = events.clone();
        let response_events = events.clone();
        let timeout_events = events.clone();
        bus_a
            .publish(
                "c",
                StringPacket::new("ping", "hi"),
                PublishOptions::new()
                    .to(["B"])
                    .timeout(Duration::from_millis(2000))
                    .on_ack(move || ack_events.lock().unwrap().push("ack".to_owned()))
                    .on_response(move |response| {
                        let payload = response
                            .downcast_ref::<StringPacket>()
                            .map_or_else(|| "?".to_owned(), |p| p.payload().to_owned());
                        response_events
                            .lock()
                            .unwrap()
                            .push(format!("response:{payload}"));
                    })
                    .on_timeout(move || {
                        timeout_events.lock().unwrap().push("timeout".to_owned());
                    }),
            )
            .await
            .unwrap();

        eventually("the ack and the response", || events.lock().unwrap().len() == 2).await;
        assert_eq!(*events.lock().unwrap(), ["ack", "response:pong"]);
        assert_eq!(bus_a.correlation().pending_len(), 0);

        // The timeout was cancelled; give it room to prove it.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(events.lock().unwrap().len(), 2);

        bus_a.shutdown().await;
        bus_b.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_fires_when_nobody_answers() {
        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");
        bus_a.subscribe("c").await.unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let ack_events = events.clone();
        let timeout_events = events.clone();
        let future = bus_a
            .publish(
                "c",
                StringPacket::new("ping", "hello?"),
                PublishOptions::new()
                    .to(["ghost"])
                    .timeout(Duration::from_millis(20))
                    .on_ack(move || ack_events.lock().unwrap().push("ack".to_owned()))
                    .on_timeout(move || {
                        timeout_events.lock().unwrap().push("timeout".to_owned());
                    }),
            )
            .await
            .unwrap();

        let result = timeout(WAIT, future.ack()).await.unwrap();
        assert!(matches!(result, Err(correlation::Error::TimedOut(_))));
        eventually("the timeout callback", || !events.lock().unwrap().is_empty()).await;
        assert_eq!(*events.lock().unwrap(), ["timeout"]);
        assert_eq!(bus_a.correlation().pending_len(), 0);

        bus_a.shutdown().await;
    }

    #[tokio::test]
    async fn test_fire_and_forget_registers_no_correlation() {
        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");

        let future = bus_a
            .publish("c", StringPacket::new("greet", "hi"), PublishOptions::new())
            .await
            .unwrap();

        assert_eq!(bus_a.correlation().pending_len(), 0);
        assert!(!future.is_ack_done());
        assert!(!future.is_response_done());
    }

    #[tokio::test]
    async fn test_unregistered_packet_shape_fails_the_publish() {
        #[derive(Debug)]
        struct GhostPacket;

        impl Packet for GhostPacket {
            fn subject(&self) -> Option<&str> {
                Some("ghost")
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");

        let result = bus_a.publish("c", GhostPacket, PublishOptions::new()).await;
        assert!(matches!(result, Err(Error::Registry(_))));
        assert_eq!(bus_a.correlation().pending_len(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");
        bus_a.subscribe("c").await.unwrap();
        assert!(bus_a.is_subscribed("c"));
        let seen = record_into(&bus_a, "c", "greet");

        bus_a
            .publish("c", StringPacket::new("greet", "first"), PublishOptions::new())
            .await
            .unwrap();
        eventually("the first packet", || seen.lock().unwrap().len() == 1).await;

        bus_a.unsubscribe("c");
        assert!(!bus_a.is_subscribed("c"));
        bus_a
            .publish("c", StringPacket::new("greet", "second"), PublishOptions::new())
            .await
            .unwrap();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), ["first"]);

        bus_a.shutdown().await;
    }

    #[tokio::test]
    async fn test_undecodable_frames_leave_the_loop_running() {
        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");
        bus_a.subscribe("c").await.unwrap();
        let seen = record_into(&bus_a, "c", "greet");

        broker
            .publish("c", Bytes::from_static(b"\x00\x00\x00\x02ok"))
            .await
            .unwrap();
        bus_a
            .publish(
                "c",
                StringPacket::new("greet", "still alive"),
                PublishOptions::new(),
            )
            .await
            .unwrap();

        eventually("the valid packet behind the junk", || {
            seen.lock().unwrap().len() == 1
        })
        .await;
        assert_eq!(*seen.lock().unwrap(), ["still alive"]);

        bus_a.shutdown().await;
    }

    #[tokio::test]
    async fn test_respond_outside_a_handler() {
        let broker = MemoryBroker::new();
        let bus_a = bus(&broker, "A");
        let bus_b = bus(&broker, "B");
        bus_a.subscribe("c").await.unwrap();

        // Hand-build the metadata B would have decoded.
        let origin = PacketMetadata {
            packet_type_id: STRING_PACKET_TYPE_ID,
            message_type: MessageType::Publish,
            message_id: "m-77".to_owned(),
            sender: "A".to_owned(),
            receivers: vec!["B".to_owned()],
            requires_ack: false,
            requires_response: true,
            callback_id: None,
            publish_time: 0,
        };
        bus_a.correlation().register(
            "m-77",
            correlation::Registration {
                requires_ack: false,
                requires_response: true,
                on_ack: None,
                on_response: None,
                timeout: Duration::ZERO,
                on_timeout: None,
            },
        );

        bus_b
            .respond("c", &origin, StringPacket::new("ping", "late pong"))
            .await
            .unwrap();

        eventually("the response to complete the entry", || {
            bus_a.correlation().pending_len() == 0
        })
        .await;

        bus_a.shutdown().await;
    }
}
