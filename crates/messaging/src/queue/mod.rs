mod error;

/// Reply futures for outbound queue messages.
pub mod future;

/// Queue message shapes, codecs, and envelopes.
pub mod message;

pub use error::Error;

use self::future::MessageFuture;
use self::message::{Envelope, FieldMap, MessageCodecRegistry, MessageMetadata, QueueMessage};
use crate::clock::epoch_millis;

use std::sync::Arc;
use std::time::Duration;

use courier_broker::{StreamBroker, StreamEntry};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Upper bound for one blocking consumer-group read.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const ENVELOPE_CAPACITY: usize = 128;

/// The inbound work log of `server_id`.
#[must_use]
pub fn message_log(server_id: &str) -> String {
    format!("_message-{server_id}")
}

/// The private reply log of `server_id`.
#[must_use]
pub fn response_log(server_id: &str) -> String {
    format!("_response-{server_id}")
}

/// Configuration for one stream queue instance.
#[derive(Clone, Debug)]
pub struct QueueOptions {
    /// This server's id; names its logs and its consumer group.
    pub server_id: String,

    /// Upper bound for one blocking consumer-group read.
    pub poll_interval: Duration,
}

impl QueueOptions {
    /// Options for `server_id` with the default poll interval.
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Durable request/response queue over consumer-group logs.
///
/// Each server consumes two logs: its inbound work log and its private
/// response log. Work entries are decoded and fanned out to every envelope
/// subscriber; response entries complete the pending future registered at
/// send time. Entries are acknowledged once handed to the fan-out, not once
/// consumers finish, so delivery is at-least-once.
pub struct StreamQueue<B>
where
    B: StreamBroker,
{
    inner: Arc<QueueInner<B>>,
}

impl<B> Clone for StreamQueue<B>
where
    B: StreamBroker,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct QueueInner<B>
where
    B: StreamBroker,
{
    broker: B,
    options: QueueOptions,
    codecs: Arc<MessageCodecRegistry>,
    pending: Arc<DashMap<String, MessageFuture>>,
    envelopes: broadcast::Sender<Envelope>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl<B> StreamQueue<B>
where
    B: StreamBroker,
{
    /// Creates a queue for `options.server_id` over `broker`, resolving
    /// message shapes through `codecs`.
    #[must_use]
    pub fn new(broker: B, codecs: Arc<MessageCodecRegistry>, options: QueueOptions) -> Self {
        let (envelopes, _) = broadcast::channel(ENVELOPE_CAPACITY);
        Self {
            inner: Arc::new(QueueInner {
                broker,
                options,
                codecs,
                pending: Arc::new(DashMap::new()),
                envelopes,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Subscribes to the envelope fan-out; every subscriber receives every
    /// decoded work message.
    #[must_use]
    pub fn envelopes(&self) -> broadcast::Receiver<Envelope> {
        self.inner.envelopes.subscribe()
    }

    /// Starts the consumer loops for this server's message and response
    /// logs.
    ///
    /// # Errors
    /// Fails with [`Error::AlreadyRunning`] on a second start, or when the
    /// broker rejects group creation.
    pub async fn start(&self) -> Result<(), Error> {
        if self.inner.tracker.is_closed() {
            return Err(Error::AlreadyRunning);
        }

        let server_id = self.inner.options.server_id.clone();
        self.consume_log(&message_log(&server_id)).await?;
        self.consume_log(&response_log(&server_id)).await?;
        self.inner.tracker.close();

        Ok(())
    }

    /// Joins `log` with this server's consumer group and starts a consumer
    /// loop for it, creating the group if missing.
    ///
    /// # Errors
    /// Fails when the broker rejects group creation.
    pub async fn consume_log(&self, log: &str) -> Result<(), Error> {
        let group = self.inner.options.server_id.clone();
        self.inner
            .broker
            .ensure_group(log, &group)
            .await
            .map_err(|broker_error| Error::Broker(Box::new(broker_error)))?;

        let inner = self.inner.clone();
        let log = log.to_owned();
        self.inner
            .tracker
            .spawn(async move { QueueInner::consume(&inner, &log, &group).await });

        Ok(())
    }

    /// Serializes `message`, appends it to `log`, and registers a reply
    /// future under a fresh callback id.
    ///
    /// A failed append removes and fails the future rather than leaving it
    /// dangling.
    ///
    /// # Errors
    /// Fails when the message shape is unregistered, encoding fails, or the
    /// broker rejects the append.
    pub async fn send(
        &self,
        log: &str,
        message: &dyn QueueMessage,
    ) -> Result<MessageFuture, Error> {
        let inner = &self.inner;
        let codec = inner.codecs.codec(message.type_name())?;
        let mut fields = codec.encode(message)?;
        let metadata = MessageMetadata {
            type_name: message.type_name().to_owned(),
            callback_id: Uuid::new_v4().to_string(),
            origin: inner.options.server_id.clone(),
            timestamp: epoch_millis(),
        };
        metadata.write_into(&mut fields);

        let reply = MessageFuture::new(metadata.callback_id.clone(), &inner.pending);
        inner
            .pending
            .insert(metadata.callback_id.clone(), reply.clone());

        match inner.broker.append(log, fields).await {
            Ok(entry_id) => {
                debug!(%log, %entry_id, "queued message");
                Ok(reply)
            }
            Err(broker_error) => {
                inner.pending.remove(&metadata.callback_id);
                reply.fail(&future::Error::SendFailed(broker_error.to_string()));
                Err(Error::Broker(Box::new(broker_error)))
            }
        }
    }

    /// Appends reply `fields` to the sender's response log, correlated to
    /// `envelope`'s callback id.
    ///
    /// # Errors
    /// Fails when the broker rejects the append.
    pub async fn reply(&self, envelope: &Envelope, mut fields: FieldMap) -> Result<(), Error> {
        fields.insert(
            MessageMetadata::KEY_CALLBACK_ID.to_owned(),
            envelope.metadata.callback_id.clone(),
        );
        fields.insert(
            MessageMetadata::KEY_ORIGIN.to_owned(),
            self.inner.options.server_id.clone(),
        );
        fields.insert(
            MessageMetadata::KEY_TIMESTAMP.to_owned(),
            epoch_millis().to_string(),
        );

        let log = response_log(&envelope.metadata.origin);
        let entry_id = self
            .inner
            .broker
            .append(&log, fields)
            .await
            .map_err(|broker_error| Error::Broker(Box::new(broker_error)))?;
        debug!(%log, %entry_id, "queued reply");
        Ok(())
    }

    /// Stops all consumer loops and fails still-pending reply futures so
    /// awaiting callers unblock. In-flight deliveries are not retracted.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let ids: Vec<String> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            if let Some((_, reply)) = self.inner.pending.remove(&id) {
                reply.fail(&future::Error::ShutDown);
            }
        }
    }

    /// Waits for all consumer loops to stop.
    pub async fn wait(&self) {
        self.inner.tracker.wait().await;
    }
}

impl<B> QueueInner<B>
where
    B: StreamBroker,
{
    async fn consume(inner: &Arc<Self>, log: &str, group: &str) {
        let consumer = inner.options.server_id.clone();
        let own_response_log = response_log(&inner.options.server_id);

        loop {
            tokio::select! {
                biased;
                () = inner.shutdown.cancelled() => {
                    debug!(%log, "shutdown requested, exiting consumer loop");
                    break;
                }
                result = inner.broker.read_group(group, &consumer, log, inner.options.poll_interval) => {
                    match result {
                        Ok(entries) => {
                            for entry in entries {
                                inner.handle_entry(log, group, entry, &own_response_log).await;
                            }
                        }
                        Err(read_error) => {
                            error!(%log, error = %read_error, "consumer group read failed");
                            tokio::time::sleep(inner.options.poll_interval).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_entry(
        &self,
        log: &str,
        group: &str,
        entry: StreamEntry,
        own_response_log: &str,
    ) {
        if log == own_response_log {
            let callback_id = entry.fields.get(MessageMetadata::KEY_CALLBACK_ID).cloned();
            match callback_id {
                Some(callback_id) => match self.pending.remove(&callback_id) {
                    Some((_, reply)) => reply.complete(entry.fields),
                    None => {
                        debug!(%log, entry_id = %entry.id, "reply for an unknown or expired request");
                    }
                },
                None => warn!(%log, entry_id = %entry.id, "dropping reply entry without callback id"),
            }
            self.ack_entry(log, group, &entry.id).await;
            return;
        }

        let metadata = match MessageMetadata::from_fields(&entry.fields) {
            Ok(metadata) => metadata,
            Err(entry_error) => {
                warn!(%log, entry_id = %entry.id, error = %entry_error, "dropping malformed entry");
                self.ack_entry(log, group, &entry.id).await;
                return;
            }
        };

        let payload = match self
            .codecs
            .codec(&metadata.type_name)
            .and_then(|codec| codec.decode(&entry.fields))
        {
            Ok(payload) => payload,
            Err(entry_error) => {
                warn!(%log, entry_id = %entry.id, error = %entry_error, "dropping undecodable entry");
                self.ack_entry(log, group, &entry.id).await;
                return;
            }
        };

        let envelope = Envelope {
            metadata,
            payload: Arc::from(payload),
        };

        // Acked once handed to the fan-out, not once consumers are done.
        if self.envelopes.send(envelope).is_err() {
            debug!(%log, entry_id = %entry.id, "no envelope subscribers");
        }
        self.ack_entry(log, group, &entry.id).await;
    }

    async fn ack_entry(&self, log: &str, group: &str, entry_id: &str) {
        if let Err(ack_error) = self.broker.ack(log, group, entry_id).await {
            error!(%log, %entry_id, error = %ack_error, "failed to acknowledge entry");
        }
    }
}
