use std::collections::HashMap;
use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

/// Marker trait for durable-log transport errors.
pub trait StreamBrokerError: Debug + Error + Send + Sync + 'static {}

/// One durable log entry: broker-assigned id plus flat string fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEntry {
    /// Broker-assigned entry id, unique and ascending within its log.
    pub id: String,

    /// The flat field map carried by the entry.
    pub fields: HashMap<String, String>,
}

/// A durable append log with consumer-group reads and per-entry
/// acknowledgement. Delivery to a group is at-least-once.
#[async_trait]
pub trait StreamBroker
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the broker.
    type Error: StreamBrokerError;

    /// Appends an entry to a log, returning its id.
    async fn append(
        &self,
        log: &str,
        fields: HashMap<String, String>,
    ) -> Result<String, Self::Error>;

    /// Creates the consumer group (and the log, if missing). Idempotent: an
    /// already existing group is not an error.
    async fn ensure_group(&self, log: &str, group: &str) -> Result<(), Self::Error>;

    /// Reads entries not yet delivered to the group, blocking up to `block`
    /// when none are available. Returns an empty list on expiry.
    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        log: &str,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, Self::Error>;

    /// Acknowledges one delivered entry for the group.
    async fn ack(&self, log: &str, group: &str, entry_id: &str) -> Result<(), Self::Error>;
}
