use crate::bus::Delivery;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::error;

/// Result type for subject handlers. Errors are caught and logged at the
/// dispatch boundary and never affect sibling handlers.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A callback consumer of routed packets, bound to one
/// (channel, packet type, subject) key.
#[async_trait]
pub trait SubjectHandler: Send + Sync + 'static {
    /// Handles one routed packet.
    async fn handle(&self, delivery: Delivery) -> HandlerResult;
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct RouteKey {
    channel: String,
    packet_type_id: u32,
    subject: String,
}

impl RouteKey {
    fn new(channel: &str, packet_type_id: u32, subject: &str) -> Self {
        Self {
            channel: channel.to_owned(),
            packet_type_id,
            subject: subject.to_owned(),
        }
    }
}

struct RouteEntry {
    priority: i32,
    seq: u64,
    handler: Arc<dyn SubjectHandler>,
}

/// Maps (channel, packet type, subject) to priority-ordered handler sets and
/// dispatches decoded packets onto the worker pool.
///
/// Registration happens under a coarse lock; dispatch clones the matching
/// bucket out, so readers may observe a slightly stale but always internally
/// consistent list.
pub struct Router {
    routes: RwLock<HashMap<RouteKey, Vec<RouteEntry>>>,
    insertions: AtomicU64,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            insertions: AtomicU64::new(0),
        }
    }

    /// Registers `handler` under the routing key. Higher priorities start
    /// earlier; ties keep insertion order.
    pub fn register(
        &self,
        channel: &str,
        packet_type_id: u32,
        subject: &str,
        priority: i32,
        handler: Arc<dyn SubjectHandler>,
    ) {
        let seq = self.insertions.fetch_add(1, Ordering::Relaxed);
        let mut routes = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let bucket = routes
            .entry(RouteKey::new(channel, packet_type_id, subject))
            .or_default();
        bucket.push(RouteEntry {
            priority,
            seq,
            handler,
        });
        bucket.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    }

    /// Removes every registration of exactly this handler (pointer identity)
    /// from the routing key.
    pub fn unregister(
        &self,
        channel: &str,
        packet_type_id: u32,
        subject: &str,
        handler: &Arc<dyn SubjectHandler>,
    ) {
        let mut routes = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = routes.get_mut(&RouteKey::new(channel, packet_type_id, subject)) {
            bucket.retain(|entry| !Arc::ptr_eq(&entry.handler, handler));
            if bucket.is_empty() {
                routes.remove(&RouteKey::new(channel, packet_type_id, subject));
            }
        }
    }

    /// Dispatches `delivery` to every matching handler, in priority order,
    /// each invocation as its own pool task. An unmatched key is a no-op,
    /// not an error. Only start order is guaranteed; completion order is
    /// not.
    pub fn dispatch(&self, delivery: &Delivery) {
        let Some(subject) = delivery.packet.subject() else {
            return;
        };
        let handlers = self.handlers_for(
            &delivery.channel,
            delivery.packet.metadata.packet_type_id,
            subject,
        );

        for handler in handlers {
            let delivery = delivery.clone();
            tokio::spawn(async move {
                if let Err(handler_error) = handler.handle(delivery).await {
                    error!(error = %handler_error, "subject handler failed");
                }
            });
        }
    }

    pub(crate) fn clear(&self) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn handlers_for(
        &self,
        channel: &str,
        packet_type_id: u32,
        subject: &str,
    ) -> Vec<Arc<dyn SubjectHandler>> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .get(&RouteKey::new(channel, packet_type_id, subject))
            .map(|bucket| bucket.iter().map(|entry| entry.handler.clone()).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn priorities_for(&self, channel: &str, packet_type_id: u32, subject: &str) -> Vec<i32> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .get(&RouteKey::new(channel, packet_type_id, subject))
            .map(|bucket| bucket.iter().map(|entry| entry.priority).collect())
            .unwrap_or_default()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
