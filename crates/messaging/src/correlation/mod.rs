mod error;
mod future;

pub use error::Error;
pub use future::PacketFuture;

use crate::packet::InboundPacket;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Callback fired when the acknowledgement arrives.
pub type AckCallback = Box<dyn FnOnce() + Send + Sync>;

/// Callback fired when the response packet arrives.
pub type ResponseCallback = Box<dyn FnOnce(InboundPacket) + Send + Sync>;

/// Callback fired once if the deadline passes with slots still open.
pub type TimeoutCallback = Box<dyn FnOnce() + Send + Sync>;

/// What one correlated send is waiting for, and whom to tell.
pub struct Registration {
    /// Whether the acknowledgement slot must resolve before the entry is
    /// complete.
    pub requires_ack: bool,

    /// Whether the response slot must resolve before the entry is complete.
    pub requires_response: bool,

    /// Fired when the acknowledgement arrives.
    pub on_ack: Option<AckCallback>,

    /// Fired with the response packet when it arrives.
    pub on_response: Option<ResponseCallback>,

    /// Deadline for the outstanding slots; zero disables the timer.
    pub timeout: Duration,

    /// Fired once if the deadline passes first. Without it no timer is
    /// scheduled.
    pub on_timeout: Option<TimeoutCallback>,
}

struct Entry {
    future: PacketFuture,
    requires_ack: bool,
    requires_response: bool,
    on_ack: Option<AckCallback>,
    on_response: Option<ResponseCallback>,
    on_timeout: Option<TimeoutCallback>,
    timer: Option<AbortHandle>,
}

impl Entry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn is_complete(&self) -> bool {
        (!self.requires_ack || self.future.is_ack_done())
            && (!self.requires_response || self.future.is_response_done())
    }
}

/// Tracks outstanding correlated sends and delivers exactly one outcome per
/// requested slot.
///
/// The pending table is the single point of truth: whichever side removes an
/// entry first — a completion or the firing timer — owns the outcome, and
/// the loser observes absence and no-ops.
pub struct CorrelationEngine {
    pending: Arc<DashMap<String, Entry>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl CorrelationEngine {
    /// Creates an engine with no outstanding sends.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Registers a pending send under `message_id`.
    ///
    /// Returns `None` without creating an entry when neither slot is
    /// requested (fire-and-forget). A timer is scheduled only when the
    /// registration carries both a positive timeout and a timeout callback.
    pub fn register(&self, message_id: &str, registration: Registration) -> Option<PacketFuture> {
        if !registration.requires_ack && !registration.requires_response {
            return None;
        }

        let future = PacketFuture::new();
        let timer = (registration.timeout > Duration::ZERO
            && registration.on_timeout.is_some())
        .then(|| self.spawn_timer(message_id.to_owned(), registration.timeout));

        self.pending.insert(
            message_id.to_owned(),
            Entry {
                future: future.clone(),
                requires_ack: registration.requires_ack,
                requires_response: registration.requires_response,
                on_ack: registration.on_ack,
                on_response: registration.on_response,
                on_timeout: registration.on_timeout,
                timer,
            },
        );
        Some(future)
    }

    /// Completes the acknowledgement slot for `message_id`.
    ///
    /// Unknown ids no-op: a late ACK for a timed-out entry is intentionally
    /// ignored.
    pub fn complete_ack(&self, message_id: &str) {
        let Some(mut entry) = self.pending.get_mut(message_id) else {
            return;
        };
        entry.cancel_timer();
        entry.future.complete_ack();
        if let Some(on_ack) = entry.on_ack.take() {
            tokio::spawn(async move { on_ack() });
        }
        let finished = entry.is_complete();
        drop(entry);

        if finished {
            self.pending.remove(message_id);
        }
    }

    /// Completes the response slot for `message_id` with `response`.
    ///
    /// Unknown ids no-op, exactly as for acknowledgements.
    pub fn complete_response(&self, message_id: &str, response: InboundPacket) {
        let Some(mut entry) = self.pending.get_mut(message_id) else {
            return;
        };
        entry.cancel_timer();
        entry.future.complete_response(response.clone());
        if let Some(on_response) = entry.on_response.take() {
            tokio::spawn(async move { on_response(response) });
        }
        let finished = entry.is_complete();
        drop(entry);

        if finished {
            self.pending.remove(message_id);
        }
    }

    /// Explicitly fails a pending entry, e.g. when the transport rejected
    /// the send. The timeout callback does not fire.
    pub fn fail(&self, message_id: &str, error: &Error) {
        if let Some((_, mut entry)) = self.pending.remove(message_id) {
            entry.cancel_timer();
            entry.future.fail(error);
        }
    }

    /// Number of sends still awaiting an outcome.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Cancels all timers and drops all entries. Open future slots fail with
    /// [`Error::ShutDown`] so awaiting callers unblock; no callback fires
    /// twice.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();

        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, mut entry)) = self.pending.remove(&id) {
                entry.cancel_timer();
                entry.future.fail(&Error::ShutDown);
            }
        }

        self.tracker.wait().await;
    }

    fn spawn_timer(&self, message_id: String, timeout: Duration) -> AbortHandle {
        let pending = self.pending.clone();
        let shutdown = self.shutdown.clone();
        let handle = self.tracker.spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    // Removal decides the race: a completion landing after
                    // this point observes absence and no-ops.
                    if let Some((_, mut entry)) = pending.remove(&message_id) {
                        debug!(%message_id, "correlated packet timed out");
                        entry.future.fail(&Error::TimedOut(message_id.clone()));
                        if let Some(on_timeout) = entry.on_timeout.take() {
                            on_timeout();
                        }
                    }
                }
            }
        });
        handle.abort_handle()
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new()
    }
}
