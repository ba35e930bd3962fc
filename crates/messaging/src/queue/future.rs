use super::message::FieldMap;
use crate::slot::Slot;

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

/// Error type delivered through message futures.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// No reply landed on the response log before the armed deadline.
    #[error("message `{0}` timed out waiting for a reply")]
    TimedOut(String),

    /// The append never reached the broker.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The queue shut down with the request still pending.
    #[error("stream queue shut down")]
    ShutDown,
}

/// Completion handle for one outbound queue message.
///
/// The reply deadline is enforced per request: arming [`on_timeout`]
/// schedules a timer that fires the callback exactly once if no reply has
/// landed by then.
///
/// [`on_timeout`]: MessageFuture::on_timeout
#[derive(Clone, Debug)]
pub struct MessageFuture {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    callback_id: String,
    response: Slot<Result<FieldMap, Error>>,
    pending: Weak<DashMap<String, MessageFuture>>,
}

impl MessageFuture {
    pub(crate) fn new(
        callback_id: String,
        pending: &Arc<DashMap<String, MessageFuture>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                callback_id,
                response: Slot::new(),
                pending: Arc::downgrade(pending),
            }),
        }
    }

    /// The callback id the reply will correlate on.
    #[must_use]
    pub fn callback_id(&self) -> &str {
        &self.shared.callback_id
    }

    /// Whether the reply (or a failure) has resolved.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.shared.response.is_set()
    }

    /// Waits for the reply fields.
    ///
    /// # Errors
    /// Resolves to an error when the send failed, an armed deadline passed
    /// first, or the queue shut down.
    pub async fn response(&self) -> Result<FieldMap, Error> {
        self.shared.response.wait().await
    }

    /// Fires `callback` with the reply fields when they arrive. Chainable.
    #[must_use]
    pub fn on_response(self, callback: impl FnOnce(FieldMap) + Send + 'static) -> Self {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            if let Ok(fields) = shared.response.wait().await {
                callback(fields);
            }
        });
        self
    }

    /// Arms the reply deadline: if no reply lands within `after`, fires
    /// `callback` once. With `cancel_pending` the request is also withdrawn
    /// so a late reply is ignored; without it the request stays pending and
    /// a late reply may still reach a response callback. Chainable.
    #[must_use]
    pub fn on_timeout(
        self,
        after: Duration,
        cancel_pending: bool,
        callback: impl FnOnce() + Send + 'static,
    ) -> Self {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if shared.response.is_set() {
                return;
            }
            if cancel_pending {
                if let Some(pending) = shared.pending.upgrade() {
                    pending.remove(&shared.callback_id);
                }
                // First writer wins; a reply racing us keeps its outcome.
                if !shared
                    .response
                    .set(Err(Error::TimedOut(shared.callback_id.clone())))
                {
                    return;
                }
            }
            debug!(callback_id = %shared.callback_id, "queued message timed out");
            callback();
        });
        self
    }

    pub(crate) fn complete(&self, fields: FieldMap) {
        self.shared.response.set(Ok(fields));
    }

    pub(crate) fn fail(&self, error: &Error) {
        self.shared.response.set(Err(error.clone()));
    }
}
