use std::sync::OnceLock;

use tokio::sync::Notify;

/// A write-once completion slot with any number of async waiters.
///
/// The first `set` wins; later writes are rejected so exactly one outcome is
/// ever observable.
#[derive(Debug)]
pub(crate) struct Slot<T> {
    value: OnceLock<T>,
    notify: Notify,
}

impl<T: Clone> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: OnceLock::new(),
            notify: Notify::new(),
        }
    }

    /// Resolves the slot. Returns whether this call was the first writer.
    pub(crate) fn set(&self, value: T) -> bool {
        let first = self.value.set(value).is_ok();
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub(crate) fn is_set(&self) -> bool {
        self.value.get().is_some()
    }

    pub(crate) async fn wait(&self) -> T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before the check so a set landing in between still
            // wakes this waiter.
            notified.as_mut().enable();
            if let Some(value) = self.value.get() {
                return value.clone();
            }
            notified.await;
        }
    }
}
