use super::Error;
use crate::packet::InboundPacket;
use crate::slot::Slot;

use std::sync::Arc;

/// Completion handle for one correlated send.
///
/// The acknowledgement and response slots resolve independently and at most
/// once each; either can be queried or awaited from any task. A send that
/// requested neither reply returns an inert handle whose slots never
/// resolve.
#[derive(Clone, Debug)]
pub struct PacketFuture {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    ack: Slot<Result<(), Error>>,
    response: Slot<Result<InboundPacket, Error>>,
}

impl PacketFuture {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                ack: Slot::new(),
                response: Slot::new(),
            }),
        }
    }

    /// Whether the acknowledgement slot has resolved (success or failure).
    #[must_use]
    pub fn is_ack_done(&self) -> bool {
        self.shared.ack.is_set()
    }

    /// Whether the response slot has resolved (success or failure).
    #[must_use]
    pub fn is_response_done(&self) -> bool {
        self.shared.response.is_set()
    }

    /// Waits for the acknowledgement.
    ///
    /// # Errors
    /// Resolves to an error when the send failed, timed out, or the engine
    /// shut down first.
    pub async fn ack(&self) -> Result<(), Error> {
        self.shared.ack.wait().await
    }

    /// Waits for the response packet.
    ///
    /// # Errors
    /// Resolves to an error when the send failed, timed out, or the engine
    /// shut down first.
    pub async fn response(&self) -> Result<InboundPacket, Error> {
        self.shared.response.wait().await
    }

    pub(crate) fn complete_ack(&self) {
        self.shared.ack.set(Ok(()));
    }

    pub(crate) fn complete_response(&self, response: InboundPacket) {
        self.shared.response.set(Ok(response));
    }

    /// Fails whichever slots are still open; resolved slots keep their
    /// outcome.
    pub(crate) fn fail(&self, error: &Error) {
        self.shared.ack.set(Err(error.clone()));
        self.shared.response.set(Err(error.clone()));
    }
}
