use thiserror::Error;

/// Error type delivered through correlation futures.
///
/// Clonable so both completion slots can carry the same failure.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// No reply arrived before the registered deadline.
    #[error("packet `{0}` timed out waiting for a reply")]
    TimedOut(String),

    /// The packet never left this process.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The engine shut down with the entry still pending.
    #[error("correlation engine shut down")]
    ShutDown,
}
