use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock epoch milliseconds, used as best-effort send-time metadata.
pub(crate) fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
