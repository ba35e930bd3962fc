//! In-memory implementation of the broker transport, backing the test suite
//! and single-process embedding.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod pubsub;
mod stream;

pub use error::Error;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use courier_broker::StreamEntry;
use tokio::sync::{Mutex, Notify, mpsc};

/// A broker living entirely in process memory.
///
/// Clones share state, so handing clones of one `MemoryBroker` to several
/// components simulates those components talking through one shared broker
/// service.
#[derive(Clone, Debug, Default)]
pub struct MemoryBroker {
    channels: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<Bytes>>>>>,
    logs: Arc<Mutex<HashMap<String, MemoryLog>>>,
    appended: Arc<Notify>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    next_seq: u64,
    entries: Vec<StreamEntry>,
    groups: HashMap<String, GroupCursor>,
}

#[derive(Debug, Default)]
struct GroupCursor {
    next_index: usize,
    pending: HashSet<String>,
}
