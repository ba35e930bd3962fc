use crate::{Error, MemoryBroker, MemoryLog};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use courier_broker::{StreamBroker, StreamEntry};
use tokio::time::Instant;

#[async_trait]
impl StreamBroker for MemoryBroker {
    type Error = Error;

    async fn append(
        &self,
        log: &str,
        fields: HashMap<String, String>,
    ) -> Result<String, Error> {
        let mut logs = self.logs.lock().await;
        let state = logs.entry(log.to_owned()).or_default();
        let id = state.next_seq.to_string();
        state.next_seq += 1;
        state.entries.push(StreamEntry {
            id: id.clone(),
            fields,
        });
        drop(logs);

        self.appended.notify_waiters();
        Ok(id)
    }

    async fn ensure_group(&self, log: &str, group: &str) -> Result<(), Error> {
        let mut logs = self.logs.lock().await;
        logs.entry(log.to_owned())
            .or_default()
            .groups
            .entry(group.to_owned())
            .or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        group: &str,
        _consumer: &str,
        log: &str,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, Error> {
        let deadline = Instant::now() + block;

        loop {
            {
                let mut logs = self.logs.lock().await;
                let state = logs.get_mut(log).ok_or_else(|| Error::UnknownGroup {
                    log: log.to_owned(),
                    group: group.to_owned(),
                })?;
                let MemoryLog {
                    entries, groups, ..
                } = state;
                let cursor = groups.get_mut(group).ok_or_else(|| Error::UnknownGroup {
                    log: log.to_owned(),
                    group: group.to_owned(),
                })?;

                if cursor.next_index < entries.len() {
                    let batch = entries[cursor.next_index..].to_vec();
                    cursor.next_index = entries.len();
                    for entry in &batch {
                        cursor.pending.insert(entry.id.clone());
                    }
                    return Ok(batch);
                }
            }

            tokio::select! {
                () = self.appended.notified() => {}
                () = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
            }
        }
    }

    async fn ack(&self, log: &str, group: &str, entry_id: &str) -> Result<(), Error> {
        let mut logs = self.logs.lock().await;
        let cursor = logs
            .get_mut(log)
            .and_then(|state| state.groups.get_mut(group))
            .ok_or_else(|| Error::UnknownGroup {
                log: log.to_owned(),
                group: group.to_owned(),
            })?;
        cursor.pending.remove(entry_id);
        Ok(())
    }
}
