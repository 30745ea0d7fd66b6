use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;

use super::types::{Store, StoreResult};
use crate::record::RequestRecord;

/// In-process store with the same contract as [`super::RedisStore`].
/// Records round-trip through their JSON text form so tests exercise the
/// real wire format. Used as the test double everywhere a store is needed.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
    queue: Mutex<VecDeque<String>>,
    queued: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Current record under `id`, if any.
    pub fn snapshot(&self, id: &str) -> Option<RequestRecord> {
        let records = self.records.lock().unwrap();
        records
            .get(id)
            .map(|raw| serde_json::from_str(raw).expect("stored record is valid JSON"))
    }

    /// Queue contents, oldest first.
    pub fn queued_ids(&self) -> Vec<String> {
        self.queue.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_and_get_previous(
        &self,
        record: &RequestRecord,
    ) -> StoreResult<Option<RequestRecord>> {
        let payload = serde_json::to_string(record)?;
        let previous = {
            let mut records = self.records.lock().unwrap();
            records.insert(record.id.clone(), payload)
        };

        match previous {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, record: &RequestRecord) -> StoreResult<()> {
        let payload = serde_json::to_string(record)?;
        self.records.lock().unwrap().insert(record.id.clone(), payload);
        Ok(())
    }

    async fn push(&self, id: &str) -> StoreResult<()> {
        self.queue.lock().unwrap().push_back(id.to_string());
        self.queued.notify_one();
        Ok(())
    }

    async fn pop_blocking(&self) -> StoreResult<String> {
        loop {
            // Register for a wakeup before checking, so a push that lands
            // between the check and the await is not missed.
            let notified = self.queued.notified();
            if let Some(id) = self.queue.lock().unwrap().pop_front() {
                return Ok(id);
            }
            notified.await;
        }
    }
}
