use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::types::Processor;
use crate::store::Store;

/// Fixed-width consumer of the work queue. Each permit covers one blocking
/// pop plus the reconciliation of the popped id, so at most `max_jobs`
/// reconciliations are ever in flight.
pub struct WorkerPool {
    store: Arc<dyn Store>,
    processor: Processor,
    max_jobs: usize,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn Store>, processor: Processor, max_jobs: usize) -> Self {
        WorkerPool {
            store,
            processor,
            max_jobs,
        }
    }

    /// Consume the queue forever. Bounding the number of concurrent pops
    /// to `max_jobs` is the backpressure onto the container runtime.
    pub async fn run(self) {
        let permits = Arc::new(Semaphore::new(self.max_jobs));
        info!(jobs = self.max_jobs, "worker pool started");

        loop {
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                // The pool owns the semaphore and never closes it.
                Err(_) => return,
            };

            let store = Arc::clone(&self.store);
            let processor = self.processor.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match store.pop_blocking().await {
                    Ok(id) => processor.process_message(&id).await,
                    Err(err) => warn!(error = %err, "queue pop failed"),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ContainerDriver, MockDriver};
    use crate::probe::{MockProbe, SlotProbe};
    use crate::record::Status;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn drains_the_queue_without_exceeding_max_jobs() {
        let store = Arc::new(MemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let probe = Arc::new(MockProbe::new());

        // A slow listing keeps reconciliations overlapping, so the bound
        // is actually contested.
        driver.set_list_delay(Duration::from_millis(50));
        driver.add_running(
            "X",
            crate::driver::ContainerInfo {
                address: "host-x".to_string(),
                exposed_port: "34999".to_string(),
            },
        );

        let ids: Vec<String> = (0..6).map(|index| format!("c{}", index)).collect();
        for id in &ids {
            store
                .set(&crate::record::RequestRecord::new(id, Status::Created))
                .await
                .unwrap();
            store.push(id).await.unwrap();
        }

        let processor = Processor::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&driver) as Arc<dyn ContainerDriver>,
            Arc::clone(&probe) as Arc<dyn SlotProbe>,
            Duration::from_millis(10),
        );
        let pool = WorkerPool::new(Arc::clone(&store) as Arc<dyn Store>, processor, 2);
        let pool_task = tokio::spawn(pool.run());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let done = ids
                .iter()
                .filter(|id| {
                    store
                        .snapshot(id)
                        .map(|record| record.status == Status::Done)
                        .unwrap_or(false)
                })
                .count();
            if done == ids.len() {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "queue did not drain in time"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(driver.max_lists_in_flight() <= 2);
        pool_task.abort();
    }
}
