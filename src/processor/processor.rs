use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::types::{Processor, ProcessorError, ProcessorResult};
use crate::driver::{ContainerDriver, ContainerInfo};
use crate::probe::SlotProbe;
use crate::record::{claimable, RequestRecord, Status};
use crate::store::Store;

impl Processor {
    pub fn new(
        store: Arc<dyn Store>,
        driver: Arc<dyn ContainerDriver>,
        probe: Arc<dyn SlotProbe>,
        lookup_cooldown: Duration,
    ) -> Self {
        Processor {
            store,
            driver,
            probe,
            creator_lock: Arc::new(Mutex::new(())),
            lookup_cooldown,
        }
    }

    /// Entry point for one queue item. Never propagates: every failure,
    /// including a panic anywhere below, ends in a FAILED write so the
    /// client can start over.
    pub async fn process_message(&self, id: &str) {
        let outcome = AssertUnwindSafe(self.reconcile(id)).catch_unwind().await;

        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => ProcessorError::Panic(panic_message(payload)),
        };

        error!(request = id, error = %error, "request processing failed");
        let failed = RequestRecord::new(id, Status::Failed);
        if let Err(err) = self.store.set(&failed).await {
            error!(request = id, error = %err, "could not record the failure");
        }
    }

    async fn reconcile(&self, id: &str) -> ProcessorResult<()> {
        let marker = RequestRecord::new(id, Status::InProgress);
        let previous = self
            .store
            .set_and_get_previous(&marker)
            .await?
            .ok_or_else(|| ProcessorError::MissingRecord(id.to_string()))?;

        if !claimable(&previous.status) {
            return Err(ProcessorError::NotClaimable(id.to_string(), previous.status));
        }

        info!(request = id, "request picked up");
        let mut record = previous;
        record.status = Status::InProgress;

        let info = self.acquire_container(id).await?;
        record.container = Some(info.address);
        record.server_port = Some(info.exposed_port);
        record.status = Status::Done;
        self.store.set(&record).await?;

        info!(request = id, "request done");
        Ok(())
    }

    /// Find a running container with a spare slot, or provision one. The
    /// creator lock is only try-acquired: while another worker provisions,
    /// the rest keep scanning, because the new container will show up in
    /// their next listing within seconds.
    async fn acquire_container(&self, id: &str) -> ProcessorResult<ContainerInfo> {
        loop {
            if let Some(info) = self.find_running_container(id).await? {
                return Ok(info);
            }

            match self.creator_lock.try_lock() {
                Ok(_guard) => {
                    // A provision may have finished between the scan above
                    // and taking the lock; scan once more under the lock
                    // before creating another container.
                    if let Some(info) = self.find_running_container(id).await? {
                        return Ok(info);
                    }
                    return self.start_new_container(id).await;
                }
                Err(_) => {
                    debug!(request = id, "another worker is provisioning, waiting");
                    tokio::time::sleep(self.lookup_cooldown).await;
                }
            }
        }
    }

    /// Probe every running container of the image until one takes the
    /// reservation. Individual candidate failures are logged and skipped;
    /// only the listing itself is fatal.
    async fn find_running_container(&self, id: &str) -> ProcessorResult<Option<ContainerInfo>> {
        let containers = self.driver.list_containers().await?;

        for candidate in containers {
            let info = match self.driver.inspect_container(&candidate).await {
                Ok(info) => info,
                Err(err) => {
                    warn!(container = %candidate, error = %err, "inspect failed, skipping");
                    continue;
                }
            };

            match self.probe.reserve(&info.address, id, false).await {
                Ok(true) => {
                    info!(request = id, container = %candidate, "reserved running container");
                    return Ok(Some(info));
                }
                Ok(false) => {
                    debug!(container = %candidate, "container refused the reservation");
                }
                Err(err) => {
                    warn!(container = %candidate, error = %err, "reserve failed, skipping");
                }
            }
        }

        Ok(None)
    }

    /// Provision one container and take its first reservation, retrying
    /// the probe while the container starts up. Called under the creator
    /// lock.
    async fn start_new_container(&self, id: &str) -> ProcessorResult<ContainerInfo> {
        let created = self.driver.create_container().await?;
        let info = self.driver.inspect_container(&created).await?;

        let reserved = self.probe.reserve(&info.address, id, true).await?;
        if !reserved {
            return Err(ProcessorError::ReservationRefused(created));
        }

        info!(request = id, container = %created, "reserved new container");
        Ok(info)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
