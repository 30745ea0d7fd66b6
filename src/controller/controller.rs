use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Controller, ControllerError, ControllerResult, RequestOutcome};
use crate::probe::SlotProbe;
use crate::record::{RequestRecord, Status};
use crate::store::Store;

impl Controller {
    pub fn new(store: Arc<dyn Store>, probe: Arc<dyn SlotProbe>) -> Self {
        Controller { store, probe }
    }

    /// Drive the per-client state machine one step. Swapping OCCUPIED in
    /// first both returns the authoritative previous state and keeps a
    /// concurrent second poll from acting on the same DONE record.
    pub async fn handle_request(
        &self,
        client_id: &str,
        host: &str,
    ) -> ControllerResult<RequestOutcome> {
        if client_id.is_empty() {
            return Err(ControllerError::EmptyClientId);
        }

        let marker = RequestRecord::new(client_id, Status::Occupied);
        let previous = self.store.set_and_get_previous(&marker).await?;

        let previous = match previous {
            Some(record) => record,
            None => {
                info!(client = client_id, "no previous request, creating one");
                return self.create_request(client_id).await;
            }
        };

        match previous.status {
            Status::Failed => {
                info!(client = client_id, "last request failed, creating a new one");
                self.create_request(client_id).await
            }
            Status::Created | Status::InProgress | Status::Occupied => {
                info!(client = client_id, "request is in progress");
                Ok(RequestOutcome::Pending)
            }
            Status::Done => self.verify_reservation(client_id, host, previous).await,
        }
    }

    /// Re-check a DONE reservation before handing the address out. The
    /// container may have expired it or gone away entirely.
    async fn verify_reservation(
        &self,
        client_id: &str,
        host: &str,
        record: RequestRecord,
    ) -> ControllerResult<RequestOutcome> {
        let container = record
            .container
            .as_deref()
            .ok_or_else(|| ControllerError::MissingAddress(client_id.to_string()))?;
        let port = record
            .server_port
            .as_deref()
            .ok_or_else(|| ControllerError::MissingAddress(client_id.to_string()))?;

        match self.probe.verify(container, client_id).await {
            Ok(true) => {
                info!(client = client_id, "reservation holds, returning address");
                let address = rebuild_address(host, port);
                // Write the DONE record back unchanged to release the
                // OCCUPIED marker for future polls.
                self.store.set(&record).await?;
                Ok(RequestOutcome::Ready(address))
            }
            Ok(false) => {
                info!(client = client_id, "reservation expired, creating a new request");
                self.create_request(client_id).await
            }
            Err(err) => {
                // Likely a closed container; treat like an expired
                // reservation.
                warn!(client = client_id, error = %err, "reservation verify failed");
                self.create_request(client_id).await
            }
        }
    }

    async fn create_request(&self, client_id: &str) -> ControllerResult<RequestOutcome> {
        let record = RequestRecord::new(client_id, Status::Created);
        self.store.set(&record).await?;
        self.store.push(client_id).await?;
        info!(client = client_id, "request enqueued");
        Ok(RequestOutcome::Pending)
    }
}

/// Rebuild the externally reachable address: the caller's host header with
/// its trailing `:port` segment replaced by the record's port. A host with
/// no port yields a result starting with `:`.
pub fn rebuild_address(host: &str, port: &str) -> String {
    let base = match host.rfind(':') {
        Some(index) => &host[..index],
        None => "",
    };
    format!("{}:{}", base, port)
}
