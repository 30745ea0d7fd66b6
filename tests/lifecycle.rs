//! End-to-end request lifecycle: controller and processor wired over one
//! shared in-memory store, the way the api and maker processes share Redis.

use std::sync::Arc;
use std::time::Duration;

use matchmaker::controller::{Controller, RequestOutcome};
use matchmaker::driver::{ContainerDriver, ContainerInfo, MockDriver};
use matchmaker::probe::{MockProbe, SlotProbe};
use matchmaker::processor::Processor;
use matchmaker::record::Status;
use matchmaker::store::{MemoryStore, Store};

const HOST: &str = "front.example:3000";

struct Harness {
    store: Arc<MemoryStore>,
    driver: Arc<MockDriver>,
    probe: Arc<MockProbe>,
    controller: Controller,
    processor: Processor,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let driver = Arc::new(MockDriver::new());
    let probe = Arc::new(MockProbe::new());

    let controller = Controller::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&probe) as Arc<dyn SlotProbe>,
    );
    let processor = Processor::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&driver) as Arc<dyn ContainerDriver>,
        Arc::clone(&probe) as Arc<dyn SlotProbe>,
        Duration::from_millis(10),
    );

    Harness {
        store,
        driver,
        probe,
        controller,
        processor,
    }
}

#[tokio::test]
async fn a_request_travels_from_submission_to_served_address() {
    let h = harness();
    h.driver.add_running(
        "X",
        ContainerInfo {
            address: "host-x".to_string(),
            exposed_port: "34999".to_string(),
        },
    );

    // Submission: accepted, recorded, enqueued.
    let outcome = h.controller.handle_request("c1", HOST).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Pending);
    assert_eq!(h.store.snapshot("c1").unwrap().status, Status::Created);
    assert_eq!(h.store.queued_ids(), vec!["c1"]);

    // A poll while still queued stays pending and enqueues nothing new.
    let outcome = h.controller.handle_request("c1", HOST).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Pending);
    assert_eq!(h.store.queued_ids(), vec!["c1"]);

    // The worker picks it up and reserves the running container.
    let id = h.store.pop_blocking().await.unwrap();
    h.processor.process_message(&id).await;

    let record = h.store.snapshot("c1").unwrap();
    assert_eq!(record.status, Status::Done);
    assert_eq!(record.container.as_deref(), Some("host-x"));
    assert_eq!(record.server_port.as_deref(), Some("34999"));

    // The next poll verifies the reservation and serves the address
    // rebuilt from the caller's host header.
    let outcome = h.controller.handle_request("c1", HOST).await.unwrap();
    assert_eq!(
        outcome,
        RequestOutcome::Ready("front.example:34999".to_string())
    );
    assert_eq!(h.store.snapshot("c1").unwrap().status, Status::Done);
}

#[tokio::test]
async fn a_stale_reservation_restarts_the_cycle() {
    let h = harness();
    h.driver.add_running(
        "X",
        ContainerInfo {
            address: "host-x".to_string(),
            exposed_port: "34999".to_string(),
        },
    );

    h.controller.handle_request("c1", HOST).await.unwrap();
    let id = h.store.pop_blocking().await.unwrap();
    h.processor.process_message(&id).await;
    assert_eq!(h.store.snapshot("c1").unwrap().status, Status::Done);

    // The container dropped the reservation in the meantime.
    h.probe.push_verify(Ok(false));

    let outcome = h.controller.handle_request("c1", HOST).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Pending);
    assert_eq!(h.store.snapshot("c1").unwrap().status, Status::Created);
    assert_eq!(h.store.queued_ids(), vec!["c1"]);

    // The new round completes like the first.
    let id = h.store.pop_blocking().await.unwrap();
    h.processor.process_message(&id).await;
    let outcome = h.controller.handle_request("c1", HOST).await.unwrap();
    assert_eq!(
        outcome,
        RequestOutcome::Ready("front.example:34999".to_string())
    );
}

#[tokio::test]
async fn a_failed_reconciliation_is_retried_on_the_next_poll() {
    let h = harness();

    h.controller.handle_request("c1", HOST).await.unwrap();
    let id = h.store.pop_blocking().await.unwrap();

    // Nothing running and the fresh container refuses: FAILED.
    h.probe.push_reserve(Ok(false));
    h.processor.process_message(&id).await;
    assert_eq!(h.store.snapshot("c1").unwrap().status, Status::Failed);

    // The client's next poll files a new request.
    let outcome = h.controller.handle_request("c1", HOST).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Pending);
    assert_eq!(h.store.snapshot("c1").unwrap().status, Status::Created);
    assert_eq!(h.store.queued_ids(), vec!["c1"]);

    // This time the container created by the failed round is running and
    // accepts, so no second container is provisioned.
    let id = h.store.pop_blocking().await.unwrap();
    h.processor.process_message(&id).await;
    assert_eq!(h.store.snapshot("c1").unwrap().status, Status::Done);
    assert_eq!(h.driver.created(), 1);
}
