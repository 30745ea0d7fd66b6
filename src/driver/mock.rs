use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::types::{ContainerDriver, ContainerInfo, DriverError, DriverResult};

/// Scriptable in-process driver for tests. Freshly created containers get
/// ids `fresh-0`, `fresh-1`, ... and immediately join the running set.
#[derive(Default)]
pub struct MockDriver {
    containers: Mutex<HashMap<String, ContainerInfo>>,
    running: Mutex<Vec<String>>,
    created: AtomicUsize,
    list_error: Mutex<Option<DriverError>>,
    list_panic: Mutex<Option<String>>,
    list_delay: Mutex<Duration>,
    create_delay: Mutex<Duration>,
    lists_in_flight: AtomicUsize,
    max_lists_in_flight: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        MockDriver::default()
    }

    pub fn add_running(&self, id: &str, info: ContainerInfo) {
        self.containers.lock().unwrap().insert(id.to_string(), info);
        self.running.lock().unwrap().push(id.to_string());
    }

    /// Fail the next `list_containers` call with `error`.
    pub fn fail_next_list(&self, error: DriverError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    /// Panic inside the next `list_containers` call with `message`.
    pub fn panic_next_list(&self, message: &str) {
        *self.list_panic.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    /// How many containers `create_container` produced.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Peak number of concurrent `list_containers` calls observed.
    pub fn max_lists_in_flight(&self) -> usize {
        self.max_lists_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerDriver for MockDriver {
    async fn list_containers(&self) -> DriverResult<Vec<String>> {
        let current = self.lists_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_lists_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.lists_in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = self.list_panic.lock().unwrap().take() {
            panic!("{}", message);
        }
        if let Some(error) = self.list_error.lock().unwrap().take() {
            return Err(error);
        }

        Ok(self.running.lock().unwrap().clone())
    }

    async fn inspect_container(&self, id: &str) -> DriverResult<ContainerInfo> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| DriverError::MissingPortBinding(id.to_string()))
    }

    async fn create_container(&self) -> DriverResult<String> {
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let index = self.created.fetch_add(1, Ordering::SeqCst);
        let id = format!("fresh-{}", index);
        let info = ContainerInfo {
            address: format!("{}-host", id),
            exposed_port: (35000 + index).to_string(),
        };
        self.add_running(&id, info);
        Ok(id)
    }
}
