use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::driver::{ContainerDriver, DriverError};
use crate::probe::{ProbeError, SlotProbe};
use crate::record::Status;
use crate::store::{Store, StoreError};

/// Back-side reconciliation engine: takes one request id from CREATED (or
/// OCCUPIED) to DONE by finding or provisioning a container. Clones share
/// the creator lock, so one instance serves the whole pool.
#[derive(Clone)]
pub struct Processor {
    pub(super) store: Arc<dyn Store>,
    pub(super) driver: Arc<dyn ContainerDriver>,
    pub(super) probe: Arc<dyn SlotProbe>,
    /// Serializes container provisioning across the pool. Try-lock only.
    pub(super) creator_lock: Arc<Mutex<()>>,
    pub(super) lookup_cooldown: Duration,
}

#[derive(Debug)]
pub enum ProcessorError {
    Store(StoreError),
    Driver(DriverError),
    Probe(ProbeError),
    /// Popped an id with no record behind it.
    MissingRecord(String),
    /// The record was not in a state a worker may claim.
    NotClaimable(String, Status),
    /// A freshly created container refused its first reservation.
    ReservationRefused(String),
    /// A panic captured at the message boundary.
    Panic(String),
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorError::Store(err) => write!(f, "store error: {}", err),
            ProcessorError::Driver(err) => write!(f, "driver error: {}", err),
            ProcessorError::Probe(err) => write!(f, "probe error: {}", err),
            ProcessorError::MissingRecord(id) => {
                write!(f, "no record found for request {}", id)
            }
            ProcessorError::NotClaimable(id, status) => {
                write!(f, "request {} is {}, not claimable", id, status)
            }
            ProcessorError::ReservationRefused(id) => {
                write!(f, "new container {} refused the reservation", id)
            }
            ProcessorError::Panic(msg) => write!(f, "worker panic: {}", msg),
        }
    }
}

impl Error for ProcessorError {}

impl From<StoreError> for ProcessorError {
    fn from(err: StoreError) -> Self {
        ProcessorError::Store(err)
    }
}

impl From<DriverError> for ProcessorError {
    fn from(err: DriverError) -> Self {
        ProcessorError::Driver(err)
    }
}

impl From<ProbeError> for ProcessorError {
    fn from(err: ProbeError) -> Self {
        ProcessorError::Probe(err)
    }
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
