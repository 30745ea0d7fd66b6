use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::probe::SlotProbe;
use crate::store::{Store, StoreError};

/// Front-side request lifecycle coordinator. Owns no state beyond its
/// handles; every decision is made against the shared store.
pub struct Controller {
    pub(super) store: Arc<dyn Store>,
    pub(super) probe: Arc<dyn SlotProbe>,
}

/// What the HTTP layer should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Request is pending or freshly enqueued; the client must poll.
    Pending,
    /// A reserved container is up; body is its `host:port` address.
    Ready(String),
}

#[derive(Debug)]
pub enum ControllerError {
    EmptyClientId,
    /// A DONE record without container address or port.
    MissingAddress(String),
    Store(StoreError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::EmptyClientId => write!(f, "got empty client id"),
            ControllerError::MissingAddress(id) => {
                write!(f, "record {} is DONE but has no container address", id)
            }
            ControllerError::Store(err) => write!(f, "store error: {}", err),
        }
    }
}

impl Error for ControllerError {}

impl From<StoreError> for ControllerError {
    fn from(err: StoreError) -> Self {
        ControllerError::Store(err)
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
