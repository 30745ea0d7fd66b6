use async_trait::async_trait;
use std::error::Error;
use std::fmt;

use crate::record::RequestRecord;

/// Key of the FIFO list holding pending request ids.
pub const QUEUE_KEY: &str = "queue";

#[derive(Debug)]
pub enum StoreError {
    Connection(String),
    Command(String),
    Codec(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "store connection error: {}", msg),
            StoreError::Command(msg) => write!(f, "store command error: {}", msg),
            StoreError::Codec(msg) => write!(f, "record encoding error: {}", msg),
        }
    }
}

impl Error for StoreError {}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_io_error() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed record store plus the work queue. Records are persisted as JSON
/// text under their `id`; the queue is a FIFO of ids.
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically write the record and return the previous one stored under
    /// the same id, or `None` if the key did not exist.
    async fn set_and_get_previous(
        &self,
        record: &RequestRecord,
    ) -> StoreResult<Option<RequestRecord>>;

    /// Plain write, overwriting whatever was stored under the record's id.
    async fn set(&self, record: &RequestRecord) -> StoreResult<()>;

    /// Append an id to the work queue. Non-blocking.
    async fn push(&self, id: &str) -> StoreResult<()>;

    /// Remove and return the oldest queued id, waiting indefinitely until
    /// one exists.
    async fn pop_blocking(&self) -> StoreResult<String>;
}
