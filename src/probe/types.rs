use async_trait::async_trait;
use std::error::Error;
use std::fmt;

/// Transport-level probe failure. A reachable container that answers with
/// a non-200 status is a refusal, not an error.
#[derive(Debug)]
pub enum ProbeError {
    Unreachable(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Unreachable(msg) => write!(f, "container unreachable: {}", msg),
        }
    }
}

impl Error for ProbeError {}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        ProbeError::Unreachable(err.to_string())
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Asks a candidate container to take (or confirm) a reservation for one
/// request id. Returns whether the container agreed.
#[async_trait]
pub trait SlotProbe: Send + Sync {
    /// POST a reservation. With `retry`, transport errors are re-attempted
    /// a bounded number of times; used for freshly created containers that
    /// may still be starting.
    async fn reserve(&self, address: &str, request_id: &str, retry: bool) -> ProbeResult<bool>;

    /// GET the reservation to check it still holds. Never retried.
    async fn verify(&self, address: &str, request_id: &str) -> ProbeResult<bool>;
}
