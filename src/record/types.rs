use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Created,
    InProgress,
    Done,
    Failed,
    Occupied,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Created => write!(f, "CREATED"),
            Status::InProgress => write!(f, "IN_PROGRESS"),
            Status::Done => write!(f, "DONE"),
            Status::Failed => write!(f, "FAILED"),
            Status::Occupied => write!(f, "OCCUPIED"),
        }
    }
}

/// One client's outstanding request for a server slot. Keyed in the store
/// by `id`, which is the opaque client identifier itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub status: Status,
    /// Network-internal address of the chosen container. Set on DONE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Externally reachable port of the container's service port. Set on DONE.
    #[serde(rename = "port", default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<String>,
}

impl RequestRecord {
    pub fn new(id: impl Into<String>, status: Status) -> Self {
        RequestRecord {
            id: id.into(),
            status,
            container: None,
            server_port: None,
        }
    }
}
