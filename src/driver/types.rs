use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// Where a container can be reached: its network-internal address and the
/// externally published port of the configured service port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub address: String,
    pub exposed_port: String,
}

/// A service port in docker's `num/proto` notation. Protocol defaults to
/// tcp when omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedPort {
    pub port: u16,
    pub protocol: String,
}

impl fmt::Display for ExposedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl FromStr for ExposedPort {
    type Err = DriverError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (port, protocol) = match raw.split_once('/') {
            Some((port, protocol)) => (port, protocol),
            None => (raw, "tcp"),
        };

        let port = port
            .parse::<u16>()
            .map_err(|_| DriverError::InvalidExposedPort(raw.to_string()))?;
        if protocol.is_empty() {
            return Err(DriverError::InvalidExposedPort(raw.to_string()));
        }

        Ok(ExposedPort {
            port,
            protocol: protocol.to_string(),
        })
    }
}

/// Image to run containers from, with optional registry credentials.
#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub name: String,
    pub exposed_port: ExposedPort,
    pub registry_username: Option<String>,
    pub registry_password: Option<String>,
}

impl ImageSettings {
    /// Pull credentials when a registry username is configured.
    pub fn credentials(&self) -> Option<DockerCredentials> {
        self.registry_username.as_ref().map(|username| DockerCredentials {
            username: Some(username.clone()),
            password: self.registry_password.clone(),
            ..Default::default()
        })
    }
}

#[derive(Debug)]
pub enum DriverError {
    Api(String),
    InvalidExposedPort(String),
    MissingPortBinding(String),
    MissingTask(String),
    MissingContainerStatus(String),
    MissingNetworkAddress(String),
    TooManyTasks(String, usize),
    ConvergeTimeout(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Api(msg) => write!(f, "container runtime error: {}", msg),
            DriverError::InvalidExposedPort(raw) => {
                write!(f, "invalid exposed port specification: {}", raw)
            }
            DriverError::MissingPortBinding(id) => {
                write!(f, "no binding found for the configured service port on {}", id)
            }
            DriverError::MissingTask(id) => write!(f, "service {} has no tasks", id),
            DriverError::MissingContainerStatus(id) => {
                write!(f, "task of service {} has no container status", id)
            }
            DriverError::MissingNetworkAddress(id) => {
                write!(f, "{} has no address on the configured network", id)
            }
            DriverError::TooManyTasks(id, count) => {
                write!(f, "expected one task for service {}, got {}", id, count)
            }
            DriverError::ConvergeTimeout(id) => {
                write!(f, "service {} did not converge in time", id)
            }
        }
    }
}

impl Error for DriverError {}

impl From<bollard::errors::Error> for DriverError {
    fn from(err: bollard::errors::Error) -> Self {
        DriverError::Api(err.to_string())
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Capability over the container runtime. `list` and `inspect` cover
/// instances able to take probes; `create` provisions (or revives) one
/// instance and returns once it is startable.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    async fn list_containers(&self) -> DriverResult<Vec<String>>;
    async fn inspect_container(&self, id: &str) -> DriverResult<ContainerInfo>;
    async fn create_container(&self) -> DriverResult<String>;
}
