pub mod docker;
pub mod mock;
pub mod swarm;
pub mod types;

pub use docker::DockerDriver;
pub use mock::MockDriver;
pub use swarm::SwarmDriver;
pub use types::{ContainerDriver, ContainerInfo, DriverError, DriverResult, ExposedPort, ImageSettings};
