use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::secret::{ContainerInspectResponse, HostConfig, PortBinding};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::info;

use super::types::{ContainerDriver, ContainerInfo, DriverError, DriverResult, ExposedPort, ImageSettings};

/// Single-host variant: containers of the configured image on one Docker
/// engine. The service port is published on an OS-assigned host port.
pub struct DockerDriver {
    docker: Docker,
    image: ImageSettings,
    network: String,
}

impl DockerDriver {
    pub fn new(docker: Docker, image: ImageSettings, network: String) -> Self {
        DockerDriver {
            docker,
            image,
            network,
        }
    }

    fn image_filters(&self, status: &str) -> HashMap<String, Vec<String>> {
        HashMap::from([
            ("ancestor".to_string(), vec![self.image.name.clone()]),
            ("status".to_string(), vec![status.to_string()]),
        ])
    }

    /// Revive the first exited instance of the image, if one exists.
    /// Cheaper than pulling and creating from scratch.
    async fn restart_exited_container(&self) -> DriverResult<Option<String>> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: self.image_filters("exited"),
            ..Default::default()
        };

        let exited = self.docker.list_containers(Some(options)).await?;
        for container in exited {
            let id = match container.id {
                Some(id) => id,
                None => continue,
            };

            info!(container = %id, "restarting exited container");
            self.docker
                .start_container(&id, None::<StartContainerOptions<String>>)
                .await?;
            return Ok(Some(id));
        }

        Ok(None)
    }

    async fn pull_image(&self) -> DriverResult<()> {
        info!(image = %self.image.name, "pulling image");

        let options = CreateImageOptions {
            from_image: self.image.name.clone(),
            ..Default::default()
        };

        let mut progress = self
            .docker
            .create_image(Some(options), None, self.image.credentials());
        while let Some(update) = progress.next().await {
            update?;
        }

        info!(image = %self.image.name, "image pulled");
        Ok(())
    }
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    async fn list_containers(&self) -> DriverResult<Vec<String>> {
        let options = ListContainersOptions::<String> {
            filters: self.image_filters("running"),
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .filter_map(|container| container.id)
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> DriverResult<ContainerInfo> {
        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let address = details
            .config
            .as_ref()
            .and_then(|config| config.hostname.clone())
            .ok_or_else(|| DriverError::Api(format!("container {} has no hostname", id)))?;

        let exposed_port = host_port_binding(&details, &self.image.exposed_port)
            .ok_or_else(|| DriverError::MissingPortBinding(id.to_string()))?;

        Ok(ContainerInfo {
            address,
            exposed_port,
        })
    }

    async fn create_container(&self) -> DriverResult<String> {
        if let Some(id) = self.restart_exited_container().await? {
            return Ok(id);
        }

        self.pull_image().await?;

        // Binding the service port to host port 0 leaves the pick to the
        // OS; restrict the range via ip_local_port_range if needed.
        let bindings = vec![PortBinding {
            host_ip: Some("0.0.0.0".to_string()),
            host_port: Some("0".to_string()),
        }];
        let host_config = HostConfig {
            port_bindings: Some(HashMap::from([(
                self.image.exposed_port.to_string(),
                Some(bindings),
            )])),
            network_mode: if self.network.is_empty() {
                None
            } else {
                Some(self.network.clone())
            },
            ..Default::default()
        };

        let config = Config {
            image: Some(self.image.name.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;
        info!(container = %created.id, "container created");

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await?;
        info!(container = %created.id, "container started");

        Ok(created.id)
    }
}

fn host_port_binding(
    details: &ContainerInspectResponse,
    port: &ExposedPort,
) -> Option<String> {
    details
        .network_settings
        .as_ref()?
        .ports
        .as_ref()?
        .get(&port.to_string())?
        .as_ref()?
        .first()?
        .host_port
        .clone()
}
