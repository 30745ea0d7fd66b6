use async_trait::async_trait;
use bollard::network::InspectNetworkOptions;
use bollard::secret::{
    EndpointPortConfig, EndpointPortConfigProtocolEnum, EndpointSpec, NetworkAttachmentConfig,
    Service, ServiceSpec, ServiceSpecMode, ServiceSpecModeReplicated, Task, TaskSpec,
    TaskSpecContainerSpec, TaskSpecRestartPolicy, TaskSpecRestartPolicyConditionEnum,
};
use bollard::service::{InspectServiceOptions, ListServicesOptions, ListTasksOptions};
use bollard::Docker;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use super::types::{ContainerDriver, ContainerInfo, DriverError, DriverResult, ExposedPort, ImageSettings};

/// Cluster variant: every "container" is a single-replica swarm service.
/// A service counts as running once it has at least one running task.
pub struct SwarmDriver {
    docker: Docker,
    image: ImageSettings,
    network: String,
    converge_cooldown: Duration,
    converge_retries: u32,
}

impl SwarmDriver {
    pub fn new(
        docker: Docker,
        image: ImageSettings,
        network: String,
        converge_cooldown: Duration,
        converge_retries: u32,
    ) -> Self {
        SwarmDriver {
            docker,
            image,
            network,
            converge_cooldown,
            converge_retries,
        }
    }

    /// The service's single task, or `None` while none has been scheduled.
    async fn service_task(&self, id: &str) -> DriverResult<Option<Task>> {
        let options = ListTasksOptions::<String> {
            filters: HashMap::from([("service".to_string(), vec![id.to_string()])]),
        };

        let mut tasks = self.docker.list_tasks(Some(options)).await?;
        if tasks.len() > 1 {
            return Err(DriverError::TooManyTasks(id.to_string(), tasks.len()));
        }

        Ok(tasks.pop())
    }

    async fn network_id(&self) -> DriverResult<String> {
        let network = self
            .docker
            .inspect_network(&self.network, None::<InspectNetworkOptions<String>>)
            .await?;

        network
            .id
            .ok_or_else(|| DriverError::Api(format!("network {} has no id", self.network)))
    }

    fn service_spec(&self) -> ServiceSpec {
        let port_config = EndpointPortConfig {
            protocol: Some(protocol_enum(&self.image.exposed_port.protocol)),
            target_port: Some(i64::from(self.image.exposed_port.port)),
            // 0 lets the routing mesh pick a free published port.
            published_port: Some(0),
            ..Default::default()
        };

        ServiceSpec {
            mode: Some(ServiceSpecMode {
                replicated: Some(ServiceSpecModeReplicated { replicas: Some(1) }),
                ..Default::default()
            }),
            task_template: Some(TaskSpec {
                container_spec: Some(TaskSpecContainerSpec {
                    image: Some(self.image.name.clone()),
                    ..Default::default()
                }),
                restart_policy: Some(TaskSpecRestartPolicy {
                    condition: Some(TaskSpecRestartPolicyConditionEnum::NONE),
                    ..Default::default()
                }),
                networks: Some(vec![NetworkAttachmentConfig {
                    target: Some(self.network.clone()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            endpoint_spec: Some(EndpointSpec {
                ports: Some(vec![port_config]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerDriver for SwarmDriver {
    async fn list_containers(&self) -> DriverResult<Vec<String>> {
        let options = ListServicesOptions::<String> {
            status: true,
            ..Default::default()
        };

        let services = self.docker.list_services(Some(options)).await?;
        let mut result = Vec::new();
        for service in services {
            let running = service
                .service_status
                .as_ref()
                .and_then(|status| status.running_tasks)
                .unwrap_or(0)
                > 0;
            if !running {
                continue;
            }

            // The runtime rewrites image references to name@digest, so
            // match by prefix.
            let ours = service_image(&service)
                .map(|image| image.starts_with(&self.image.name))
                .unwrap_or(false);
            if !ours {
                continue;
            }

            if let Some(id) = service.id {
                result.push(id);
            }
        }

        Ok(result)
    }

    async fn inspect_container(&self, id: &str) -> DriverResult<ContainerInfo> {
        let task = self
            .service_task(id)
            .await?
            .ok_or_else(|| DriverError::MissingTask(id.to_string()))?;

        let converged = task
            .status
            .as_ref()
            .and_then(|status| status.container_status.as_ref())
            .is_some();
        if !converged {
            return Err(DriverError::MissingContainerStatus(id.to_string()));
        }

        let service = self
            .docker
            .inspect_service(id, None::<InspectServiceOptions>)
            .await?;

        let exposed_port = published_port(&service, &self.image.exposed_port)
            .ok_or_else(|| DriverError::MissingPortBinding(id.to_string()))?;

        let network_id = self.network_id().await?;
        let address = overlay_address(&service, &network_id)
            .ok_or_else(|| DriverError::MissingNetworkAddress(id.to_string()))?;

        Ok(ContainerInfo {
            address,
            exposed_port,
        })
    }

    async fn create_container(&self) -> DriverResult<String> {
        info!(image = %self.image.name, "creating service");
        let response = self
            .docker
            .create_service(self.service_spec(), self.image.credentials())
            .await?;

        let id = response
            .id
            .ok_or_else(|| DriverError::Api("service create returned no id".to_string()))?;

        // Wait until the task carries a container status; before that the
        // service cannot be inspected for an address.
        let mut attempts = 0;
        loop {
            if let Some(task) = self.service_task(&id).await? {
                let converged = task
                    .status
                    .as_ref()
                    .and_then(|status| status.container_status.as_ref())
                    .is_some();
                if converged {
                    break;
                }
            }

            attempts += 1;
            if attempts >= self.converge_retries {
                return Err(DriverError::ConvergeTimeout(id));
            }
            tokio::time::sleep(self.converge_cooldown).await;
        }

        info!(service = %id, "service created");
        Ok(id)
    }
}

fn protocol_enum(protocol: &str) -> EndpointPortConfigProtocolEnum {
    match protocol {
        "udp" => EndpointPortConfigProtocolEnum::UDP,
        "sctp" => EndpointPortConfigProtocolEnum::SCTP,
        _ => EndpointPortConfigProtocolEnum::TCP,
    }
}

fn service_image(service: &Service) -> Option<&str> {
    service
        .spec
        .as_ref()?
        .task_template
        .as_ref()?
        .container_spec
        .as_ref()?
        .image
        .as_deref()
}

/// Published port whose target matches the configured service port.
fn published_port(service: &Service, exposed: &ExposedPort) -> Option<String> {
    let ports = service.endpoint.as_ref()?.ports.as_ref()?;
    let expected = protocol_enum(&exposed.protocol);

    for config in ports {
        let protocol_matches = config.protocol.as_ref().map(|p| *p == expected).unwrap_or(false);
        let target_matches = config.target_port == Some(i64::from(exposed.port));
        if protocol_matches && target_matches {
            return config.published_port.map(|port| port.to_string());
        }
    }

    None
}

/// The service's IPv4 on the configured overlay network, from its virtual
/// IP entry (`addr` arrives in prefix notation).
fn overlay_address(service: &Service, network_id: &str) -> Option<String> {
    let virtual_ips = service.endpoint.as_ref()?.virtual_ips.as_ref()?;

    for entry in virtual_ips {
        if entry.network_id.as_deref() != Some(network_id) {
            continue;
        }

        let addr = entry.addr.as_deref()?;
        let ip = addr.split('/').next()?;
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    None
}
