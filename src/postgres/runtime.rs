//! Container runtime seam and its Docker implementation.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HealthConfig, HealthStatusEnum, HostConfig, PortBinding};
use futures::StreamExt;

use crate::postgres::config::HealthCheckSpec;
use crate::postgres::error::RuntimeError;

/// Health reported by the runtime for a container with a declared check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The check has not passed or failed conclusively yet.
    Starting,
    Healthy,
    Unhealthy,
    /// No health information (yet); treated like `Starting`.
    Unknown,
}

/// Everything needed to create a single container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Image reference, `name:tag`.
    pub image: String,
    /// Environment variables: (name, value).
    pub env: Vec<(String, String)>,
    pub health_check: HealthCheckSpec,
    /// Port inside the container.
    pub container_port: u16,
    /// Loopback port on the host bound to `container_port`.
    pub host_port: u16,
}

/// Operations the lifecycle needs from a container runtime.
///
/// Built once per process and shared, so tests can substitute a fake and
/// callers avoid reconnecting for every instance.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether `image` is present locally. Absence is `Ok(false)`.
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    /// Pull `image`, returning only once the pull has completed.
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create (but do not start) a container, returning its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Current health of a container.
    async fn inspect_health(&self, id: &str) -> Result<HealthStatus, RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
}

/// Connect to the Docker daemon.
///
/// Tries bollard's local defaults first (which honour `DOCKER_HOST`), then the
/// per-user sockets used by Docker Desktop and rootless Docker.
pub async fn connect_docker() -> Result<Docker, RuntimeError> {
    let mut last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    for socket in fallback_sockets() {
        if !socket.exists() {
            continue;
        }
        let Some(path) = socket.to_str() else {
            continue;
        };
        match Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION) {
            Ok(docker) => match docker.ping().await {
                Ok(_) => {
                    tracing::debug!(socket = %path, "Connected to Docker via fallback socket");
                    return Ok(docker);
                }
                Err(e) => last_error = e.to_string(),
            },
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(RuntimeError::Unavailable { reason: last_error })
}

fn fallback_sockets() -> Vec<PathBuf> {
    let mut sockets = Vec::new();
    if let Some(home) = dirs::home_dir() {
        sockets.push(home.join(".docker/run/docker.sock"));
    }
    if let Some(runtime_dir) = dirs::runtime_dir() {
        sockets.push(runtime_dir.join("docker.sock"));
    }
    sockets
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect with [`connect_docker`].
    pub async fn connect() -> Result<Self, RuntimeError> {
        Ok(Self::new(connect_docker().await?))
    }
}

fn nanos(d: std::time::Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) => match RuntimeError::from(e) {
                RuntimeError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                tracing::trace!("Pull status: {}", status);
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let container_port = format!("{}/tcp", spec.container_port);

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            container_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(container_port, HashMap::new());

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let healthcheck = HealthConfig {
            test: Some(spec.health_check.test.clone()),
            interval: Some(nanos(spec.health_check.interval)),
            timeout: Some(nanos(spec.health_check.timeout)),
            retries: Some(i64::from(spec.health_check.retries)),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            healthcheck: Some(healthcheck),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                // Removal is explicit so teardown can report failures.
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;

        for warning in &response.warnings {
            tracing::warn!(container = %response.id, "Container create warning: {}", warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn inspect_health(&self, id: &str) -> Result<HealthStatus, RuntimeError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let status = info
            .state
            .and_then(|s| s.health)
            .and_then(|h| h.status);

        Ok(match status {
            Some(HealthStatusEnum::HEALTHY) => HealthStatus::Healthy,
            Some(HealthStatusEnum::UNHEALTHY) => HealthStatus::Unhealthy,
            Some(HealthStatusEnum::STARTING) => HealthStatus::Starting,
            _ => HealthStatus::Unknown,
        })
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(id, None::<RemoveContainerOptions>)
            .await?;
        Ok(())
    }
}
