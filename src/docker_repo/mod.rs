// Container runtime metadata via bollard

mod convert;

use crate::error::ContainerError;
use crate::models::PortMapping;
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{ListContainersOptions, TopOptions};
use std::collections::HashMap;
use tracing::instrument;

/// A running container as listed by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerEntry {
    pub id: String,
    pub name: String,
    pub ports: Vec<PortMapping>,
}

/// Read-only view of the container runtime's administrative interface.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn running_containers(&self) -> Result<Vec<ContainerEntry>, ContainerError>;

    /// Host pids of every process inside the container.
    async fn container_pids(&self, id: &str) -> Result<Vec<u32>, ContainerError>;
}

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    pub fn connect() -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_unix_defaults()
            .map_err(|e| ContainerError::Unreachable(e.to_string()))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRepo {
    #[instrument(skip(self), fields(repo = "docker", operation = "list_containers"))]
    async fn running_containers(&self) -> Result<Vec<ContainerEntry>, ContainerError> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let filter = ListContainersOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(filter))
            .await
            .map_err(|e| ContainerError::Unreachable(e.to_string()))?;
        Ok(containers.iter().filter_map(convert::container_entry).collect())
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "top_processes"))]
    async fn container_pids(&self, id: &str) -> Result<Vec<u32>, ContainerError> {
        let top = self
            .docker
            .top_processes(id, None::<TopOptions>)
            .await
            .map_err(|e| ContainerError::Query(e.to_string()))?;
        let titles = top.titles.unwrap_or_default();
        let rows = top.processes.unwrap_or_default();
        Ok(convert::pids_from_top(&titles, &rows))
    }
}
