// GPU process and container attachment models

use serde::{Deserialize, Serialize};
use std::fmt;

use super::InferenceServerInfo;

/// Published host port → container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.host_port, self.container_port)
    }
}

/// Arrow-joined mapping list, e.g. "8888→8888, 6006→6006"; "<none>" when empty.
pub fn format_ports(ports: &[PortMapping]) -> String {
    if ports.is_empty() {
        return "<none>".into();
    }
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Container enclosing a GPU process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub ports: Vec<PortMapping>,
}

impl ContainerInfo {
    pub fn ports_label(&self) -> String {
        format_ports(&self.ports)
    }
}

/// A process holding a handle on one device. `mem_mb` is device memory in MiB.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub gpu_index: u32,
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
    pub exe: Option<String>,
    pub mem_mb: f64,
    pub host_mem_mb: f64,
    pub container: Option<ContainerInfo>,
    pub inference: Option<InferenceServerInfo>,
}

impl ProcessRecord {
    pub fn is_containerized(&self) -> bool {
        self.container.is_some()
    }

    pub fn container_name(&self) -> &str {
        self.container.as_ref().map_or("", |c| c.name.as_str())
    }

    pub fn container_ports(&self) -> String {
        self.container
            .as_ref()
            .map(ContainerInfo::ports_label)
            .unwrap_or_default()
    }
}
