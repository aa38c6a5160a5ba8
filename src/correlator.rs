// Process → container correlation. Best effort: every failure degrades to
// "not containerized" and the runtime being down is logged once, not per tick.

use crate::budget::CallBudget;
use crate::docker_repo::{ContainerEntry, ContainerRuntime};
use crate::error::ContainerError;
use crate::models::{ContainerInfo, Correlation};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;

pub struct ContainerCorrelator {
    runtime: Option<Arc<dyn ContainerRuntime>>,
    markers: Arc<[String]>,
    unreachable_logged: AtomicBool,
}

impl ContainerCorrelator {
    pub fn new(runtime: Option<Arc<dyn ContainerRuntime>>, markers: Vec<String>) -> Self {
        Self {
            runtime,
            markers: markers.into(),
            unreachable_logged: AtomicBool::new(false),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.runtime.is_some()
    }

    /// List running containers once for this tick.
    pub async fn prepare(&self, budget: &CallBudget) -> ContainerIndex {
        let Some(runtime) = self.runtime.clone() else {
            return ContainerIndex::unavailable(self.markers.clone());
        };
        match budget.run(runtime.running_containers()).await {
            Ok(Ok(containers)) => {
                if self.unreachable_logged.swap(false, Ordering::Relaxed) {
                    tracing::info!("Container runtime reachable again");
                }
                ContainerIndex {
                    runtime: Some(runtime),
                    markers: self.markers.clone(),
                    containers: containers
                        .into_iter()
                        .map(|c| (c, OnceCell::new()))
                        .collect(),
                }
            }
            Ok(Err(e)) => {
                self.log_unreachable(&e);
                ContainerIndex::unavailable(self.markers.clone())
            }
            Err(exceeded) => {
                tracing::debug!(error = %exceeded, operation = "list_containers", "container listing cut short");
                ContainerIndex::unavailable(self.markers.clone())
            }
        }
    }

    fn log_unreachable(&self, e: &ContainerError) {
        if !self.unreachable_logged.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                error = %e,
                operation = "list_containers",
                "Container runtime unavailable; container columns will be empty"
            );
        }
    }
}

/// Per-tick view of running containers. Each container's process table is
/// fetched lazily, at most once per tick.
pub struct ContainerIndex {
    runtime: Option<Arc<dyn ContainerRuntime>>,
    markers: Arc<[String]>,
    containers: Vec<(ContainerEntry, OnceCell<Result<Vec<u32>, String>>)>,
}

impl ContainerIndex {
    fn unavailable(markers: Arc<[String]>) -> Self {
        Self {
            runtime: None,
            markers,
            containers: Vec::new(),
        }
    }

    pub async fn resolve(&self, pid: u32, cgroup: Option<&str>) -> Correlation<ContainerInfo> {
        let Some(cgroup) = cgroup else {
            return Correlation::Absent;
        };
        if !cgroup_marked(cgroup, &self.markers) {
            return Correlation::Absent;
        }
        let Some(runtime) = &self.runtime else {
            return Correlation::Absent;
        };

        if let Some(id) = container_id_from_cgroup(cgroup)
            && let Some((entry, _)) = self.containers.iter().find(|(c, _)| c.id == id)
        {
            return Correlation::Found(to_info(entry));
        }

        let mut last_error = None;
        for (entry, pids) in &self.containers {
            let pids = pids
                .get_or_init(|| async {
                    runtime
                        .container_pids(&entry.id)
                        .await
                        .map_err(|e| e.to_string())
                })
                .await;
            match pids {
                Ok(pids) if pids.contains(&pid) => return Correlation::Found(to_info(entry)),
                Ok(_) => {}
                Err(e) => last_error = Some(e.clone()),
            }
        }
        match last_error {
            Some(e) => Correlation::Failed(e),
            None => Correlation::failed(format!("no running container owns pid {}", pid)),
        }
    }
}

fn to_info(entry: &ContainerEntry) -> ContainerInfo {
    ContainerInfo {
        id: entry.id.clone(),
        name: entry.name.clone(),
        ports: entry.ports.clone(),
    }
}

pub fn cgroup_marked(cgroup: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| cgroup.contains(m.as_str()))
}

/// First 64-hex path component in cgroup text, e.g. the id in
/// "0::/system.slice/docker-<id>.scope" or "/kubepods/.../<id>".
pub fn container_id_from_cgroup(cgroup: &str) -> Option<String> {
    cgroup
        .split(|c: char| matches!(c, '/' | '-' | '.' | ':' | '\n'))
        .find(|seg| seg.len() == 64 && seg.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "4f3c2b1a0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b";

    #[test]
    fn container_id_from_systemd_scope() {
        let cgroup = format!("0::/system.slice/docker-{}.scope\n", ID);
        assert_eq!(container_id_from_cgroup(&cgroup).as_deref(), Some(ID));
    }

    #[test]
    fn container_id_from_cgroupfs_path() {
        let cgroup = format!("12:memory:/docker/{}\n11:cpu:/docker/{}\n", ID, ID);
        assert_eq!(container_id_from_cgroup(&cgroup).as_deref(), Some(ID));
    }

    #[test]
    fn container_id_absent_on_host_process() {
        assert!(container_id_from_cgroup("0::/user.slice/user-1000.slice/session-2.scope").is_none());
    }

    #[test]
    fn cgroup_marker_match() {
        let markers = vec!["docker".to_string(), "kubepods".to_string()];
        assert!(cgroup_marked("0::/kubepods/besteffort/pod1/abc", &markers));
        assert!(!cgroup_marked("0::/user.slice", &markers));
    }
}
