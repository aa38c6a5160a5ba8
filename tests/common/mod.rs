// Shared test helpers: in-memory sources with call counters.
#![allow(dead_code)]

use async_trait::async_trait;
use gtop::docker_repo::{ContainerEntry, ContainerRuntime};
use gtop::error::{ContainerError, DetailError, ProbeError};
use gtop::models::*;
use gtop::nvml_repo::DeviceSource;
use gtop::process_repo::{ProcessIdentity, ProcessTable};
use gtop::triton::{InferenceClient, RepositoryEntry, ServerMetadata};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

pub const MIB: u64 = 1024 * 1024;

pub fn container_id(n: u32) -> String {
    format!("{:064x}", n)
}

pub fn docker_cgroup(id: &str) -> String {
    format!("0::/system.slice/docker-{}.scope\n", id)
}

pub fn device(index: u32) -> DeviceStat {
    DeviceStat {
        index,
        name: format!("Test GPU {}", index),
        util: 10 * index,
        mem_used: 1024,
        mem_total: 16384,
        temp: 40,
        power: 100.0,
    }
}

/// Devices 0..count, each holding `pids_per_device` handles of 512 MiB.
pub struct FakeDevices {
    pub count: AtomicU32,
    pub pids_per_device: u32,
}

impl FakeDevices {
    pub fn new(count: u32, pids_per_device: u32) -> Self {
        Self {
            count: AtomicU32::new(count),
            pids_per_device,
        }
    }

    pub fn pid(index: u32, i: u32) -> u32 {
        10_000 + index * 100 + i
    }
}

impl DeviceSource for FakeDevices {
    fn collect(&self) -> Vec<DeviceStat> {
        (0..self.count.load(Ordering::SeqCst)).map(device).collect()
    }

    fn device_processes(&self, index: u32) -> Vec<DeviceProcess> {
        (0..self.pids_per_device)
            .map(|i| DeviceProcess {
                pid: Self::pid(index, i),
                used_memory: Some(512 * MIB),
            })
            .collect()
    }

    fn driver_info(&self) -> Option<DriverInfo> {
        None
    }
}

/// Every pid exists unless listed in `gone`. Names come from `names`, default "python".
#[derive(Default)]
pub struct FakeProcessTable {
    pub names: HashMap<u32, String>,
    pub cgroups: HashMap<u32, String>,
    pub gone: Vec<u32>,
    pub env: HashMap<u32, Vec<(String, String)>>,
    pub lookups: AtomicUsize,
}

impl ProcessTable for FakeProcessTable {
    fn lookup(&self, pids: &[u32]) -> anyhow::Result<HashMap<u32, ProcessIdentity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(pids
            .iter()
            .filter(|p| !self.gone.contains(p))
            .map(|&pid| {
                let name = self
                    .names
                    .get(&pid)
                    .cloned()
                    .unwrap_or_else(|| "python".into());
                (
                    pid,
                    ProcessIdentity {
                        cmdline: format!("{} --serve", name),
                        name,
                        exe: None,
                        rss_bytes: 100 * MIB,
                    },
                )
            })
            .collect())
    }

    fn cgroup(&self, pid: u32) -> Option<String> {
        self.cgroups.get(&pid).cloned()
    }

    fn detail(&self, pid: u32, limits: DetailLimits) -> Result<ProcessDetail, DetailError> {
        if self.gone.contains(&pid) {
            return Err(DetailError::ProcessGone(pid));
        }
        let env = self.env.get(&pid).cloned().unwrap_or_default();
        Ok(ProcessDetail {
            pid,
            exe: "/usr/bin/python3".into(),
            cwd: "/".into(),
            status: "running".into(),
            env_total: env.len(),
            env: env.into_iter().take(limits.env).collect(),
            open_files: vec![],
            connections: vec![],
        })
    }

    fn host_info(&self) -> anyhow::Result<HostInfo> {
        anyhow::bail!("not available in tests")
    }
}

#[derive(Default)]
pub struct CountingRuntime {
    pub containers: Vec<ContainerEntry>,
    pub top: HashMap<String, Vec<u32>>,
    pub unreachable: AtomicBool,
    pub list_calls: AtomicUsize,
    pub top_calls: AtomicUsize,
}

#[async_trait]
impl ContainerRuntime for CountingRuntime {
    async fn running_containers(&self) -> Result<Vec<ContainerEntry>, ContainerError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ContainerError::Unreachable("socket absent".into()));
        }
        Ok(self.containers.clone())
    }

    async fn container_pids(&self, id: &str) -> Result<Vec<u32>, ContainerError> {
        self.top_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.top.get(id).cloned().unwrap_or_default())
    }
}

/// Inference client that answers on `live_url` only, or never answers at all.
pub struct CountingClient {
    pub live_url: String,
    pub hang: bool,
    pub calls: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
}

impl CountingClient {
    pub fn serving(url: &str) -> Self {
        Self {
            live_url: url.into(),
            hang: false,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::serving("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn record(&self, url: &str) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if url == self.live_url {
            Ok(())
        } else {
            Err(ProbeError::Connect("refused".into()))
        }
    }
}

#[async_trait]
impl InferenceClient for CountingClient {
    async fn live(&self, base_url: &str) -> Result<(), ProbeError> {
        self.record(base_url).await
    }

    async fn server_metadata(&self, base_url: &str) -> Result<ServerMetadata, ProbeError> {
        self.record(base_url).await?;
        Ok(ServerMetadata {
            name: "triton".into(),
            version: "2.41.0".into(),
        })
    }

    async fn repository_index(&self, base_url: &str) -> Result<Vec<RepositoryEntry>, ProbeError> {
        self.record(base_url).await?;
        Ok(vec![
            RepositoryEntry {
                name: "resnet50".into(),
                version: Some("1".into()),
                state: Some("READY".into()),
                reason: None,
            },
            RepositoryEntry {
                name: "bert".into(),
                version: Some("1".into()),
                state: Some("WARMING_UP".into()),
                reason: None,
            },
        ])
    }

    async fn model_stats(&self, base_url: &str, model: &str) -> Result<ExecutionStats, ProbeError> {
        self.record(base_url).await?;
        if model == "bert" {
            return Err(ProbeError::Status(400));
        }
        Ok(ExecutionStats {
            inference_count: 10,
            execution_count: 5,
            success_count: 10,
            success_ns: 20_000_000,
            queue_ns: 0,
            compute_infer_ns: 15_000_000,
        })
    }

    async fn model_config(&self, base_url: &str, _model: &str) -> Result<String, ProbeError> {
        self.record(base_url).await?;
        Ok(format!("{{\"max_batch_size\": 8, \"padding\": \"{}\"}}", "x".repeat(400)))
    }
}
