// Synthetic sources for running without hardware. They implement the same
// traits as the live repos and go through the same assembler.

use crate::docker_repo::{ContainerEntry, ContainerRuntime};
use crate::error::{ContainerError, DetailError, ProbeError};
use crate::models::{
    Connection, DetailLimits, DeviceProcess, DeviceStat, DriverInfo, ExecutionStats, HostInfo,
    OpenFile, PortMapping, ProcessDetail,
};
use crate::nvml_repo::DeviceSource;
use crate::process_repo::{ProcessIdentity, ProcessTable};
use crate::triton::{InferenceClient, RepositoryEntry, ServerMetadata};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;

pub const DEMO_DEVICES: u32 = 4;
pub const DEMO_PROCESSES_PER_DEVICE: u32 = 10;
const DEMO_MEM_TOTAL_MIB: u64 = 16384;
const MIB: u64 = 1024 * 1024;

pub fn demo_pid(gpu: u32, i: u32) -> u32 {
    1000 + gpu * 10 + i
}

fn slot(pid: u32) -> Option<(u32, u32)> {
    let offset = pid.checked_sub(1000)?;
    let (gpu, i) = (offset / 10, offset % 10);
    (gpu < DEMO_DEVICES).then_some((gpu, i))
}

pub fn is_demo_containerized(pid: u32) -> bool {
    slot(pid).is_some_and(|(_, i)| i % 3 == 0)
}

pub fn is_demo_inference(pid: u32) -> bool {
    slot(pid).is_some() && pid % 5 == 0
}

/// 64-hex id so cgroup matching works the same as with real containers.
pub fn demo_container_id(pid: u32) -> String {
    format!("{:064x}", pid)
}

fn demo_ports() -> Vec<PortMapping> {
    vec![
        PortMapping {
            host_port: 8000,
            container_port: 8000,
        },
        PortMapping {
            host_port: 5432,
            container_port: 5432,
        },
    ]
}

pub struct DemoDevices;

impl DeviceSource for DemoDevices {
    fn collect(&self) -> Vec<DeviceStat> {
        let mut rng = rand::thread_rng();
        (0..DEMO_DEVICES)
            .map(|index| DeviceStat {
                index,
                name: format!("DemoGPU{}", index),
                util: rng.gen_range(0..=100),
                mem_used: rng.gen_range(0..=DEMO_MEM_TOTAL_MIB),
                mem_total: DEMO_MEM_TOTAL_MIB,
                temp: rng.gen_range(20..=90),
                power: rng.gen_range(10.0..250.0),
            })
            .collect()
    }

    fn device_processes(&self, index: u32) -> Vec<DeviceProcess> {
        if index >= DEMO_DEVICES {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        (0..DEMO_PROCESSES_PER_DEVICE)
            .map(|i| DeviceProcess {
                pid: demo_pid(index, i),
                used_memory: Some(rng.gen_range(10..=2048) * MIB),
            })
            .collect()
    }

    fn driver_info(&self) -> Option<DriverInfo> {
        Some(DriverInfo {
            driver_version: "550.54.14".into(),
            cuda_driver_version: "12.4".into(),
            nvml_version: "12.550.54.14".into(),
            device_count: DEMO_DEVICES,
        })
    }
}

pub struct DemoProcessTable;

fn demo_identity(pid: u32) -> ProcessIdentity {
    if is_demo_inference(pid) {
        ProcessIdentity {
            name: "tritonserver".into(),
            cmdline: "/opt/tritonserver/bin/tritonserver --model-repository=/models".into(),
            exe: Some("/opt/tritonserver/bin/tritonserver".into()),
            rss_bytes: 2048 * MIB,
        }
    } else {
        ProcessIdentity {
            name: format!("proc{}", pid),
            cmdline: format!("/usr/bin/proc{} --arg", pid),
            exe: Some(format!("/usr/bin/proc{}", pid)),
            rss_bytes: 256 * MIB,
        }
    }
}

impl ProcessTable for DemoProcessTable {
    fn lookup(&self, pids: &[u32]) -> anyhow::Result<HashMap<u32, ProcessIdentity>> {
        Ok(pids
            .iter()
            .filter(|pid| slot(**pid).is_some())
            .map(|&pid| (pid, demo_identity(pid)))
            .collect())
    }

    fn cgroup(&self, pid: u32) -> Option<String> {
        slot(pid)?;
        if is_demo_containerized(pid) {
            Some(format!(
                "0::/system.slice/docker-{}.scope\n",
                demo_container_id(pid)
            ))
        } else {
            Some("0::/user.slice/user-1000.slice/session-1.scope\n".into())
        }
    }

    fn detail(&self, pid: u32, limits: DetailLimits) -> Result<ProcessDetail, DetailError> {
        slot(pid).ok_or(DetailError::ProcessGone(pid))?;
        let triton = is_demo_inference(pid);

        let mut env: Vec<(String, String)> = [
            ("PATH", "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string()),
            ("CUDA_VISIBLE_DEVICES", "0,1".into()),
            ("USER", "ubuntu".into()),
            ("HOME", format!("/home/proc{}", pid)),
            ("SHELL", "/bin/bash".into()),
            ("PWD", "/workspace".into()),
            ("LANG", "en_US.UTF-8".into()),
            ("LD_LIBRARY_PATH", "/usr/local/cuda/lib64:/opt/nvidia/lib64".into()),
            ("NVIDIA_VISIBLE_DEVICES", "all".into()),
            ("PYTHONUNBUFFERED", "1".into()),
            ("TF_CPP_MIN_LOG_LEVEL", "2".into()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        if triton {
            env.extend(
                [
                    ("TRITON_MODEL_REPOSITORY", "/models"),
                    ("TRITON_METRICS_PORT", "8002"),
                    ("TRITON_GRPC_PORT", "8001"),
                    ("TRITON_HTTP_PORT", "8000"),
                ]
                .map(|(k, v)| (k.to_string(), v.to_string())),
            );
        }
        let env_total = env.len();
        env.truncate(limits.env);

        let mut files = vec![
            "/dev/nvidia0".to_string(),
            "/dev/nvidia1".into(),
            format!("/proc/{}/stat", pid),
            "/var/log/app.log".into(),
            "/tmp/cache.db".into(),
        ];
        if triton {
            files.extend([
                "/models/resnet50/config.pbtxt".to_string(),
                "/models/bert/model.pb".into(),
                "/var/log/triton.log".into(),
            ]);
        }
        let open_files = files
            .into_iter()
            .zip(3u32..)
            .map(|(path, fd)| OpenFile { fd, path })
            .take(limits.open_files)
            .collect();

        let conn = |local: &str, remote: &str, state: &str| Connection {
            kind: "tcp".into(),
            local: local.into(),
            remote: remote.into(),
            state: state.into(),
        };
        let mut connections = vec![
            conn(
                "0.0.0.0:8000",
                "127.0.0.1:45000",
                if triton { "LISTEN" } else { "ESTABLISHED" },
            ),
            conn("127.0.0.1:45000", "192.168.1.100:5432", "ESTABLISHED"),
            conn("127.0.0.1:45001", "10.0.0.50:6379", "ESTABLISHED"),
        ];
        if triton {
            connections.push(conn("0.0.0.0:8001", "", "LISTEN"));
        }
        connections.truncate(limits.connections);

        let identity = demo_identity(pid);
        Ok(ProcessDetail {
            pid,
            exe: identity.exe.unwrap_or_default(),
            cwd: "/workspace".into(),
            status: "running".into(),
            env,
            env_total,
            open_files,
            connections,
        })
    }

    fn host_info(&self) -> anyhow::Result<HostInfo> {
        Ok(HostInfo {
            os_name: "Demo Linux".into(),
            kernel_version: "6.8.0-demo".into(),
            uptime_secs: 3 * 86_400 + 4 * 3_600 + 5 * 60,
            cpu_model: "Demo CPU @ 3.00GHz".into(),
            logical_cores: 32,
            physical_cores: Some(16),
        })
    }
}

pub struct DemoContainerRuntime;

#[async_trait]
impl ContainerRuntime for DemoContainerRuntime {
    async fn running_containers(&self) -> Result<Vec<ContainerEntry>, ContainerError> {
        Ok((0..DEMO_DEVICES)
            .flat_map(|gpu| (0..DEMO_PROCESSES_PER_DEVICE).map(move |i| demo_pid(gpu, i)))
            .filter(|pid| is_demo_containerized(*pid))
            .map(|pid| ContainerEntry {
                id: demo_container_id(pid),
                name: format!("demo-container-{}", pid),
                ports: demo_ports(),
            })
            .collect())
    }

    async fn container_pids(&self, id: &str) -> Result<Vec<u32>, ContainerError> {
        let pid = u32::from_str_radix(id, 16)
            .map_err(|_| ContainerError::Query(format!("no such container: {}", id)))?;
        Ok(vec![pid])
    }
}

/// Serves the same four synthetic models on port 8000 of any host.
pub struct DemoInferenceClient;

const DEMO_MODELS: [(&str, &str, &str); 4] = [
    ("resnet50", "1", "input_shape: [1, 224, 224, 3], output_shape: [1, 1000]..."),
    ("bert-base", "1", "input_tokens: [1, 512], output_logits: [1, 30522]..."),
    ("yolov8", "2", "input_image: [1, 640, 640, 3], output_detections: [1, 25200, 85]..."),
    ("gpt-neo-small", "1", "input_ids: [1, 512], output_logits: [1, 512, 50257]..."),
];

fn serves(base_url: &str) -> Result<(), ProbeError> {
    if base_url.ends_with(":8000") {
        Ok(())
    } else {
        Err(ProbeError::Connect(format!("{}: connection refused", base_url)))
    }
}

fn demo_model_state(name: &str) -> &'static str {
    if name == "yolov8" && rand::thread_rng().gen_bool(0.3) {
        "LOADING"
    } else {
        "READY"
    }
}

fn demo_stats(name: &str) -> ExecutionStats {
    let mut rng = rand::thread_rng();
    let range = match name {
        "yolov8" => 50..=2000,
        "gpt-neo-small" => 500..=10_000,
        _ => 100..=5000,
    };
    let count: u64 = rng.gen_range(range);
    let per_request_ns: u64 = rng.gen_range(2_000_000..=40_000_000);
    ExecutionStats {
        inference_count: count,
        execution_count: rng.gen_range(count / 2..=count),
        success_count: count,
        success_ns: count * per_request_ns,
        queue_ns: count * per_request_ns / 20,
        compute_infer_ns: count * per_request_ns * 3 / 4,
    }
}

#[async_trait]
impl InferenceClient for DemoInferenceClient {
    async fn live(&self, base_url: &str) -> Result<(), ProbeError> {
        serves(base_url)
    }

    async fn server_metadata(&self, base_url: &str) -> Result<ServerMetadata, ProbeError> {
        serves(base_url)?;
        Ok(ServerMetadata {
            name: "triton".into(),
            version: "2.41.0".into(),
        })
    }

    async fn repository_index(&self, base_url: &str) -> Result<Vec<RepositoryEntry>, ProbeError> {
        serves(base_url)?;
        Ok(DEMO_MODELS
            .iter()
            .map(|(name, version, _)| RepositoryEntry {
                name: name.to_string(),
                version: Some(version.to_string()),
                state: Some(demo_model_state(name).into()),
                reason: None,
            })
            .collect())
    }

    async fn model_stats(&self, base_url: &str, model: &str) -> Result<ExecutionStats, ProbeError> {
        serves(base_url)?;
        if !DEMO_MODELS.iter().any(|(name, _, _)| *name == model) {
            return Err(ProbeError::Status(404));
        }
        Ok(demo_stats(model))
    }

    async fn model_config(&self, base_url: &str, model: &str) -> Result<String, ProbeError> {
        serves(base_url)?;
        DEMO_MODELS
            .iter()
            .find(|(name, _, _)| *name == model)
            .map(|(_, _, config)| config.to_string())
            .ok_or(ProbeError::Status(404))
    }
}
