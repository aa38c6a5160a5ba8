// Accelerator device and driver models

use serde::{Deserialize, Serialize};

/// One device as reported by the management interface during a single tick.
/// Memory figures are MiB, power is watts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStat {
    pub index: u32,
    pub name: String,
    pub util: u32,
    pub mem_used: u64,
    pub mem_total: u64,
    pub temp: u32,
    pub power: f64,
}

impl DeviceStat {
    /// Memory usage as a whole percentage; 0 when the total is unknown.
    pub fn mem_percent(&self) -> u32 {
        if self.mem_total == 0 {
            return 0;
        }
        ((self.mem_used.min(self.mem_total) * 100) / self.mem_total) as u32
    }
}

/// A process handle reported by the driver for one device, before OS lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProcess {
    pub pid: u32,
    /// Bytes; `None` when the driver cannot attribute memory (e.g. WDDM, MIG).
    pub used_memory: Option<u64>,
}

/// Driver-level identity, fetched once at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub driver_version: String,
    pub cuda_driver_version: String,
    pub nvml_version: String,
    pub device_count: u32,
}

impl DriverInfo {
    pub fn summary(&self) -> String {
        format!(
            "NVIDIA Driver: {} | CUDA Driver: {} | NVML: {} | GPUs: {}",
            self.driver_version, self.cuda_driver_version, self.nvml_version, self.device_count
        )
    }
}

/// Format the integer CUDA driver version (e.g. 12040) as "major.minor".
pub fn cuda_version_string(version: i32) -> String {
    let major = version / 1000;
    let minor = (version % 1000) / 10;
    format!("{}.{}", major, minor)
}
