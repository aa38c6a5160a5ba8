// Device telemetry via NVML

use crate::error::DeviceError;
use crate::models::{DeviceProcess, DeviceStat, DriverInfo, cuda_version_string};
use nvml_wrapper::Nvml;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::enums::device::UsedGpuMemory;
use std::collections::HashSet;
use tracing::instrument;

const MIB: u64 = 1024 * 1024;

/// Read-only device-management interface. Calls block; the assembler runs
/// them on the blocking pool.
pub trait DeviceSource: Send + Sync {
    /// Every device visible right now. An unavailable interface yields an
    /// empty list; a device whose query fails is omitted.
    fn collect(&self) -> Vec<DeviceStat>;

    /// Driver-resident process handles on one device, compute before
    /// graphics, one entry per pid. Empty when the device cannot be queried.
    fn device_processes(&self, index: u32) -> Vec<DeviceProcess>;

    fn driver_info(&self) -> Option<DriverInfo>;
}

pub struct NvmlRepo {
    nvml: Nvml,
}

impl NvmlRepo {
    pub fn init() -> Result<Self, DeviceError> {
        let nvml = Nvml::init().map_err(|e| DeviceError::Init(e.to_string()))?;
        Ok(Self { nvml })
    }

    fn device_stat(&self, index: u32) -> Result<DeviceStat, DeviceError> {
        let query = |reason: nvml_wrapper::error::NvmlError| DeviceError::Query {
            index,
            reason: reason.to_string(),
        };
        let device = self.nvml.device_by_index(index).map_err(query)?;
        let name = device.name().map_err(query)?;
        let util = device.utilization_rates().map_err(query)?.gpu;
        let mem = device.memory_info().map_err(query)?;
        let temp = device.temperature(TemperatureSensor::Gpu).map_err(query)?;
        // Some boards do not report power; keep the device.
        let power = device
            .power_usage()
            .map(|mw| mw as f64 / 1000.0)
            .unwrap_or(0.0);

        Ok(DeviceStat {
            index,
            name,
            util,
            mem_used: mem.used / MIB,
            mem_total: mem.total / MIB,
            temp,
            power,
        })
    }
}

impl DeviceSource for NvmlRepo {
    #[instrument(skip(self), fields(repo = "nvml", operation = "collect"))]
    fn collect(&self) -> Vec<DeviceStat> {
        let count = match self.nvml.device_count() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, operation = "device_count", "NVML device count failed");
                return Vec::new();
            }
        };
        (0..count)
            .filter_map(|index| match self.device_stat(index) {
                Ok(stat) => Some(stat),
                Err(e) => {
                    tracing::debug!(error = %e, "device omitted from tick");
                    None
                }
            })
            .collect()
    }

    #[instrument(skip(self), fields(repo = "nvml", operation = "device_processes"))]
    fn device_processes(&self, index: u32) -> Vec<DeviceProcess> {
        let device = match self.nvml.device_by_index(index) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, index, "device handle lookup failed");
                return Vec::new();
            }
        };
        let to_handles = |procs: Vec<nvml_wrapper::struct_wrappers::device::ProcessInfo>| {
            procs
                .into_iter()
                .map(|p| DeviceProcess {
                    pid: p.pid,
                    used_memory: match p.used_gpu_memory {
                        UsedGpuMemory::Used(bytes) => Some(bytes),
                        UsedGpuMemory::Unavailable => None,
                    },
                })
                .collect::<Vec<_>>()
        };
        let compute = device
            .running_compute_processes()
            .map(to_handles)
            .unwrap_or_default();
        let graphics = device
            .running_graphics_processes()
            .map(to_handles)
            .unwrap_or_default();
        merge_handles(compute, graphics)
    }

    fn driver_info(&self) -> Option<DriverInfo> {
        let driver_version = self.nvml.sys_driver_version().ok()?;
        let nvml_version = self.nvml.sys_nvml_version().ok()?;
        let cuda_driver_version = self
            .nvml
            .sys_cuda_driver_version()
            .map(cuda_version_string)
            .unwrap_or_else(|_| "?".into());
        let device_count = self.nvml.device_count().unwrap_or(0);
        Some(DriverInfo {
            driver_version,
            cuda_driver_version,
            nvml_version,
            device_count,
        })
    }
}

/// Compute and graphics lists may name the same pid; keep the first entry.
pub(crate) fn merge_handles(
    compute: Vec<DeviceProcess>,
    graphics: Vec<DeviceProcess>,
) -> Vec<DeviceProcess> {
    let mut seen = HashSet::new();
    compute
        .into_iter()
        .chain(graphics)
        .filter(|p| seen.insert(p.pid))
        .collect()
}
