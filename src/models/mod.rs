// Domain models

mod correlation;
mod detail;
mod device;
mod host;
mod inference;
mod process;
mod snapshot;

pub use correlation::Correlation;
pub use detail::{Connection, DetailLimits, OpenFile, ProcessDetail};
pub use device::{DeviceProcess, DeviceStat, DriverInfo, cuda_version_string};
pub use host::{HostInfo, format_uptime};
pub use inference::{ExecutionStats, InferenceServerInfo, ModelInfo, ModelState};
pub use process::{ContainerInfo, PortMapping, ProcessRecord, format_ports};
pub use snapshot::{Snapshot, now_ms};
