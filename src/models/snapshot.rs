// One fully assembled view of all devices and their processes

use std::collections::BTreeMap;

use super::{DeviceStat, ProcessRecord};

/// Immutable per-tick view handed to the presentation layer.
/// Replaced wholesale on every tick; never mutated once published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub sequence: u64,
    pub captured_at_ms: u64,
    /// Collector order.
    pub devices: Vec<DeviceStat>,
    /// Device index → enumerator-ordered processes.
    pub processes: BTreeMap<u32, Vec<ProcessRecord>>,
    /// Set when the assembly deadline cut some component short.
    pub budget_exceeded: bool,
}

impl Snapshot {
    pub fn processes_for(&self, device_index: u32) -> &[ProcessRecord] {
        self.processes
            .get(&device_index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn process_count(&self) -> usize {
        self.processes.values().map(Vec::len).sum()
    }

    pub fn device(&self, index: u32) -> Option<&DeviceStat> {
        self.devices.iter().find(|d| d.index == index)
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}
