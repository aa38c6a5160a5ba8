// Device process handles joined with the OS process table, in one pass

use crate::models::{DeviceProcess, DeviceStat, ProcessRecord};
use crate::nvml_repo::DeviceSource;
use crate::process_repo::ProcessTable;
use std::collections::{BTreeMap, HashMap};

const MIB: f64 = 1024.0 * 1024.0;

/// Records for every device in `devices`, keyed by device index. Each device
/// gets an entry even when it has no processes. Pids that exited before the
/// OS lookup are dropped. Blocking.
pub fn enumerate(
    devices: &[DeviceStat],
    source: &dyn DeviceSource,
    table: &dyn ProcessTable,
) -> BTreeMap<u32, Vec<ProcessRecord>> {
    let handles: Vec<(u32, Vec<DeviceProcess>)> = devices
        .iter()
        .map(|d| (d.index, source.device_processes(d.index)))
        .collect();

    let mut pids: Vec<u32> = handles
        .iter()
        .flat_map(|(_, procs)| procs.iter().map(|p| p.pid))
        .collect();
    pids.sort_unstable();
    pids.dedup();

    let identities = if pids.is_empty() {
        HashMap::new()
    } else {
        table.lookup(&pids).unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "process_lookup", "process table lookup failed");
            HashMap::new()
        })
    };

    handles
        .into_iter()
        .map(|(index, procs)| {
            let records = procs
                .into_iter()
                .filter_map(|handle| {
                    let identity = identities.get(&handle.pid)?;
                    Some(ProcessRecord {
                        gpu_index: index,
                        pid: handle.pid,
                        name: identity.name.clone(),
                        cmdline: identity.cmdline.clone(),
                        exe: identity.exe.clone(),
                        mem_mb: handle.used_memory.map_or(0.0, |b| b as f64 / MIB),
                        host_mem_mb: identity.rss_bytes as f64 / MIB,
                        container: None,
                        inference: None,
                    })
                })
                .collect();
            (index, records)
        })
        .collect()
}
