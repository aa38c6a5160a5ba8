// One-shot JSON export of a snapshot

use crate::models::{DeviceStat, ProcessRecord, Snapshot};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// `{"gpus": [...], "processes": {"0": [...], ...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub gpus: Vec<DeviceStat>,
    pub processes: ProcessesByDevice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessExport {
    pub gpu_index: u32,
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
    pub mem_mb: f64,
    pub container: bool,
    pub container_name: String,
    pub container_ports: String,
}

impl From<&ProcessRecord> for ProcessExport {
    fn from(p: &ProcessRecord) -> Self {
        Self {
            gpu_index: p.gpu_index,
            pid: p.pid,
            name: p.name.clone(),
            cmdline: p.cmdline.clone(),
            mem_mb: p.mem_mb,
            container: p.is_containerized(),
            container_name: p.container_name().to_string(),
            container_ports: p.container_ports(),
        }
    }
}

/// Device-index-string → processes, serialized as a JSON object in device order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessesByDevice(pub Vec<(String, Vec<ProcessExport>)>);

impl ProcessesByDevice {
    pub fn get(&self, key: &str) -> Option<&[ProcessExport]> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }
}

impl Serialize for ProcessesByDevice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, procs) in &self.0 {
            map.serialize_entry(key, procs)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProcessesByDevice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ProcessesByDevice;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of device index to process list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, procs)) = access.next_entry::<String, Vec<ProcessExport>>()? {
                    entries.push((key, procs));
                }
                Ok(ProcessesByDevice(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

impl ExportDocument {
    /// Devices in collector order; every device gets a process entry.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let processes = snapshot
            .devices
            .iter()
            .map(|d| {
                let procs = snapshot
                    .processes_for(d.index)
                    .iter()
                    .map(ProcessExport::from)
                    .collect();
                (d.index.to_string(), procs)
            })
            .collect();
        Self {
            gpus: snapshot.devices.clone(),
            processes: ProcessesByDevice(processes),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
