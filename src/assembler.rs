// Snapshot assembly: collect → enumerate → correlate → probe, under one
// wall-clock bound per pass. Anything still running at the deadline counts as
// failed for this tick and the snapshot is published without it.

use crate::budget::CallBudget;
use crate::correlator::ContainerCorrelator;
use crate::enumerator::enumerate;
use crate::models::{Correlation, DeviceStat, ProcessRecord, Snapshot, now_ms};
use crate::nvml_repo::DeviceSource;
use crate::process_repo::ProcessTable;
use crate::triton::InferenceProber;
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub struct Assembler {
    devices: Arc<dyn DeviceSource>,
    processes: Arc<dyn ProcessTable>,
    containers: ContainerCorrelator,
    prober: Option<Arc<InferenceProber>>,
    budget: Duration,
}

impl Assembler {
    pub fn new(
        devices: Arc<dyn DeviceSource>,
        processes: Arc<dyn ProcessTable>,
        containers: ContainerCorrelator,
        prober: Option<Arc<InferenceProber>>,
        budget: Duration,
    ) -> Self {
        Self {
            devices,
            processes,
            containers,
            prober,
            budget,
        }
    }

    /// Drop inference probing, e.g. for one-shot export where it is never shown.
    pub fn without_probing(mut self) -> Self {
        self.prober = None;
        self
    }

    pub async fn assemble(&self, sequence: u64) -> Snapshot {
        let budget = CallBudget::new(self.budget);
        self.assemble_within(sequence, &budget).await
    }

    #[instrument(skip(self, budget), fields(operation = "assemble"))]
    pub async fn assemble_within(&self, sequence: u64, budget: &CallBudget) -> Snapshot {
        let mut snapshot = Snapshot {
            sequence,
            captured_at_ms: now_ms(),
            ..Default::default()
        };

        let Some(devices) = self.collect(budget).await else {
            snapshot.budget_exceeded = budget.is_spent();
            return snapshot;
        };
        snapshot.devices = devices;

        let Some((mut processes, cgroups)) = self.enumerate(&snapshot.devices, budget).await else {
            snapshot.budget_exceeded = budget.is_spent();
            snapshot.processes = snapshot
                .devices
                .iter()
                .map(|d| (d.index, Vec::new()))
                .collect();
            return snapshot;
        };

        let cut_short = self.correlate(&mut processes, &cgroups, budget).await;
        snapshot.processes = processes;
        snapshot.budget_exceeded = cut_short || budget.is_spent();
        snapshot
    }

    async fn collect(&self, budget: &CallBudget) -> Option<Vec<DeviceStat>> {
        let devices = self.devices.clone();
        match budget.run(tokio::task::spawn_blocking(move || devices.collect())).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, operation = "collect", "device collection task failed");
                Some(Vec::new())
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "collect", "device collection cut short");
                None
            }
        }
    }

    /// Process records plus raw cgroup text per pid (only when container
    /// correlation is on).
    async fn enumerate(
        &self,
        devices: &[DeviceStat],
        budget: &CallBudget,
    ) -> Option<(BTreeMap<u32, Vec<ProcessRecord>>, HashMap<u32, String>)> {
        let source = self.devices.clone();
        let table = self.processes.clone();
        let devices = devices.to_vec();
        let want_cgroups = self.containers.is_enabled();
        let task = tokio::task::spawn_blocking(move || {
            let processes = enumerate(&devices, source.as_ref(), table.as_ref());
            let cgroups: HashMap<u32, String> = if want_cgroups {
                processes
                    .values()
                    .flatten()
                    .filter_map(|r| Some((r.pid, table.cgroup(r.pid)?)))
                    .collect()
            } else {
                HashMap::new()
            };
            (processes, cgroups)
        });
        match budget.run(task).await {
            Ok(Ok(out)) => Some(out),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, operation = "enumerate", "process enumeration task failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "enumerate", "process enumeration cut short");
                None
            }
        }
    }

    /// Attach container and inference metadata to every record concurrently.
    /// Returns true when the deadline cut any record short.
    async fn correlate(
        &self,
        processes: &mut BTreeMap<u32, Vec<ProcessRecord>>,
        cgroups: &HashMap<u32, String>,
        budget: &CallBudget,
    ) -> bool {
        let index = self.containers.prepare(budget).await;
        let round = self.prober.as_deref().map(|p| (p, p.round()));

        let tasks = processes.values_mut().flatten().map(|record| {
            let cgroup = cgroups.get(&record.pid).map(String::as_str);
            let index = &index;
            let round = &round;
            async move {
                let mut cut_short = false;
                match budget.run(index.resolve(record.pid, cgroup)).await {
                    Ok(Correlation::Failed(reason)) => {
                        tracing::debug!(pid = record.pid, reason = %reason, "container unresolved");
                    }
                    Ok(found) => record.container = found.found(),
                    Err(_) => cut_short = true,
                }

                if let Some((prober, round)) = round
                    && prober.is_candidate(&record.name, &record.cmdline, record.exe.as_deref())
                {
                    let ports = record
                        .container
                        .as_ref()
                        .map(|c| c.ports.as_slice())
                        .unwrap_or_default();
                    match budget.run(round.probe(ports, budget)).await {
                        Ok(Correlation::Failed(reason)) => {
                            tracing::debug!(pid = record.pid, reason = %reason, "inference probe failed");
                        }
                        Ok(found) => record.inference = found.found(),
                        Err(_) => cut_short = true,
                    }
                }
                cut_short
            }
        });

        join_all(tasks).await.into_iter().any(|cut| cut)
    }
}
