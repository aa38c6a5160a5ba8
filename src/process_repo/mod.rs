// OS process table via sysinfo + /proc

mod linux;

use crate::error::DetailError;
use crate::models::{DetailLimits, HostInfo, ProcessDetail};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::instrument;

/// What the OS reports for one pid at enumeration time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessIdentity {
    pub name: String,
    pub cmdline: String,
    pub exe: Option<String>,
    pub rss_bytes: u64,
}

/// Read-only OS process table. Calls block; callers run them on the blocking pool.
/// Every lookup tolerates the process having exited.
pub trait ProcessTable: Send + Sync {
    /// Identity of each pid that still exists; exited pids are absent from the map.
    fn lookup(&self, pids: &[u32]) -> anyhow::Result<HashMap<u32, ProcessIdentity>>;

    /// Raw /proc/<pid>/cgroup text, `None` when unreadable or gone.
    fn cgroup(&self, pid: u32) -> Option<String>;

    fn detail(&self, pid: u32, limits: DetailLimits) -> Result<ProcessDetail, DetailError>;

    /// Value of one environment variable of `pid`; `None` when unset, unreadable or gone.
    fn environ_var(&self, pid: u32, key: &str) -> Option<String> {
        let limits = DetailLimits {
            env: usize::MAX,
            open_files: 0,
            connections: 0,
        };
        self.detail(pid, limits)
            .ok()?
            .env
            .into_iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    fn host_info(&self) -> anyhow::Result<HostInfo>;
}

pub struct SysinfoProcessTable {
    sys: Arc<Mutex<System>>,
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            sys: Arc::new(Mutex::new(System::new())),
        }
    }

    fn identity_refresh() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_memory()
            .with_exe(UpdateKind::Always)
            .with_cmd(UpdateKind::Always)
    }
}

impl ProcessTable for SysinfoProcessTable {
    #[instrument(skip(self, pids), fields(repo = "process", operation = "lookup", count = pids.len()))]
    fn lookup(&self, pids: &[u32]) -> anyhow::Result<HashMap<u32, ProcessIdentity>> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
        let targets: Vec<Pid> = pids.iter().copied().map(Pid::from_u32).collect();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&targets),
            true,
            Self::identity_refresh(),
        );

        Ok(pids
            .iter()
            .filter_map(|&pid| {
                let p = sys.process(Pid::from_u32(pid))?;
                let cmdline = p
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                Some((
                    pid,
                    ProcessIdentity {
                        name: p.name().to_string_lossy().into_owned(),
                        cmdline,
                        exe: p.exe().map(|e| e.to_string_lossy().into_owned()),
                        rss_bytes: p.memory(),
                    },
                ))
            })
            .collect())
    }

    fn cgroup(&self, pid: u32) -> Option<String> {
        linux::read_cgroup(pid)
    }

    #[instrument(skip(self), fields(repo = "process", operation = "detail"))]
    fn detail(&self, pid: u32, limits: DetailLimits) -> Result<ProcessDetail, DetailError> {
        // Own System per request: a slow /proc read here must never hold the
        // table the tick enumerates with.
        let (exe, cwd, status, environ) = {
            let mut sys = System::new();
            let target = [Pid::from_u32(pid)];
            sys.refresh_processes_specifics(
                ProcessesToUpdate::Some(&target),
                true,
                ProcessRefreshKind::nothing()
                    .with_exe(UpdateKind::Always)
                    .with_cwd(UpdateKind::Always)
                    .with_environ(UpdateKind::Always),
            );
            let p = sys
                .process(Pid::from_u32(pid))
                .ok_or(DetailError::ProcessGone(pid))?;
            let environ: Vec<String> = p
                .environ()
                .iter()
                .map(|e| e.to_string_lossy().into_owned())
                .collect();
            (
                p.exe().map(|e| e.to_string_lossy().into_owned()),
                p.cwd().map(|c| c.to_string_lossy().into_owned()),
                p.status().to_string().to_lowercase(),
                environ,
            )
        };

        let env_total = environ.len();
        let env = environ
            .into_iter()
            .filter_map(|kv| {
                let (k, v) = kv.split_once('=')?;
                Some((k.to_string(), v.to_string()))
            })
            .take(limits.env)
            .collect();

        let open_files = match linux::open_files(pid, limits.open_files) {
            Ok(files) => files,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DetailError::ProcessGone(pid));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                if exe.is_none() && cwd.is_none() {
                    return Err(DetailError::AccessDenied(pid));
                }
                Vec::new()
            }
            Err(e) => {
                tracing::debug!(error = %e, pid, "open files unreadable");
                Vec::new()
            }
        };
        let connections = linux::connections(pid, limits.connections).unwrap_or_default();

        Ok(ProcessDetail {
            pid,
            exe: exe.unwrap_or_default(),
            cwd: cwd.unwrap_or_default(),
            status,
            env,
            env_total,
            open_files,
            connections,
        })
    }

    #[instrument(skip(self), fields(repo = "process", operation = "environ_var"))]
    fn environ_var(&self, pid: u32, key: &str) -> Option<String> {
        let mut sys = System::new();
        let target = [Pid::from_u32(pid)];
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&target),
            true,
            ProcessRefreshKind::nothing().with_environ(UpdateKind::Always),
        );
        sys.process(Pid::from_u32(pid))?.environ().iter().find_map(|kv| {
            let (k, v) = kv.to_str()?.split_once('=')?;
            (k == key).then(|| v.to_string())
        })
    }

    #[instrument(skip(self), fields(repo = "process", operation = "host_info"))]
    fn host_info(&self) -> anyhow::Result<HostInfo> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
        sys.refresh_cpu_all();
        let cpu_model = linux::read_cpu_model_linux()
            .or_else(|| {
                sys.cpus()
                    .first()
                    .map(|c| c.brand().to_string())
                    .filter(|s| !s.is_empty() && s != "cpu0")
            })
            .unwrap_or_else(|| "Unknown".into());
        Ok(HostInfo {
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.into()),
            kernel_version: System::kernel_version().unwrap_or_default(),
            uptime_secs: System::uptime(),
            cpu_model,
            logical_cores: sys.cpus().len() as u32,
            physical_cores: System::physical_core_count().map(|c| c as u32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn detail_does_not_wait_on_enumeration_lock() {
        let table = Arc::new(SysinfoProcessTable::new());
        let _tick = table.sys.lock().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let reader = table.clone();
        std::thread::spawn(move || {
            let _ = tx.send(reader.detail(std::process::id(), DetailLimits::default()));
        });
        let detail = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("detail finished while the enumeration lock was held")
            .unwrap();
        assert_eq!(detail.pid, std::process::id());
        assert!(detail.env.len() <= DetailLimits::default().env);
    }

    #[test]
    fn lookup_skips_missing_pids() {
        let table = SysinfoProcessTable::new();
        let me = std::process::id();
        let found = table.lookup(&[me, u32::MAX - 1]).unwrap();
        assert!(found.contains_key(&me));
        assert!(!found.contains_key(&(u32::MAX - 1)));
    }
}
