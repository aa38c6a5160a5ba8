use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::DetailLimits;

/// Env var naming the config file; overrides the default `gtop.toml`.
pub const CONFIG_ENV: &str = "GTOP_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "gtop.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitoring: MonitoringConfig,
    pub containers: ContainerConfig,
    pub inference: InferenceConfig,
    pub detail: DetailConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub tick_interval_ms: u64,
    /// Wall-clock bound on one assembly pass; must stay below the tick interval.
    pub assembly_budget_ms: u64,
    /// How often to log tick stats at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            assembly_budget_ms: 800,
            stats_log_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub enabled: bool,
    /// Substrings of /proc/<pid>/cgroup that mark a containerized process.
    pub markers: Vec<String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            markers: ["docker", "kubepods", "containerd", "lxc"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub enabled: bool,
    /// Case-insensitive substrings of name, cmdline or exe that make a process a probe candidate.
    pub markers: Vec<String>,
    pub host: String,
    pub ports: Vec<u16>,
    pub probe_timeout_ms: u64,
    pub config_preview_chars: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            markers: vec!["tritonserver".into(), "triton".into()],
            host: "localhost".into(),
            ports: vec![8000, 8001, 8002],
            probe_timeout_ms: 1500,
            config_preview_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    pub timeout_ms: u64,
    pub env_limit: usize,
    pub open_files_limit: usize,
    pub connections_limit: usize,
}

impl Default for DetailConfig {
    fn default() -> Self {
        let limits = DetailLimits::default();
        Self {
            timeout_ms: 3000,
            env_limit: limits.env,
            open_files_limit: limits.open_files,
            connections_limit: limits.connections,
        }
    }
}

impl DetailConfig {
    pub fn limits(&self) -> DetailLimits {
        DetailLimits {
            env: self.env_limit,
            open_files: self.open_files_limit,
            connections: self.connections_limit,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Interactive mode writes logs here; without it they are discarded.
    pub file: Option<PathBuf>,
}

impl AppConfig {
    /// Load from `path`, else `$GTOP_CONFIG`, else `gtop.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let path = match explicit {
            Some(p) => p,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("config {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.monitoring.tick_interval_ms > 0,
            "monitoring.tick_interval_ms must be > 0, got {}",
            self.monitoring.tick_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.assembly_budget_ms > 0,
            "monitoring.assembly_budget_ms must be > 0, got {}",
            self.monitoring.assembly_budget_ms
        );
        anyhow::ensure!(
            self.monitoring.assembly_budget_ms < self.monitoring.tick_interval_ms,
            "monitoring.assembly_budget_ms ({}) must be below monitoring.tick_interval_ms ({})",
            self.monitoring.assembly_budget_ms,
            self.monitoring.tick_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.containers.enabled || !self.containers.markers.is_empty(),
            "containers.markers must be non-empty when containers.enabled"
        );
        if self.inference.enabled {
            anyhow::ensure!(
                !self.inference.markers.is_empty(),
                "inference.markers must be non-empty when inference.enabled"
            );
            anyhow::ensure!(
                !self.inference.host.is_empty(),
                "inference.host must be non-empty"
            );
            anyhow::ensure!(
                self.inference.ports.iter().all(|p| *p > 0),
                "inference.ports must be between 1 and 65535"
            );
            anyhow::ensure!(
                self.inference.probe_timeout_ms > 0,
                "inference.probe_timeout_ms must be > 0, got {}",
                self.inference.probe_timeout_ms
            );
        }
        anyhow::ensure!(
            self.detail.timeout_ms > 0,
            "detail.timeout_ms must be > 0, got {}",
            self.detail.timeout_ms
        );
        anyhow::ensure!(
            self.detail.env_limit > 0,
            "detail.env_limit must be > 0, got {}",
            self.detail.env_limit
        );
        anyhow::ensure!(
            self.detail.open_files_limit > 0,
            "detail.open_files_limit must be > 0, got {}",
            self.detail.open_files_limit
        );
        anyhow::ensure!(
            self.detail.connections_limit > 0,
            "detail.connections_limit must be > 0, got {}",
            self.detail.connections_limit
        );
        Ok(())
    }
}
