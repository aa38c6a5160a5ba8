// Inference-server detection and probing
//
// Only processes matching a marker are ever probed. A tick runs the summary
// probe (live + repository index); the model modal runs the full probe.

mod client;

pub use client::{HttpTritonClient, InferenceClient, RepositoryEntry, ServerMetadata, parse_stats};

use crate::budget::CallBudget;
use crate::config::InferenceConfig;
use crate::error::ProbeError;
use crate::models::{Correlation, InferenceServerInfo, ModelInfo, ModelState, PortMapping};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Set in the environment of Triton servers whose name gives no hint.
pub const MODEL_REPOSITORY_ENV: &str = "TRITON_MODEL_REPOSITORY";

pub struct InferenceProber {
    client: Arc<dyn InferenceClient>,
    markers: Vec<String>,
    host: String,
    ports: Vec<u16>,
    probe_timeout: Duration,
    config_preview_chars: usize,
}

impl InferenceProber {
    pub fn new(client: Arc<dyn InferenceClient>, config: &InferenceConfig) -> Self {
        Self {
            client,
            markers: config.markers.iter().map(|m| m.to_lowercase()).collect(),
            host: config.host.clone(),
            ports: config.ports.clone(),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            config_preview_chars: config.config_preview_chars,
        }
    }

    /// Case-insensitive marker match on name, command line or executable path.
    pub fn is_candidate(&self, name: &str, cmdline: &str, exe: Option<&str>) -> bool {
        let fields = [name, cmdline, exe.unwrap_or_default()].map(str::to_lowercase);
        self.markers
            .iter()
            .any(|m| fields.iter().any(|f| f.contains(m.as_str())))
    }

    /// Container host ports first, then the configured standard ports. No duplicates.
    pub fn candidate_urls(&self, container_ports: &[PortMapping]) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let ports = container_ports
            .iter()
            .map(|p| p.host_port)
            .chain(self.ports.iter().copied());
        for port in ports {
            let url = format!("http://{}:{}", self.host, port);
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }

    /// First candidate URL answering the live check.
    pub async fn discover(&self, container_ports: &[PortMapping], budget: &CallBudget) -> Option<String> {
        for url in self.candidate_urls(container_ports) {
            if budget.is_spent() {
                return None;
            }
            let call = budget.child(self.probe_timeout);
            match call.run(self.client.live(&url)).await {
                Ok(Ok(())) => return Some(url),
                Ok(Err(e)) => tracing::trace!(url = %url, error = %e, "live check failed"),
                Err(e) => tracing::trace!(url = %url, error = %e, "live check cut short"),
            }
        }
        None
    }

    /// Live check and model list only. Used during ticks.
    pub async fn probe_summary(
        &self,
        container_ports: &[PortMapping],
        budget: &CallBudget,
    ) -> Correlation<InferenceServerInfo> {
        let Some(url) = self.discover(container_ports, budget).await else {
            return Correlation::Absent;
        };
        let call = budget.child(self.probe_timeout);
        let entries = match call.run(self.client.repository_index(&url)).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => return Correlation::failed(e),
            Err(e) => return Correlation::failed(e),
        };
        Correlation::Found(InferenceServerInfo {
            server_url: url,
            server_version: None,
            models: entries.into_iter().map(model_from_entry).collect(),
        })
    }

    /// Server metadata, model list, and per-model stats and config. Per-model
    /// failures leave those fields empty.
    pub async fn probe_full(
        &self,
        container_ports: &[PortMapping],
        budget: &CallBudget,
    ) -> Result<InferenceServerInfo, ProbeError> {
        let url = self
            .discover(container_ports, budget)
            .await
            .ok_or(ProbeError::NoServer)?;

        let metadata = budget
            .child(self.probe_timeout)
            .run(self.client.server_metadata(&url))
            .await;
        let server_version = match metadata {
            Ok(Ok(m)) if !m.version.is_empty() => Some(format!("{} {}", m.name, m.version).trim().to_string()),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "server metadata unavailable");
                None
            }
            Err(_) => None,
        };

        let entries = budget
            .child(self.probe_timeout)
            .run(self.client.repository_index(&url))
            .await
            .map_err(|_| ProbeError::Timeout)??;

        let models = join_all(entries.into_iter().map(|entry| {
            let url = url.as_str();
            async move {
                let mut model = model_from_entry(entry);
                let stats = budget.child(self.probe_timeout);
                let config = budget.child(self.probe_timeout);
                let (stats, config) = tokio::join!(
                    stats.run(self.client.model_stats(url, &model.name)),
                    config.run(self.client.model_config(url, &model.name)),
                );
                model.stats = stats.ok().and_then(Result::ok);
                model.config = config
                    .ok()
                    .and_then(Result::ok)
                    .map(|c| truncate_chars(&c, self.config_preview_chars));
                model
            }
        }))
        .await;

        Ok(InferenceServerInfo {
            server_url: url,
            server_version,
            models,
        })
    }

    /// Memo for one tick; the same endpoint set is probed at most once.
    pub fn round(&self) -> ProbeRound<'_> {
        ProbeRound {
            prober: self,
            memo: Mutex::new(HashMap::new()),
        }
    }
}

type Memo = Arc<OnceCell<Correlation<InferenceServerInfo>>>;

pub struct ProbeRound<'a> {
    prober: &'a InferenceProber,
    memo: Mutex<HashMap<Vec<PortMapping>, Memo>>,
}

impl ProbeRound<'_> {
    pub async fn probe(
        &self,
        container_ports: &[PortMapping],
        budget: &CallBudget,
    ) -> Correlation<InferenceServerInfo> {
        let cell = match self.memo.lock() {
            Ok(mut memo) => memo.entry(container_ports.to_vec()).or_default().clone(),
            Err(_) => Arc::new(OnceCell::new()),
        };
        cell.get_or_init(|| self.prober.probe_summary(container_ports, budget))
            .await
            .clone()
    }
}

fn model_from_entry(entry: RepositoryEntry) -> ModelInfo {
    ModelInfo {
        state: ModelState::from_server(entry.state.as_deref()),
        name: entry.name,
        version: entry.version.filter(|v| !v.is_empty()),
        reason: entry.reason.filter(|r| !r.is_empty()),
        stats: None,
        config: None,
    }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
