// Inference server (Triton / KServe v2) models

use serde::{Deserialize, Serialize};
use std::fmt;

/// Model readiness as reported by the server; serializes uppercase (e.g. "READY").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelState {
    Ready,
    Loading,
    Unloading,
    Unavailable,
    #[serde(other)]
    Unknown,
}

impl ModelState {
    /// Normalize a server-reported state; anything unrecognized is `Unknown`.
    pub fn from_server(s: Option<&str>) -> Self {
        match s.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("READY") => ModelState::Ready,
            Some("LOADING") => ModelState::Loading,
            Some("UNLOADING") => ModelState::Unloading,
            Some("UNAVAILABLE") => ModelState::Unavailable,
            _ => ModelState::Unknown,
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelState::Ready => "READY",
            ModelState::Loading => "LOADING",
            ModelState::Unloading => "UNLOADING",
            ModelState::Unavailable => "UNAVAILABLE",
            ModelState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Cumulative execution statistics for one model version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub inference_count: u64,
    pub execution_count: u64,
    pub success_count: u64,
    pub success_ns: u64,
    pub queue_ns: u64,
    pub compute_infer_ns: u64,
}

impl ExecutionStats {
    /// Mean end-to-end latency of successful requests, in milliseconds.
    pub fn avg_latency_ms(&self) -> Option<f64> {
        if self.success_count == 0 {
            return None;
        }
        Some(self.success_ns as f64 / self.success_count as f64 / 1_000_000.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: Option<String>,
    pub state: ModelState,
    pub reason: Option<String>,
    pub stats: Option<ExecutionStats>,
    /// Raw configuration, truncated for display.
    pub config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceServerInfo {
    pub server_url: String,
    pub server_version: Option<String>,
    pub models: Vec<ModelInfo>,
}

impl InferenceServerInfo {
    pub fn ready_models(&self) -> usize {
        self.models
            .iter()
            .filter(|m| m.state == ModelState::Ready)
            .count()
    }
}
