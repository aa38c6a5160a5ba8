// KServe v2 HTTP client for Triton servers

use crate::error::ProbeError;
use crate::models::ExecutionStats;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// `GET /v2`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// One entry of `POST /v2/repository/index`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepositoryEntry {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    model_stats: Vec<ModelStatistics>,
}

#[derive(Debug, Deserialize)]
struct ModelStatistics {
    #[serde(default)]
    inference_count: u64,
    #[serde(default)]
    execution_count: u64,
    #[serde(default)]
    inference_stats: InferenceStatistics,
}

#[derive(Debug, Default, Deserialize)]
struct InferenceStatistics {
    #[serde(default)]
    success: StatDuration,
    #[serde(default)]
    queue: StatDuration,
    #[serde(default)]
    compute_infer: StatDuration,
}

#[derive(Debug, Default, Deserialize)]
struct StatDuration {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    ns: u64,
}

/// Parse a `/v2/models/{name}/stats` body. Only the first reported version is kept.
pub fn parse_stats(body: &str) -> Result<ExecutionStats, ProbeError> {
    let response: StatsResponse =
        serde_json::from_str(body).map_err(|e| ProbeError::Decode(e.to_string()))?;
    let stat = response
        .model_stats
        .into_iter()
        .next()
        .ok_or_else(|| ProbeError::Decode("empty model_stats".into()))?;
    Ok(ExecutionStats {
        inference_count: stat.inference_count,
        execution_count: stat.execution_count,
        success_count: stat.inference_stats.success.count,
        success_ns: stat.inference_stats.success.ns,
        queue_ns: stat.inference_stats.queue.ns,
        compute_infer_ns: stat.inference_stats.compute_infer.ns,
    })
}

/// Read-only view of an inference server. Every call targets the server at `base_url`.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn live(&self, base_url: &str) -> Result<(), ProbeError>;
    async fn server_metadata(&self, base_url: &str) -> Result<ServerMetadata, ProbeError>;
    async fn repository_index(&self, base_url: &str) -> Result<Vec<RepositoryEntry>, ProbeError>;
    async fn model_stats(&self, base_url: &str, model: &str) -> Result<ExecutionStats, ProbeError>;
    /// Raw configuration JSON, untruncated.
    async fn model_config(&self, base_url: &str, model: &str) -> Result<String, ProbeError>;
}

pub struct HttpTritonClient {
    client: Client,
}

impl HttpTritonClient {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Connect(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String, ProbeError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl InferenceClient for HttpTritonClient {
    async fn live(&self, base_url: &str) -> Result<(), ProbeError> {
        let url = format!("{}/v2/health/live", base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }
        debug!(url = %url, "inference server live");
        Ok(())
    }

    async fn server_metadata(&self, base_url: &str) -> Result<ServerMetadata, ProbeError> {
        let body = self.get_text(&format!("{}/v2", base_url)).await?;
        serde_json::from_str(&body).map_err(|e| ProbeError::Decode(e.to_string()))
    }

    async fn repository_index(&self, base_url: &str) -> Result<Vec<RepositoryEntry>, ProbeError> {
        let url = format!("{}/v2/repository/index", base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProbeError::Decode(e.to_string()))
    }

    async fn model_stats(&self, base_url: &str, model: &str) -> Result<ExecutionStats, ProbeError> {
        let body = self
            .get_text(&format!("{}/v2/models/{}/stats", base_url, model))
            .await?;
        parse_stats(&body)
    }

    async fn model_config(&self, base_url: &str, model: &str) -> Result<String, ProbeError> {
        self.get_text(&format!("{}/v2/models/{}/config", base_url, model))
            .await
    }
}
