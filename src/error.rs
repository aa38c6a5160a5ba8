// Component error types. Everything below the tick driver recovers these at
// the component boundary; only DeviceError::Init can reach process exit.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("NVML unavailable: {0}")]
    Init(String),
    #[error("device {index} query failed: {reason}")]
    Query { index: u32, reason: String },
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("container runtime unreachable: {0}")]
    Unreachable(String),
    #[error("container runtime query failed: {0}")]
    Query(String),
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("could not find server URL")]
    NoServer,
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProbeError::Timeout
        } else if e.is_decode() {
            ProbeError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ProbeError::Status(status.as_u16())
        } else {
            ProbeError::Connect(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum DetailError {
    #[error("Process {0} not found")]
    ProcessGone(u32),
    #[error("Access denied for process {0}")]
    AccessDenied(u32),
    #[error("Timed out fetching details")]
    TimedOut,
    #[error("Request cancelled")]
    Cancelled,
    #[error("Inference server: {0}")]
    Probe(#[from] ProbeError),
    #[error("{0}")]
    Io(String),
}
