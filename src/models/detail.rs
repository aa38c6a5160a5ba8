// On-demand process detail models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFile {
    pub fd: u32,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// "tcp" or "tcp6".
    pub kind: String,
    pub local: String,
    pub remote: String,
    pub state: String,
}

/// Point-in-time view of one process. Built per request, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDetail {
    pub pid: u32,
    pub exe: String,
    pub cwd: String,
    pub status: String,
    /// First entries of the environment, in OS order.
    pub env: Vec<(String, String)>,
    /// Total number of environment entries before truncation.
    pub env_total: usize,
    pub open_files: Vec<OpenFile>,
    pub connections: Vec<Connection>,
}

impl ProcessDetail {
    pub fn env_hidden(&self) -> usize {
        self.env_total.saturating_sub(self.env.len())
    }
}

/// Caps applied when building a [`ProcessDetail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailLimits {
    pub env: usize,
    pub open_files: usize,
    pub connections: usize,
}

impl Default for DetailLimits {
    fn default() -> Self {
        Self {
            env: 20,
            open_files: 10,
            connections: 5,
        }
    }
}
