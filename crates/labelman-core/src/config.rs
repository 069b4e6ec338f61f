//! Client configuration: YAML file, then environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const ENV_API_URL: &str = "LABELMAN_API_URL";
pub const ENV_TOKEN: &str = "LABELMAN_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the labeling API (e.g. "https://labels.example.com/api")
    pub base_url: String,
    /// Bearer credential issued by the session service
    pub token: Option<String>,
    /// Columns in the gallery grid (default: 4)
    pub column_count: usize,
    /// Delay before a closed training dialog resets its session (default: 300)
    pub close_grace_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            token: None,
            column_count: 4,
            close_grace_ms: 300,
        }
    }
}

impl ClientConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Applies `LABELMAN_API_URL` / `LABELMAN_TOKEN` when set and non-empty.
    pub fn with_env(mut self) -> Self {
        if let Some(url) = non_empty_env(ENV_API_URL) {
            self.base_url = url;
        }
        if let Some(token) = non_empty_env(ENV_TOKEN) {
            self.token = Some(token);
        }
        self
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
