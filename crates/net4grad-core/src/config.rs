//! Client configuration (`config.json` in the config directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::models::UserId;
use crate::reconnect::ReconnectPolicy;

const CONFIG_FILE: &str = "config.json";

/// Where the service lives and how the client talks to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API, without trailing slash.
    pub api_base_url: String,

    /// Base URL of the WebSocket endpoint, without trailing slash.
    pub ws_base_url: String,

    /// Upper bound for a single REST call.
    pub request_timeout_secs: u64,

    /// Number of messages requested when loading history.
    pub history_limit: u32,

    pub reconnect: ReconnectPolicy,

    /// Directory for per-connection frame logs. Disabled when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_base_url: "ws://localhost:8000".to_string(),
            request_timeout_secs: 30,
            history_limit: 100,
            reconnect: ReconnectPolicy::Never,
            log_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL for an API path such as `groups/`.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Socket URL for a viewer.
    pub fn ws_url(&self, viewer_id: &UserId) -> String {
        format!("{}/ws/{}", self.ws_base_url.trim_end_matches('/'), viewer_id)
    }
}

/// Load the config from `dir`, falling back to defaults when the file is absent.
pub fn load_config(dir: &Path) -> Result<ClientConfig, ChatError> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(ClientConfig::default());
    }

    let contents = fs::read_to_string(&path)
        .map_err(|e| ChatError::Config(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| ChatError::Config(format!("Invalid {}: {e}", path.display())))
}

/// Save the config to `dir` (write to temp file, then rename).
pub fn save_config(dir: &Path, config: &ClientConfig) -> Result<(), ChatError> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| ChatError::Config(format!("Failed to serialize config: {e}")))?;
    write_atomically(dir, CONFIG_FILE, &json)
}

pub(crate) fn write_atomically(dir: &Path, file_name: &str, contents: &str) -> Result<(), ChatError> {
    let io_err = |e: std::io::Error| ChatError::Config(format!("Failed to write {file_name}: {e}"));

    fs::create_dir_all(dir).map_err(io_err)?;
    let file_path = dir.join(file_name);
    let temp_path = dir.join(format!("{file_name}.tmp"));
    fs::write(&temp_path, contents).map_err(io_err)?;
    fs::rename(&temp_path, &file_path).map_err(io_err)?;
    Ok(())
}
