//! WebSocket server settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Network and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Route that accepts WebSocket upgrades.
    pub path: String,
    /// Hard ceiling on a connection's lifetime, in milliseconds.
    pub timeout_ms: u64,
    /// Request header carrying encoded connection parameters.
    pub params_header: String,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub max_send_queue: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/".to_string(),
            timeout_ms: 86_400_000,
            params_header: "x-tether-params".to_string(),
            max_send_queue: 1024,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    /// Connection lifetime ceiling.
    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if let Some(segment) = self.path.split('/').find(|seg| !is_literal_segment(seg)) {
            return Err(SettingsError::InvalidValue(format!(
                "path segment must be literal, got '{segment}' in {}",
                self.path
            )));
        }
        if self.path == "/health" {
            return Err(SettingsError::InvalidValue(
                "path conflicts with the health route".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(SettingsError::InvalidValue("timeoutMs must be positive".into()));
        }
        if self.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue("maxSendQueue must be positive".into()));
        }
        if self.params_header.is_empty() {
            return Err(SettingsError::InvalidValue("paramsHeader must not be empty".into()));
        }
        Ok(())
    }
}

/// Router captures (`:x`, `*x`, `{x}`) are not allowed in the upgrade path.
fn is_literal_segment(segment: &str) -> bool {
    !(segment.starts_with(':') || segment.starts_with('*') || segment.contains(['{', '}']))
}
