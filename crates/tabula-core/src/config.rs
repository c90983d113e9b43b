//! Flight configuration
//!
//! Shared by the server (bind address, request limits) and the client
//! (endpoint URL, connect timeout).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Configuration for an Arrow Flight server or client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    /// Host to bind to (server) or connect to (client)
    pub host: String,
    /// Port to listen on; 0 asks the OS for an ephemeral port
    pub port: u16,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Client connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Maximum concurrent HTTP/2 streams per connection
    pub max_concurrent_streams: Option<u32>,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
            timeout_secs: 30,
            connect_timeout_secs: 5,
            max_concurrent_streams: None,
        }
    }
}

impl FlightConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for local development
    pub fn local(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        }
    }

    /// Loopback config on an OS-assigned port
    pub fn ephemeral() -> Self {
        Self::local(0)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_concurrent_streams(mut self, max: u32) -> Self {
        self.max_concurrent_streams = Some(max);
        self
    }

    /// Get the address string (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the full URL
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FlightConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
