//! Network layer configuration
//!
//! Passed explicitly to the resolver and connector; there is no process-wide
//! mutable default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default P2P port
pub const DEFAULT_PORT: u16 = 8333;

/// Default connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Network configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Upper bound on a single outbound connect
    pub connect_timeout_ms: u64,
    /// Allow DNS lookups; when false only numeric literals resolve
    pub allow_lookup: bool,
    /// Port used when a host spec carries none
    pub default_port: u16,
    /// Cap on resolved addresses per host (0 = unlimited)
    pub max_results: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            allow_lookup: true,
            default_port: DEFAULT_PORT,
            max_results: 0,
        }
    }
}

impl NetConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = fs::File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        log::debug!("Loaded network config from {:?}", path);
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[cfg(unix)]
    pub fn connect_options(&self) -> crate::network::connector::ConnectOptions {
        crate::network::connector::ConnectOptions::with_timeout(self.connect_timeout())
    }
}
