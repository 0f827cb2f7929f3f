//! VerDB Server Configuration
//!
//! Binding, request limits, persistence and the core settings handed to
//! the registry and jobs managers.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use verdb_common::CoreConfig;

// =============================================================================
// Server Configuration
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    pub enable_cors: bool,
    /// Directory holding the engine snapshot. `None` keeps everything in memory.
    pub data_dir: Option<String>,
    /// Seconds between periodic snapshot saves.
    pub save_interval_secs: u64,
    pub core: CoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            body_limit_bytes: 10 * 1024 * 1024, // 10MB
            enable_cors: true,
            data_dir: None,
            save_interval_secs: 30,
            core: CoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new server config with the specified host and port.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], self.port)))
    }

    /// Set the data directory for persistence.
    pub fn with_data_dir(mut self, data_dir: Option<String>) -> Self {
        self.data_dir = data_dir;
        self
    }

    /// Set the core configuration.
    pub fn with_core(mut self, core: CoreConfig) -> Self {
        self.core = core;
        self
    }

    /// Set the request body limit.
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.enable_cors = enabled;
        self
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert!(config.data_dir.is_none());
        assert_eq!(config.core.meta_database, "verdb");
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig::new("0.0.0.0", 8080);
        let addr = config.socket_addr();
        assert_eq!(addr.port(), 8080);

        let fallback = ServerConfig::new("not a host", 9000).socket_addr();
        assert_eq!(fallback, SocketAddr::from(([127, 0, 0, 1], 9000)));
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::new("127.0.0.1", 1)
            .with_data_dir(Some("/tmp/verdb".into()))
            .with_core(CoreConfig::default().with_max_running_jobs(9))
            .with_cors(false);
        assert_eq!(config.data_dir.as_deref(), Some("/tmp/verdb"));
        assert_eq!(config.core.max_running_jobs, 9);
        assert!(!config.enable_cors);
    }
}
