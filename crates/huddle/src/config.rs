//! Server-level configuration.

use huddle_hub::ClientConfig;
use serde::{Deserialize, Serialize};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default path prefix; clients connect to `{prefix}/{room}`.
pub const DEFAULT_PATH_PREFIX: &str = "/ws";

/// Configuration for a [`ChatServer`](crate::ChatServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Path prefix in front of the room segment.
    pub path_prefix: String,
    /// Per-connection settings applied to every accepted client.
    pub client: ClientConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            client: ClientConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Normalizes the prefix to a leading slash and no trailing slash,
    /// and clamps the client settings.
    pub fn validated(mut self) -> Self {
        let trimmed = self.path_prefix.trim_matches('/');
        self.path_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self.client = self.client.validated();
        self
    }
}
