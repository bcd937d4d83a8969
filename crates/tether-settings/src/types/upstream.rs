//! Orchestrator endpoint.

use serde::{Deserialize, Serialize};
use tether_core::constants::{DEFAULT_UPSTREAM_HOST, DEFAULT_UPSTREAM_PATH, DEFAULT_UPSTREAM_PORT};

/// Where the orchestrator's socket lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Orchestrator host. `HOST_IP` overrides it.
    pub host: String,
    /// Orchestrator port.
    pub port: u16,
    /// Socket path.
    pub path: String,
    /// `ws` or `wss`.
    pub scheme: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_UPSTREAM_HOST.to_string(),
            port: DEFAULT_UPSTREAM_PORT,
            path: DEFAULT_UPSTREAM_PATH.to_string(),
            scheme: "ws".to_string(),
        }
    }
}

impl UpstreamSettings {
    /// Full socket URL, e.g. `ws://localhost:3030/ws`.
    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url() {
        assert_eq!(UpstreamSettings::default().url(), "ws://localhost:3030/ws");
    }

    #[test]
    fn url_adds_leading_slash() {
        let upstream = UpstreamSettings {
            host: "10.0.0.5".into(),
            port: 4000,
            path: "agents".into(),
            scheme: "wss".into(),
        };
        assert_eq!(upstream.url(), "wss://10.0.0.5:4000/agents");
    }

    #[test]
    fn partial_json() {
        let upstream: UpstreamSettings = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(upstream.port, 9000);
        assert_eq!(upstream.host, "localhost");
        assert_eq!(upstream.path, "/ws");
    }
}
