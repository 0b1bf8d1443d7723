use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5001";
pub const DEFAULT_STREAM: &str = "127.0.0.1:5002";

/// Connection settings shared by the roster fetch and the streaming channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub stream_addr: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER.to_string(),
            stream_addr: DEFAULT_STREAM.to_string(),
            request_timeout: Duration::from_secs(10),
            user_agent: format!("matchsim-cli/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn players_url(&self) -> String {
        format!("{}/api/players", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn players_url_tolerates_trailing_slash() {
        let cfg = ClientConfig {
            base_url: "http://sim.local:5001/".into(),
            ..ClientConfig::default()
        };
        assert_eq!(cfg.players_url(), "http://sim.local:5001/api/players");
    }

    #[test]
    fn timeout_serializes_human_readable() {
        let v = serde_json::to_value(ClientConfig::default()).unwrap();
        assert_eq!(v["request_timeout"], "10s");
    }
}
