//! Client configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use twitch_pubsub_core::DEFAULT_ENDPOINT;

/// Connection settings for a [`Client`](crate::Client).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the broker.
    pub endpoint: String,
    /// OAuth token sent with every LISTEN/UNLISTEN.
    #[serde(skip_serializing)]
    pub auth_token: String,
    pub heartbeat: HeartbeatPolicy,
}

impl ClientConfig {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatPolicy) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth_token: String::new(),
            heartbeat: HeartbeatPolicy::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"<redacted>")
            .field("heartbeat", &self.heartbeat)
            .finish()
    }
}

/// Heartbeat cadence and staleness thresholds.
///
/// All periods are in clock seconds. Pings and checks fire when the clock is
/// a multiple of their period, so every client pings on the same wall-clock
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatPolicy {
    pub ping_every: i64,
    pub check_every: i64,
    /// The connection is dead once the last successful ping is older than this.
    pub ping_timeout: i64,
    /// The connection is half-open once a ping stays unanswered longer than this.
    pub pong_grace: i64,
    pub poll_interval_ms: u64,
}

impl HeartbeatPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self {
            ping_every: 60,
            check_every: 10,
            ping_timeout: 120,
            pong_grace: 20,
            poll_interval_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("token");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.heartbeat.ping_every, 60);
        assert_eq!(config.heartbeat.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", ClientConfig::new("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"endpoint":"ws://localhost:9","heartbeat":{"pong_grace":5}}"#)
                .unwrap();
        assert_eq!(config.endpoint, "ws://localhost:9");
        assert_eq!(config.heartbeat.pong_grace, 5);
        assert_eq!(config.heartbeat.ping_timeout, 120);
    }

    #[test]
    fn token_is_never_serialized() {
        let json = serde_json::to_string(&ClientConfig::new("hunter2")).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
