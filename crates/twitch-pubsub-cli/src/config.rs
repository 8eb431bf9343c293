//! Listener configuration: an optional TOML file plus command-line overrides.
//!
//! ```toml
//! topics = ["channel-bits-events-v2.46024993", "whispers.44322889"]
//!
//! [client]
//! endpoint = "wss://pubsub-edge.twitch.tv"
//! auth_token = "..."
//!
//! [client.heartbeat]
//! ping_every = 60
//! ```

use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;
use twitch_pubsub_client::ClientConfig;
use twitch_pubsub_core::Topic;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub topics: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply command-line values on top of the file.
    ///
    /// Topics given on the command line are added to the file's list.
    pub fn apply(&mut self, token: Option<String>, endpoint: Option<String>, topics: Vec<String>) {
        if let Some(token) = token {
            self.client.auth_token = token;
        }
        if let Some(endpoint) = endpoint {
            self.client.endpoint = endpoint;
        }
        for topic in topics {
            if !self.topics.contains(&topic) {
                self.topics.push(topic);
            }
        }
    }

    /// Parse the topic list, rejecting unrecognized categories.
    pub fn topics(&self) -> anyhow::Result<Vec<Topic>> {
        self.topics
            .iter()
            .map(|t| t.parse::<Topic>().map_err(anyhow::Error::from))
            .collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client.auth_token.is_empty() {
            bail!("no auth token; pass --token or set TWITCH_PUBSUB_TOKEN");
        }
        self.topics()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twitch_pubsub_core::DEFAULT_ENDPOINT;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.client.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.client.heartbeat.ping_every, 60);
        assert!(config.topics.is_empty());
    }

    #[test]
    fn file_values_are_read() {
        let config = Config::parse(
            r#"
            topics = ["whispers.1"]

            [client]
            endpoint = "wss://localhost:9000"
            auth_token = "secret"

            [client.heartbeat]
            check_every = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.client.endpoint, "wss://localhost:9000");
        assert_eq!(config.client.auth_token, "secret");
        assert_eq!(config.client.heartbeat.check_every, 5);
        assert_eq!(config.client.heartbeat.ping_timeout, 120);
        assert_eq!(config.topics().unwrap(), vec![Topic::whispers(1)]);
    }

    #[test]
    fn command_line_overrides_file() {
        let mut config = Config::parse(
            r#"
            topics = ["whispers.1"]
            [client]
            auth_token = "from-file"
            "#,
        )
        .unwrap();
        config.apply(
            Some("from-flag".into()),
            None,
            vec!["whispers.1".into(), "channel-bits-events-v2.2".into()],
        );
        assert_eq!(config.client.auth_token, "from-flag");
        assert_eq!(config.client.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.topics().unwrap(), vec![Topic::whispers(1), Topic::bits(2)]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_token_is_rejected() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let mut config = Config::default();
        config.apply(Some("t".into()), None, vec!["video-playback.1".into()]);
        assert!(config.validate().is_err());
    }
}
