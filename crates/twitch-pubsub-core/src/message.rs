//! Wire envelopes.
//!
//! Requests are sent as `{type, nonce?, data: {topics?, auth_token?}}`.
//! Everything the broker sends back shares one shape,
//! `{type, data: {topic, message}, nonce, error}`, with unused fields absent.

use crate::{Topic, TopicKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Request types a client can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestType {
    Listen,
    Unlisten,
    Ping,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Listen => "LISTEN",
            RequestType::Unlisten => "UNLISTEN",
            RequestType::Ping => "PING",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request frame sent from client to broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEnvelope {
    #[serde(rename = "type")]
    pub kind: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "RequestData::is_empty")]
    pub data: RequestData,
}

/// Request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Topic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl RequestData {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.auth_token.is_none()
    }
}

impl OutgoingEnvelope {
    /// Heartbeat probe. Carries no nonce and expects a `PONG`.
    pub fn ping() -> Self {
        Self {
            kind: RequestType::Ping,
            nonce: None,
            data: RequestData::default(),
        }
    }

    /// Start listening to `topics`.
    pub fn listen(topics: Vec<Topic>, auth_token: impl Into<String>) -> Self {
        Self::topics(RequestType::Listen, topics, auth_token.into())
    }

    /// Stop listening to `topics`.
    pub fn unlisten(topics: Vec<Topic>, auth_token: impl Into<String>) -> Self {
        Self::topics(RequestType::Unlisten, topics, auth_token.into())
    }

    fn topics(kind: RequestType, topics: Vec<Topic>, auth_token: String) -> Self {
        Self {
            kind,
            nonce: None,
            data: RequestData {
                topics,
                auth_token: (!auth_token.is_empty()).then_some(auth_token),
            },
        }
    }
}

/// Frames that steer the connection rather than carry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// Heartbeat acknowledgment.
    Pong,
    /// The broker is about to drop the connection; reconnect now.
    Reconnect,
}

impl ControlFrame {
    pub const PONG: &'static str = "PONG";
    pub const RECONNECT: &'static str = "RECONNECT";
}

/// A frame received from the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: MessageData,
    #[serde(default)]
    pub nonce: String,
    /// Empty on success.
    #[serde(default)]
    pub error: String,
}

/// Body of a data frame. `message` is itself a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub message: String,
}

impl IncomingEnvelope {
    /// Whether a response reports success.
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// The control meaning of this frame, decided by `type` alone.
    pub fn control(&self) -> Option<ControlFrame> {
        match self.kind.as_str() {
            ControlFrame::PONG => Some(ControlFrame::Pong),
            ControlFrame::RECONNECT => Some(ControlFrame::Reconnect),
            _ => None,
        }
    }

    /// Category of the frame's topic. `Invalid` when the frame has none.
    pub fn topic_kind(&self) -> TopicKind {
        TopicKind::classify(&self.data.topic)
    }

    /// Decode the embedded message document.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.data.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ping_has_only_type() {
        let value = serde_json::to_value(OutgoingEnvelope::ping()).unwrap();
        assert_eq!(value, json!({ "type": "PING" }));
    }

    #[test]
    fn listen_carries_topics_and_token() {
        let mut envelope = OutgoingEnvelope::listen(vec![Topic::whispers(1)], "secret");
        envelope.nonce = Some("n-1".into());
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "LISTEN",
                "nonce": "n-1",
                "data": { "topics": ["whispers.1"], "auth_token": "secret" }
            })
        );
    }

    #[test]
    fn empty_token_is_omitted() {
        let envelope = OutgoingEnvelope::unlisten(vec![Topic::bits(1)], "");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({ "type": "UNLISTEN", "data": { "topics": ["channel-bits-events-v2.1"] } })
        );
    }

    #[test]
    fn response_frame_defaults_missing_fields() {
        let envelope: IncomingEnvelope =
            serde_json::from_str(r#"{"type":"RESPONSE","nonce":"abc","error":""}"#).unwrap();
        assert_eq!(envelope.nonce, "abc");
        assert!(envelope.is_success());
        assert!(envelope.data.topic.is_empty());
        assert_eq!(envelope.control(), None);
        assert_eq!(envelope.topic_kind(), TopicKind::Invalid);
    }

    #[test]
    fn control_frames_by_type() {
        let pong: IncomingEnvelope = serde_json::from_str(r#"{"type":"PONG"}"#).unwrap();
        let reconnect: IncomingEnvelope =
            serde_json::from_str(r#"{"type":"RECONNECT"}"#).unwrap();
        assert_eq!(pong.control(), Some(ControlFrame::Pong));
        assert_eq!(reconnect.control(), Some(ControlFrame::Reconnect));
    }

    #[test]
    fn data_frame_decodes_embedded_message() {
        let envelope: IncomingEnvelope = serde_json::from_value(json!({
            "type": "MESSAGE",
            "data": {
                "topic": "whispers.44322889",
                "message": "{\"type\":\"thread\"}"
            }
        }))
        .unwrap();
        assert_eq!(envelope.topic_kind(), TopicKind::Whispers);
        let value: serde_json::Value = envelope.decode().unwrap();
        assert_eq!(value["type"], "thread");
    }
}
