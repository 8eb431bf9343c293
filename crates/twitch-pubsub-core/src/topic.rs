//! Subscription topics.
//!
//! Topic format: `category.id[.id]`
//!
//! Recognized categories:
//! - `channel-bits-events-v2.<channel>` - Bits cheered in a channel
//! - `channel-bits-badge-unlocks.<channel>` - Bits badge tier unlocks
//! - `channel-subscribe-events-v1.<channel>` - Channel subscriptions
//! - `channel-commerce-events-v1.<channel>` - Commerce purchases
//! - `whispers.<user>` - Whispers to a user
//! - `chat_moderator_actions.<user>.<channel>` - Moderation actions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A topic the broker can push events for.
///
/// Topics are opaque on the wire; the category is derived on demand with
/// [`Topic::kind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Wrap an arbitrary topic string.
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    /// Bits events for a channel.
    pub fn bits(channel_id: u64) -> Self {
        Self::with_ids(TopicKind::Bits, &[channel_id])
    }

    /// Bits badge unlocks for a channel.
    pub fn bits_badge(channel_id: u64) -> Self {
        Self::with_ids(TopicKind::BitsBadge, &[channel_id])
    }

    /// Subscription events for a channel.
    pub fn subscriptions(channel_id: u64) -> Self {
        Self::with_ids(TopicKind::Subscriptions, &[channel_id])
    }

    /// Commerce purchases for a channel.
    pub fn commerce(channel_id: u64) -> Self {
        Self::with_ids(TopicKind::Commerce, &[channel_id])
    }

    /// Whispers received by a user.
    pub fn whispers(user_id: u64) -> Self {
        Self::with_ids(TopicKind::Whispers, &[user_id])
    }

    /// Moderation actions taken in `channel_id`, as seen by moderator `user_id`.
    pub fn moderation_action(user_id: u64, channel_id: u64) -> Self {
        Self::with_ids(TopicKind::ModerationAction, &[user_id, channel_id])
    }

    fn with_ids(kind: TopicKind, ids: &[u64]) -> Self {
        let mut topic = kind.token().to_string();
        for id in ids {
            topic.push('.');
            topic.push_str(&id.to_string());
        }
        Self(topic)
    }

    /// The raw topic string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The topic's category.
    pub fn kind(&self) -> TopicKind {
        TopicKind::classify(&self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    /// Parse a topic, rejecting strings whose category is not recognized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match TopicKind::classify(s) {
            TopicKind::Invalid => Err(TopicError::Unrecognized(s.to_string())),
            _ => Ok(Self(s.to_string())),
        }
    }
}

/// Topic category, determined by the text before the first `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Bits,
    BitsBadge,
    Subscriptions,
    Commerce,
    Whispers,
    ModerationAction,
    /// Unknown category, missing delimiter or empty topic.
    Invalid,
}

impl TopicKind {
    /// Every recognized category.
    pub const ALL: [TopicKind; 6] = [
        TopicKind::Bits,
        TopicKind::BitsBadge,
        TopicKind::Subscriptions,
        TopicKind::Commerce,
        TopicKind::Whispers,
        TopicKind::ModerationAction,
    ];

    /// Classify a topic string.
    pub fn classify(topic: &str) -> Self {
        let Some((token, _)) = topic.split_once('.') else {
            return TopicKind::Invalid;
        };
        Self::ALL
            .into_iter()
            .find(|kind| kind.token() == token)
            .unwrap_or(TopicKind::Invalid)
    }

    /// The category token used as the topic prefix.
    pub fn token(self) -> &'static str {
        match self {
            TopicKind::Bits => "channel-bits-events-v2",
            TopicKind::BitsBadge => "channel-bits-badge-unlocks",
            TopicKind::Subscriptions => "channel-subscribe-events-v1",
            TopicKind::Commerce => "channel-commerce-events-v1",
            TopicKind::Whispers => "whispers",
            TopicKind::ModerationAction => "chat_moderator_actions",
            TopicKind::Invalid => "invalid",
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for TopicKind {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.token() == s)
            .ok_or_else(|| TopicError::UnknownCategory(s.to_string()))
    }
}

/// Error parsing a topic or category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("unrecognized topic: {0:?}")]
    Unrecognized(String),
    #[error("unknown topic category: {0:?}")]
    UnknownCategory(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_categories() {
        let cases = [
            ("channel-bits-events-v2.46024993", TopicKind::Bits),
            ("channel-bits-badge-unlocks.44322889", TopicKind::BitsBadge),
            ("channel-subscribe-events-v1.44322889", TopicKind::Subscriptions),
            ("channel-commerce-events-v1.44322889", TopicKind::Commerce),
            ("whispers.44322889", TopicKind::Whispers),
            ("chat_moderator_actions.1.2", TopicKind::ModerationAction),
            ("chat_moderator_actions.test.test", TopicKind::ModerationAction),
        ];
        for (input, expected) in cases {
            assert_eq!(TopicKind::classify(input), expected, "{input}");
        }
    }

    #[test]
    fn classify_invalid() {
        assert_eq!(TopicKind::classify(""), TopicKind::Invalid);
        assert_eq!(TopicKind::classify("test"), TopicKind::Invalid);
        assert_eq!(TopicKind::classify("unknown-thing"), TopicKind::Invalid);
        assert_eq!(TopicKind::classify("video-playback.123"), TopicKind::Invalid);
        assert_eq!(TopicKind::classify(".123"), TopicKind::Invalid);
    }

    #[test]
    fn constructors_format_ids() {
        assert_eq!(Topic::bits(46024993).as_str(), "channel-bits-events-v2.46024993");
        assert_eq!(Topic::whispers(7).as_str(), "whispers.7");
        assert_eq!(
            Topic::moderation_action(1, 2).as_str(),
            "chat_moderator_actions.1.2"
        );
        assert_eq!(Topic::commerce(9).kind(), TopicKind::Commerce);
        assert_eq!(Topic::bits_badge(9).kind(), TopicKind::BitsBadge);
        assert_eq!(Topic::subscriptions(9).kind(), TopicKind::Subscriptions);
    }

    #[test]
    fn parse_rejects_unrecognized() {
        let topic: Topic = "whispers.1".parse().unwrap();
        assert_eq!(topic.kind(), TopicKind::Whispers);
        assert_eq!(
            "nope".parse::<Topic>(),
            Err(TopicError::Unrecognized("nope".into()))
        );
    }

    #[test]
    fn kind_from_token() {
        assert_eq!("whispers".parse::<TopicKind>().unwrap(), TopicKind::Whispers);
        assert!("invalid".parse::<TopicKind>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Topic::whispers(5)).unwrap();
        assert_eq!(json, "\"whispers.5\"");
    }
}
