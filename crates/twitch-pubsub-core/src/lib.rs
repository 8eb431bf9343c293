//! Core types for the Twitch PubSub protocol.
//!
//! This crate provides the protocol primitives: topics and their categories,
//! the request/response envelopes exchanged over the socket, and the typed
//! event payloads carried inside data frames. It performs no I/O.

mod events;
mod message;
mod topic;

pub use events::{
    BadgeEntitlement, BitsBadgeUnlock, BitsEvent, BitsEventData, CommerceEvent, Emote,
    ModerationAction, ModerationActionData, PurchaseMessage, SpamInfo, SubMessage,
    SubscriptionEvent, TopicPayload, WhisperEvent, WhisperThread,
};
pub use message::{
    ControlFrame, IncomingEnvelope, MessageData, OutgoingEnvelope, RequestData, RequestType,
};
pub use topic::{Topic, TopicError, TopicKind};

/// Default broker endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://pubsub-edge.twitch.tv";
