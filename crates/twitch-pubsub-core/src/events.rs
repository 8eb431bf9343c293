//! Typed event payloads.
//!
//! Each record is decoded from the `message` document of a data frame whose
//! topic belongs to the record's category. Fields missing from the document
//! take their default value; a document that is not valid JSON for the
//! record fails to decode.

use crate::TopicKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A payload bound to exactly one topic category.
pub trait TopicPayload: DeserializeOwned + Send + 'static {
    const KIND: TopicKind;
}

/// Bits cheered in a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitsEvent {
    pub data: BitsEventData,
    pub version: String,
    pub message_type: String,
    pub message_id: String,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitsEventData {
    pub user_name: String,
    pub channel_name: String,
    pub user_id: String,
    pub channel_id: String,
    /// RFC 3339 timestamp.
    pub time: String,
    pub chat_message: String,
    pub bits_used: u64,
    pub total_bits_used: u64,
    pub context: String,
    pub badge_entitlement: Option<BadgeEntitlement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeEntitlement {
    pub new_version: u64,
    pub previous_version: u64,
}

impl TopicPayload for BitsEvent {
    const KIND: TopicKind = TopicKind::Bits;
}

/// A viewer unlocked a new bits badge tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitsBadgeUnlock {
    pub user_id: String,
    pub user_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub badge_tier: u64,
    pub chat_message: String,
    pub time: String,
}

impl TopicPayload for BitsBadgeUnlock {
    const KIND: TopicKind = TopicKind::BitsBadge;
}

/// A subscription, resubscription or gifted subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionEvent {
    pub user_name: String,
    pub display_name: String,
    pub channel_name: String,
    pub user_id: String,
    pub channel_id: String,
    pub time: String,
    pub sub_plan: String,
    pub sub_plan_name: String,
    pub months: u32,
    pub context: String,
    pub sub_message: SubMessage,
    pub recipient_id: String,
    pub recipient_user_name: String,
    pub recipient_display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubMessage {
    pub message: String,
    pub emotes: serde_json::Value,
}

impl TopicPayload for SubscriptionEvent {
    const KIND: TopicKind = TopicKind::Subscriptions;
}

/// A purchase that supports the channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommerceEvent {
    pub user_name: String,
    pub display_name: String,
    pub channel_name: String,
    pub user_id: String,
    pub channel_id: String,
    pub time: String,
    pub item_image_url: String,
    pub item_description: String,
    pub supports_channel: bool,
    pub purchase_message: PurchaseMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseMessage {
    pub message: String,
    pub emotes: Vec<Emote>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Emote {
    pub start: u32,
    pub end: u32,
    pub id: u64,
}

impl TopicPayload for CommerceEvent {
    const KIND: TopicKind = TopicKind::Commerce;
}

/// A whisper thread update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data_object: WhisperThread,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperThread {
    pub id: String,
    pub last_read: u64,
    pub archived: bool,
    pub muted: bool,
    pub spam_info: SpamInfo,
    pub whitelisted_until: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamInfo {
    pub likelihood: String,
    pub last_marked_not_spam: u64,
}

impl TopicPayload for WhisperEvent {
    const KIND: TopicKind = TopicKind::Whispers;
}

/// A moderator action in a channel (ban, timeout, delete, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationAction {
    pub data: ModerationActionData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationActionData {
    #[serde(rename = "type")]
    pub kind: String,
    pub moderation_action: String,
    pub args: Vec<String>,
    pub created_by: String,
    pub created_by_user_id: String,
    pub msg_id: String,
    pub target_user_id: String,
    pub target_user_login: String,
}

impl TopicPayload for ModerationAction {
    const KIND: TopicKind = TopicKind::ModerationAction;
}
