//! YouTube Live Chat API types.

use crate::youtube_api::types::{PageInfo, deserialize_optional_u64, deserialize_u64};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Response structure for the `liveChatMessages.list` API call.
///
/// Items are kept as raw JSON and decoded one at a time with [`LiveChatMessage::from_value`],
/// so a single malformed message cannot poison the rest of the page.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveChatMessages/list>
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessageListResponse {
    /// Chat messages in the order the service returned them.
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    /// Cursor for the next poll. Absent when the service has nothing new to say about it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    /// How long to wait before polling again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_millis: Option<u64>,
    /// Set once the chat has gone offline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageInfo>,
}

/// A `liveChatMessage` resource represents a chat message in a YouTube live stream.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveChatMessages#resource>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessage {
    /// The ID that YouTube assigns to uniquely identify the message.
    pub id: String,
    pub snippet: LiveChatMessageSnippet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_details: Option<LiveChatMessageAuthor>,
}

impl LiveChatMessage {
    /// Decodes a single item of a [`LiveChatMessageListResponse`].
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// The snippet object contains basic details about the chat message.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveChatMessages#snippet>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessageSnippet {
    #[serde(default)]
    pub live_chat_id: String,
    /// The ID of the user that authored this message.
    #[serde(default)]
    pub author_channel_id: String,
    /// When the message was originally published.
    pub published_at: Timestamp,
    /// Contains a string that can be displayed to the user.
    ///
    /// If this field is not present, the message is being deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_message: Option<String>,
    /// Type-specific message details, selected by the `type` field.
    #[serde(flatten)]
    pub details: LiveChatMessageDetails,
}

/// Type-specific details for live chat messages.
///
/// Each variant corresponds to a message type and holds the detail object the service sends
/// alongside it. A known type whose detail object is missing fails to decode.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveChatMessages#snippet.type>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveChatMessageDetails {
    /// A regular chat message posted by a viewer.
    #[serde(rename = "textMessageEvent", rename_all = "camelCase")]
    TextMessage {
        text_message_details: TextMessageDetails,
    },
    /// A paid, highlighted text message.
    #[serde(rename = "superChatEvent", rename_all = "camelCase")]
    SuperChat {
        super_chat_details: SuperChatDetails,
    },
    /// A paid animated sticker.
    #[serde(rename = "superStickerEvent", rename_all = "camelCase")]
    SuperSticker {
        super_sticker_details: SuperStickerDetails,
    },
    /// A member celebrating a membership milestone (e.g. 6 months).
    #[serde(rename = "memberMilestoneChatEvent", rename_all = "camelCase")]
    MemberMilestone {
        member_milestone_chat_details: MemberMilestoneChatDetails,
    },
    /// A viewer purchased memberships for others.
    ///
    /// Each recipient gets a separate `giftMembershipReceivedEvent`.
    #[serde(rename = "membershipGiftingEvent", rename_all = "camelCase")]
    MembershipGifting {
        membership_gifting_details: MembershipGiftingDetails,
    },
    /// A viewer received a gifted membership.
    #[serde(rename = "giftMembershipReceivedEvent", rename_all = "camelCase")]
    GiftMembershipReceived {
        gift_membership_received_details: GiftMembershipReceivedDetails,
    },
    /// A moderator banned a user from the chat.
    #[serde(rename = "userBannedEvent", rename_all = "camelCase")]
    UserBanned {
        user_banned_details: UserBannedDetails,
    },
    /// The broadcaster ended the chat. No further messages will be posted.
    #[serde(rename = "chatEndedEvent")]
    ChatEnded,
    /// Any other message type (sponsor-only mode toggles, retractions, polls, ...).
    #[serde(other)]
    Unsupported,
}

impl fmt::Display for LiveChatMessageDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextMessage { .. } => write!(f, "textMessageEvent"),
            Self::SuperChat { .. } => write!(f, "superChatEvent"),
            Self::SuperSticker { .. } => write!(f, "superStickerEvent"),
            Self::MemberMilestone { .. } => write!(f, "memberMilestoneChatEvent"),
            Self::MembershipGifting { .. } => write!(f, "membershipGiftingEvent"),
            Self::GiftMembershipReceived { .. } => write!(f, "giftMembershipReceivedEvent"),
            Self::UserBanned { .. } => write!(f, "userBannedEvent"),
            Self::ChatEnded => write!(f, "chatEndedEvent"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Details about the author of a live chat message.
///
/// Every field is optional on the wire; system messages such as `chatEndedEvent` may carry
/// an empty author.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveChatMessages#authorDetails>
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveChatMessageAuthor {
    pub channel_id: String,
    pub channel_url: String,
    /// The display name of the channel at the time the message was sent.
    pub display_name: String,
    pub profile_image_url: String,
    pub is_verified: bool,
    /// Whether the author hosts the live stream.
    pub is_chat_owner: bool,
    /// Whether the author is a channel member.
    pub is_chat_sponsor: bool,
    pub is_chat_moderator: bool,
}

/// Details about a text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageDetails {
    /// The raw text content of the message as entered by the user.
    pub message_text: String,
}

/// Details about a Super Chat purchase.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveChatMessages#snippet.superChatDetails>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperChatDetails {
    /// A localized string like "$5.00", ready for display.
    #[serde(default)]
    pub amount_display_string: String,
    /// The purchase amount in millionths of the currency unit.
    ///
    /// The service sends this as a string; $1.75 is `"1750000"`.
    #[serde(deserialize_with = "deserialize_u64")]
    pub amount_micros: u64,
    /// ISO 4217 currency code.
    pub currency: String,
    #[serde(default)]
    pub tier: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_comment: Option<String>,
}

/// Details about a Super Sticker purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperStickerDetails {
    #[serde(default)]
    pub amount_display_string: String,
    #[serde(deserialize_with = "deserialize_u64")]
    pub amount_micros: u64,
    pub currency: String,
    #[serde(default)]
    pub tier: u32,
    pub super_sticker_metadata: SuperStickerMetadata,
}

/// Metadata about a Super Sticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperStickerMetadata {
    /// Identifies the sticker within YouTube's sticker catalog.
    pub sticker_id: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub language: String,
}

/// Details about a member milestone chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberMilestoneChatDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_comment: Option<String>,
    /// How many months the member has been subscribed. Zero for a brand new member.
    #[serde(default)]
    pub member_month: u32,
    /// The name of the membership level, e.g. "Member" or "VIP Member".
    pub member_level_name: String,
}

/// Details about a membership gifting event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipGiftingDetails {
    pub gift_memberships_count: u32,
    pub gift_memberships_level_name: String,
}

/// Details about receiving a membership gift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftMembershipReceivedDetails {
    pub member_level_name: String,
    /// The channel that paid for the gift.
    pub gifter_channel_id: String,
    /// Links back to the `membershipGiftingEvent` that announced the purchase.
    #[serde(default)]
    pub associated_membership_gifting_message_id: String,
}

/// Details about a user ban event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBannedDetails {
    pub banned_user_details: BannedUserDetails,
    /// `permanent` or `temporary`.
    pub ban_type: String,
    /// Only present for temporary bans.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ban_duration_seconds: Option<u64>,
}

/// Details about the banned user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BannedUserDetails {
    pub channel_id: String,
    pub channel_url: String,
    /// The display name of the banned user at the time of the ban.
    pub display_name: String,
    pub profile_image_url: String,
}

/// Request body for `liveChatMessages.insert`.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveChatMessages/insert>
#[derive(Debug, Clone, Serialize)]
pub struct LiveChatMessageInsert {
    pub snippet: LiveChatMessageInsertSnippet,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessageInsertSnippet {
    pub live_chat_id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text_message_details: TextMessageDetails,
}

impl LiveChatMessageInsert {
    /// A plain text message for the given chat.
    pub fn text(live_chat_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            snippet: LiveChatMessageInsertSnippet {
                live_chat_id: live_chat_id.into(),
                kind: "textMessageEvent",
                text_message_details: TextMessageDetails {
                    message_text: message.into(),
                },
            },
        }
    }
}
