//! Events delivered from a live chat, and the actions a bot can take in it.

use crate::error::Error;
use crate::youtube_api::LiveChatMessageAuthor;
use jiff::Timestamp;
use std::fmt;
use std::time::Duration;

/// Who sent a chat event. Fields the service left empty are `None`/`false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorDetails {
    pub channel_id: Option<String>,
    pub channel_url: Option<String>,
    pub display_name: Option<String>,
    pub is_chat_moderator: bool,
    pub is_chat_owner: bool,
    pub is_chat_sponsor: bool,
    pub is_verified: bool,
    pub profile_image_url: Option<String>,
}

impl From<&LiveChatMessageAuthor> for AuthorDetails {
    fn from(author: &LiveChatMessageAuthor) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            channel_id: non_empty(&author.channel_id),
            channel_url: non_empty(&author.channel_url),
            display_name: non_empty(&author.display_name),
            is_chat_moderator: author.is_chat_moderator,
            is_chat_owner: author.is_chat_owner,
            is_chat_sponsor: author.is_chat_sponsor,
            is_verified: author.is_verified,
            profile_image_url: non_empty(&author.profile_image_url),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub message: String,
    pub display_name: String,
    pub author: AuthorDetails,
    pub timestamp: Timestamp,
    /// Cursor of the page this message arrived on.
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperChat {
    /// The text the viewer attached, if any.
    pub message: Option<String>,
    /// Amount paid in `currency` units, e.g. `2.5` for $2.50.
    pub amount: f64,
    pub currency: String,
    pub display_name: String,
    pub author: AuthorDetails,
    pub timestamp: Timestamp,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperSticker {
    pub sticker_id: String,
    pub amount: f64,
    pub currency: String,
    pub display_name: String,
    pub author: AuthorDetails,
    pub timestamp: Timestamp,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberMilestone {
    pub display_name: String,
    pub author: AuthorDetails,
    /// Membership level name, lower-cased.
    pub level: String,
    /// Zero for a member who just joined.
    pub months: u32,
    pub timestamp: Timestamp,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembershipGift {
    pub display_name: String,
    pub author: AuthorDetails,
    /// How many memberships were gifted.
    pub total: u32,
    pub tier: String,
    pub timestamp: Timestamp,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembershipGiftReceived {
    /// Ready-made text such as "Ferris received a gift membership by Crab".
    pub display_text: String,
    pub level: String,
    pub gifter_id: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanType {
    Permanent,
    Temporary,
    Unknown,
}

impl BanType {
    pub(crate) fn from_provider(ban_type: &str) -> Self {
        if ban_type.eq_ignore_ascii_case("permanent") {
            Self::Permanent
        } else if ban_type.eq_ignore_ascii_case("temporary") {
            Self::Temporary
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserBanned {
    pub banned_user_id: String,
    pub banned_user_display_name: String,
    pub ban_type: BanType,
    /// Only set for temporary bans.
    pub duration: Option<Duration>,
    pub moderator_id: String,
    pub moderator_display_name: String,
    pub timestamp: Timestamp,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEnded {
    pub timestamp: Timestamp,
    pub next_page_token: Option<String>,
}

/// Something went wrong while the session was attached.
///
/// Errors the service reported in its structured format show up as [`Error::Api`].
#[derive(Debug)]
pub struct ErrorEvent {
    pub timestamp: Timestamp,
    pub error: Error,
}

impl ErrorEvent {
    pub(crate) fn now(error: impl Into<Error>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            error: error.into(),
        }
    }
}

/// Everything an attached session can report.
#[derive(Debug)]
pub enum LiveEvent {
    ChatMessage(ChatMessage),
    SuperChat(SuperChat),
    SuperSticker(SuperSticker),
    MemberMilestone(MemberMilestone),
    MembershipGift(MembershipGift),
    MembershipGiftReceived(MembershipGiftReceived),
    UserBanned(UserBanned),
    /// The chat is over. Nothing follows this event.
    ChatEnded(ChatEnded),
    StreamEnd,
    Error(ErrorEvent),
}

impl LiveEvent {
    /// A stable identifier derived from the event's kind, actor and time.
    ///
    /// Meant for de-duplication and logging; two events from the same actor in the same
    /// instant share an ID.
    pub fn id(&self) -> String {
        match self {
            Self::ChatMessage(e) => format!("chat-{}-{}", e.display_name, e.timestamp.as_nanosecond()),
            Self::SuperChat(e) => {
                format!("superchat-{}-{}", e.display_name, e.timestamp.as_nanosecond())
            }
            Self::SuperSticker(e) => {
                format!("sticker-{}-{}", e.display_name, e.timestamp.as_nanosecond())
            }
            Self::MemberMilestone(e) => {
                format!("join-{}-{}", e.display_name, e.timestamp.as_nanosecond())
            }
            Self::MembershipGift(e) => format!("gift-{}-{}", e.display_name, e.timestamp.as_nanosecond()),
            Self::MembershipGiftReceived(e) => {
                format!("giftreceived-{}-{}", e.gifter_id, e.timestamp.as_second())
            }
            Self::UserBanned(e) => format!(
                "ban-{}-{}-{}",
                e.moderator_id,
                e.banned_user_id,
                e.timestamp.as_second()
            ),
            Self::ChatEnded(e) => format!("end-{}", e.timestamp.as_nanosecond()),
            Self::StreamEnd => "stream-end".to_string(),
            Self::Error(e) => format!("error-{}", e.timestamp.as_second()),
        }
    }

    pub fn is_chat_ended(&self) -> bool {
        matches!(self, Self::ChatEnded(_))
    }
}

/// Actions a caller can take in an attached chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Post a text message as the authenticated user.
    SendMessage { message: String },
    /// Remove a message. Needs moderator or owner rights.
    DeleteMessage { message_id: String },
}

impl BotCommand {
    pub fn send(message: impl Into<String>) -> Self {
        Self::SendMessage {
            message: message.into(),
        }
    }

    pub fn delete(message_id: impl Into<String>) -> Self {
        Self::DeleteMessage {
            message_id: message_id.into(),
        }
    }
}
