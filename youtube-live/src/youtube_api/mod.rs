//! YouTube Data API v3 client library.
//!
//! Only the slice of the API needed to find a channel's live broadcast and take part in its
//! chat is covered:
//!
//! - [`channels`]: resolve `@handles` and find a channel's uploads playlist.
//! - [`playlists`]: list a channel's most recent uploads.
//! - [`videos`]: check whether a video is live and which chat belongs to it.
//! - [`search`]: fall back to searching a channel for live videos.
//! - [`chat`]: read, post, and delete live chat messages.
//!
//! All calls go through [`YouTubeClient`], which authenticates each request. A request the
//! service refuses fails with an [`ApiError`] inside the returned [`eyre::Report`]:
//!
//! ```rust,no_run
//! # async fn example(client: youtube_live::youtube_api::YouTubeClient) -> eyre::Result<()> {
//! use youtube_live::youtube_api::ApiError;
//!
//! match client.list_live_chat_messages("some-chat-id", None).await {
//!     Ok(page) => println!("{} new messages", page.items.len()),
//!     Err(e) if e.downcast_ref::<ApiError>().is_some() => println!("chat is gone: {e}"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod chat;
pub mod client;
pub mod playlists;
pub mod search;
pub mod types;
pub mod videos;

pub use client::YouTubeClient;
pub use types::{ApiError, ApiErrorItem, PageInfo};

pub use chat::{
    BannedUserDetails, GiftMembershipReceivedDetails, LiveChatMessage, LiveChatMessageAuthor,
    LiveChatMessageDetails, LiveChatMessageListResponse, LiveChatMessageSnippet,
    MemberMilestoneChatDetails, MembershipGiftingDetails, SuperChatDetails, SuperStickerDetails,
    SuperStickerMetadata, TextMessageDetails, UserBannedDetails,
};

pub use channels::{Channel, ChannelListResponse};
pub use playlists::{PlaylistItem, PlaylistItemListResponse};
pub use search::{SearchListResponse, SearchResult};
pub use videos::{LiveStreamingDetails, Video, VideoListResponse};
