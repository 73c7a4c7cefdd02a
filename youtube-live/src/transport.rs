//! What the broadcast lookup and the chat engine need from the Data API.
//!
//! [`YouTubeClient`] implements both traits; tests substitute scripted in-memory versions.

use crate::youtube_api::{
    ChannelListResponse, LiveChatMessageListResponse, PlaylistItemListResponse,
    SearchListResponse, VideoListResponse, YouTubeClient,
};
use std::future::Future;

/// Read-only queries used to find a channel's live broadcast and its chat.
pub trait BroadcastQuery: Send + Sync + 'static {
    fn channels_by_handle(
        &self,
        handle: &str,
    ) -> impl Future<Output = eyre::Result<ChannelListResponse>> + Send;

    /// Must include `contentDetails` so the uploads playlist is known.
    fn channels_by_id(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = eyre::Result<ChannelListResponse>> + Send;

    fn playlist_items(
        &self,
        playlist_id: &str,
        max_results: u32,
    ) -> impl Future<Output = eyre::Result<PlaylistItemListResponse>> + Send;

    /// Must include `liveStreamingDetails`.
    fn videos(
        &self,
        video_ids: &[String],
    ) -> impl Future<Output = eyre::Result<VideoListResponse>> + Send;

    /// Videos of `channel_id` that are live right now.
    fn search_live(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = eyre::Result<SearchListResponse>> + Send;
}

/// Reading and writing a live chat.
///
/// Failures the service reports in its structured error format should carry an
/// [`ApiError`](crate::youtube_api::ApiError) so the poller can recognize them as final.
pub trait ChatTransport: Send + Sync + 'static {
    fn list_messages(
        &self,
        live_chat_id: &str,
        page_token: Option<&str>,
    ) -> impl Future<Output = eyre::Result<LiveChatMessageListResponse>> + Send;

    fn insert_message(
        &self,
        live_chat_id: &str,
        message: &str,
    ) -> impl Future<Output = eyre::Result<()>> + Send;

    fn delete_message(&self, message_id: &str) -> impl Future<Output = eyre::Result<()>> + Send;
}

impl BroadcastQuery for YouTubeClient {
    fn channels_by_handle(
        &self,
        handle: &str,
    ) -> impl Future<Output = eyre::Result<ChannelListResponse>> + Send {
        self.list_channels_by_handle(handle)
    }

    fn channels_by_id(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = eyre::Result<ChannelListResponse>> + Send {
        self.list_channels_by_id(channel_id)
    }

    fn playlist_items(
        &self,
        playlist_id: &str,
        max_results: u32,
    ) -> impl Future<Output = eyre::Result<PlaylistItemListResponse>> + Send {
        self.list_playlist_items(playlist_id, max_results)
    }

    fn videos(
        &self,
        video_ids: &[String],
    ) -> impl Future<Output = eyre::Result<VideoListResponse>> + Send {
        self.list_videos(video_ids)
    }

    fn search_live(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = eyre::Result<SearchListResponse>> + Send {
        self.search_live_videos(channel_id)
    }
}

impl ChatTransport for YouTubeClient {
    fn list_messages(
        &self,
        live_chat_id: &str,
        page_token: Option<&str>,
    ) -> impl Future<Output = eyre::Result<LiveChatMessageListResponse>> + Send {
        self.list_live_chat_messages(live_chat_id, page_token)
    }

    async fn insert_message(&self, live_chat_id: &str, message: &str) -> eyre::Result<()> {
        self.insert_live_chat_message(live_chat_id, message).await?;
        Ok(())
    }

    fn delete_message(&self, message_id: &str) -> impl Future<Output = eyre::Result<()>> + Send {
        self.delete_live_chat_message(message_id)
    }
}
