//! Authenticated access to the YouTube Data API v3.

use crate::oauth::TokenSource;
use crate::youtube_api::{
    ApiError,
    channels::ChannelListResponse,
    chat::{LiveChatMessage, LiveChatMessageInsert, LiveChatMessageListResponse},
    playlists::PlaylistItemListResponse,
    search::SearchListResponse,
    videos::VideoListResponse,
};
use eyre::Context;
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::instrument;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Client for interacting with the YouTube Data API v3.
///
/// Every request asks the shared [`TokenSource`] for an access token first, so the first call
/// of a session may block on a token refresh or even the browser authorization flow.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    tokens: Arc<TokenSource>,
    client: reqwest::Client,
    api_base: String,
}

impl YouTubeClient {
    pub(crate) fn new(tokens: Arc<TokenSource>, client: reqwest::Client) -> Self {
        Self {
            tokens,
            client,
            api_base: API_BASE.to_string(),
        }
    }

    /// Sends requests somewhere other than `https://www.googleapis.com/youtube/v3`.
    pub(crate) fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Makes an authenticated HTTP request to the YouTube API with common error handling.
    ///
    /// Failed requests whose body is a Google error envelope come back as an [`ApiError`]
    /// inside the report, so callers can tell a refusal by the service apart from transport
    /// trouble by downcasting.
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        path: &str,
        query_params: &[(&str, &str)],
        json_body: Option<&(impl Serialize + Sync)>,
    ) -> eyre::Result<reqwest::Response> {
        let token = self.tokens.token().await.context("get access token")?;
        let url = format!("{}/{}", self.api_base, path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&token.access_token)
            .query(query_params);
        if let Some(body) = json_body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("send {method} request to YouTube API: {url}"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        match ApiError::from_response_body(status.as_u16(), &error_text) {
            Some(api_error) => {
                tracing::debug!(%status, reason = api_error.reason(), "YouTube API refused request");
                Err(eyre::Report::new(api_error))
            }
            None => Err(eyre::eyre!(
                "YouTube API {} request failed with status {}: {}",
                method,
                status,
                error_text
            )),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query_params: &[(&str, &str)],
    ) -> eyre::Result<T> {
        self.make_authenticated_request(Method::GET, path, query_params, None::<&()>)
            .await?
            .json()
            .await
            .with_context(|| format!("parse YouTube {path} API response as JSON"))
    }

    /// Looks up channels by `@handle`.
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self))]
    pub async fn list_channels_by_handle(&self, handle: &str) -> eyre::Result<ChannelListResponse> {
        let channels: ChannelListResponse = self
            .get_json("channels", &[("part", "id,snippet"), ("forHandle", handle)])
            .await?;
        tracing::debug!(handle, returned_items = channels.items.len(), "fetched channels by handle");
        Ok(channels)
    }

    /// Looks up a channel by ID, including its related playlists.
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self))]
    pub async fn list_channels_by_id(&self, channel_id: &str) -> eyre::Result<ChannelListResponse> {
        let channels: ChannelListResponse = self
            .get_json("channels", &[("part", "id,contentDetails"), ("id", channel_id)])
            .await?;
        tracing::debug!(channel_id, returned_items = channels.items.len(), "fetched channel");
        Ok(channels)
    }

    /// Lists the most recent entries of a playlist.
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/list>
    #[instrument(skip(self))]
    pub async fn list_playlist_items(
        &self,
        playlist_id: &str,
        max_results: u32,
    ) -> eyre::Result<PlaylistItemListResponse> {
        let max_results = max_results.clamp(1, 50).to_string();
        let items: PlaylistItemListResponse = self
            .get_json(
                "playlistItems",
                &[
                    ("part", "contentDetails"),
                    ("playlistId", playlist_id),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;
        tracing::debug!(
            playlist_id,
            returned_items = items.items.len(),
            total_results = items.page_info.as_ref().map(|p| p.total_results),
            "fetched playlist items"
        );
        Ok(items)
    }

    /// Fetches the live streaming details of up to 50 videos.
    ///
    /// <https://developers.google.com/youtube/v3/docs/videos/list>
    #[instrument(skip(self))]
    pub async fn list_videos(&self, video_ids: &[String]) -> eyre::Result<VideoListResponse> {
        let ids = video_ids.join(",");
        let videos: VideoListResponse = self
            .get_json("videos", &[("part", "id,liveStreamingDetails"), ("id", ids.as_str())])
            .await?;
        tracing::debug!(
            requested = video_ids.len(),
            returned_items = videos.items.len(),
            "fetched video details"
        );
        Ok(videos)
    }

    /// Searches a channel for videos that are live right now.
    ///
    /// <https://developers.google.com/youtube/v3/docs/search/list>
    #[instrument(skip(self))]
    pub async fn search_live_videos(&self, channel_id: &str) -> eyre::Result<SearchListResponse> {
        let results: SearchListResponse = self
            .get_json(
                "search",
                &[
                    ("part", "id"),
                    ("channelId", channel_id),
                    ("eventType", "live"),
                    ("type", "video"),
                ],
            )
            .await?;
        tracing::debug!(channel_id, returned_items = results.items.len(), "searched for live videos");
        Ok(results)
    }

    /// Fetches one page of chat messages.
    ///
    /// Pass the `next_page_token` of the previous page to only get messages posted since.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveChatMessages/list>
    #[instrument(skip(self), level = tracing::Level::DEBUG)]
    pub async fn list_live_chat_messages(
        &self,
        live_chat_id: &str,
        page_token: Option<&str>,
    ) -> eyre::Result<LiveChatMessageListResponse> {
        let mut query_params = vec![
            ("part", "id,snippet,authorDetails"),
            ("liveChatId", live_chat_id),
        ];
        if let Some(token) = page_token {
            query_params.push(("pageToken", token));
        }

        let page: LiveChatMessageListResponse =
            self.get_json("liveChat/messages", &query_params).await?;
        tracing::trace!(
            live_chat_id,
            new_message_count = page.items.len(),
            polling_interval_millis = page.polling_interval_millis,
            "received live chat page"
        );
        Ok(page)
    }

    /// Posts a text message to a live chat.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveChatMessages/insert>
    #[instrument(skip(self))]
    pub async fn insert_live_chat_message(
        &self,
        live_chat_id: &str,
        message: &str,
    ) -> eyre::Result<LiveChatMessage> {
        let body = LiveChatMessageInsert::text(live_chat_id, message);
        let inserted: LiveChatMessage = self
            .make_authenticated_request(
                Method::POST,
                "liveChat/messages",
                &[("part", "snippet")],
                Some(&body),
            )
            .await?
            .json()
            .await
            .context("parse YouTube liveChatMessages.insert response as JSON")?;
        tracing::debug!(live_chat_id, message_id = inserted.id, "posted chat message");
        Ok(inserted)
    }

    /// Deletes a chat message. Requires moderator or owner rights in the chat.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveChatMessages/delete>
    #[instrument(skip(self))]
    pub async fn delete_live_chat_message(&self, message_id: &str) -> eyre::Result<()> {
        self.make_authenticated_request(
            Method::DELETE,
            "liveChat/messages",
            &[("id", message_id)],
            None::<&()>,
        )
        .await?;
        tracing::debug!(message_id, "deleted chat message");
        Ok(())
    }
}
