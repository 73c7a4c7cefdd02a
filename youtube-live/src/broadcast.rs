//! Finding a channel's live broadcast and its chat.

use crate::error::{Error, Result};
use crate::transport::BroadcastQuery;
use tracing::instrument;

/// How many of a channel's most recent uploads are checked for a live broadcast.
const UPLOADS_LOOKBACK: u32 = 50;

/// Puts a channel handle in `@handle` form.
pub fn normalize_handle(handle: &str) -> Result<String> {
    let handle = handle.trim();
    if handle.is_empty() || handle == "@" {
        return Err(Error::InvalidHandle);
    }
    Ok(if handle.starts_with('@') {
        handle.to_string()
    } else {
        format!("@{handle}")
    })
}

#[instrument(skip(query))]
pub(crate) async fn channel_id_from_handle(query: &impl BroadcastQuery, handle: &str) -> Result<String> {
    let handle = normalize_handle(handle)?;
    let channels = query.channels_by_handle(&handle).await?;
    channels
        .items
        .into_iter()
        .next()
        .map(|c| c.id)
        .ok_or(Error::ChannelNotFound(handle))
}

/// The ID of the video `channel_id` is currently broadcasting live.
///
/// Checks the channel's recent uploads first, which is cheap in quota, and only then falls
/// back to search.
#[instrument(skip(query))]
pub(crate) async fn current_broadcast_id(
    query: &impl BroadcastQuery,
    channel_id: &str,
) -> Result<String> {
    if let Some(id) = live_upload(query, channel_id).await? {
        return Ok(id);
    }
    tracing::debug!(channel_id, "no live video among recent uploads, searching");
    current_broadcast_id_via_search(query, channel_id).await
}

/// Like [`current_broadcast_id`], but only asks search.
///
/// Search results can lag behind reality and cost more quota, but need no uploads playlist.
#[instrument(skip(query))]
pub(crate) async fn current_broadcast_id_via_search(
    query: &impl BroadcastQuery,
    channel_id: &str,
) -> Result<String> {
    let results = query.search_live(channel_id).await?;
    results
        .items
        .into_iter()
        .find_map(|r| r.id.video_id)
        .ok_or(Error::NotLive)
}

async fn live_upload(query: &impl BroadcastQuery, channel_id: &str) -> Result<Option<String>> {
    let channels = query.channels_by_id(channel_id).await?;
    let channel = channels
        .items
        .into_iter()
        .next()
        .ok_or_else(|| Error::ChannelNotFound(channel_id.to_string()))?;
    let Some(uploads) = channel.uploads_playlist_id() else {
        tracing::debug!(channel_id, "channel has no uploads playlist");
        return Ok(None);
    };

    let uploads = query.playlist_items(uploads, UPLOADS_LOOKBACK).await?;
    let video_ids: Vec<String> = uploads
        .items
        .into_iter()
        .map(|item| item.content_details.video_id)
        .collect();
    if video_ids.is_empty() {
        return Ok(None);
    }

    let videos = query.videos(&video_ids).await?;
    Ok(videos.items.into_iter().find(|v| v.is_live()).map(|v| v.id))
}

/// Whether `channel_id` is broadcasting live right now.
pub(crate) async fn is_live(query: &impl BroadcastQuery, channel_id: &str) -> Result<bool> {
    match current_broadcast_id(query, channel_id).await {
        Ok(_) => Ok(true),
        Err(Error::NotLive) => Ok(false),
        Err(e) => Err(e),
    }
}

/// The chat belonging to a live broadcast.
#[instrument(skip(query))]
pub(crate) async fn live_chat_id(query: &impl BroadcastQuery, broadcast_id: &str) -> Result<String> {
    let videos = query.videos(&[broadcast_id.to_string()]).await?;
    let video = videos
        .items
        .into_iter()
        .find(|v| v.id == broadcast_id)
        .ok_or_else(|| Error::BroadcastNotFound(broadcast_id.to_string()))?;
    video
        .live_streaming_details
        .and_then(|d| d.active_live_chat_id)
        .ok_or_else(|| Error::ChatDisabled(broadcast_id.to_string()))
}
