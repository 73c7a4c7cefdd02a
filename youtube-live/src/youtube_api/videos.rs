//! YouTube Videos API types.

use crate::youtube_api::types::PageInfo;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Response structure for the `videos.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/list>
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListResponse {
    /// A list of videos that match the request criteria.
    #[serde(default)]
    pub items: Vec<Video>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageInfo>,
}

/// A `video` resource represents a YouTube video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#resource>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: String,
    /// Only present for videos that are, were, or will be live broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_streaming_details: Option<LiveStreamingDetails>,
}

impl Video {
    /// A broadcast is live if it has started and not yet ended.
    pub fn is_live(&self) -> bool {
        self.live_streaming_details
            .as_ref()
            .is_some_and(|d| d.actual_start_time.is_some() && d.actual_end_time.is_none())
    }
}

/// Metadata about a live video broadcast.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#liveStreamingDetails>
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamingDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start_time: Option<Timestamp>,
    /// The chat of a broadcast that is currently live. Absent once the broadcast ends or if
    /// chat is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_live_chat_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_requires_start_without_end() {
        let resp: VideoListResponse = serde_json::from_str(
            r#"{
                "items": [
                    {"id": "vod"},
                    {"id": "ended", "liveStreamingDetails": {
                        "actualStartTime": "2025-03-01T10:00:00Z",
                        "actualEndTime": "2025-03-01T11:00:00Z"
                    }},
                    {"id": "upcoming", "liveStreamingDetails": {
                        "scheduledStartTime": "2025-03-02T10:00:00Z"
                    }},
                    {"id": "live", "liveStreamingDetails": {
                        "actualStartTime": "2025-03-01T12:00:00Z",
                        "activeLiveChatId": "chat-1"
                    }}
                ]
            }"#,
        )
        .unwrap();

        let live: Vec<_> = resp.items.iter().filter(|v| v.is_live()).map(|v| &*v.id).collect();
        assert_eq!(live, ["live"]);
    }
}
