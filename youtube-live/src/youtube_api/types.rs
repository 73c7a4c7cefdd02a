//! Shared types for the YouTube API client.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Paging details for lists of resources.
///
/// Includes the total number of items available and the number of resources
/// returned in a single page response.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(default)]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(default)]
    pub results_per_page: u32,
}

/// A structured error returned by the YouTube Data API.
///
/// Google APIs answer failed requests with a JSON envelope of the form
/// `{"error": {"code": 403, "message": "...", "errors": [{"reason": "quotaExceeded", ...}]}}`.
/// Receiving one of these means the service understood the request and refused it (quota,
/// permissions, chat gone, ...), as opposed to a transport hiccup.
///
/// See: <https://developers.google.com/youtube/v3/docs/errors>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP status code of the response.
    pub code: u16,
    /// Human readable description of the error.
    #[serde(default)]
    pub message: String,
    /// Canonical status name, e.g. `PERMISSION_DENIED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Individual error entries.
    #[serde(default)]
    pub errors: Vec<ApiErrorItem>,
}

/// One entry of [`ApiError::errors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorItem {
    /// Machine readable reason, e.g. `quotaExceeded` or `liveChatEnded`.
    #[serde(default)]
    pub reason: String,
    /// Error domain, e.g. `youtube.liveChat`.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    /// Parses Google's error envelope, returning `None` if `body` isn't one.
    pub fn from_response_body(status: u16, body: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Envelope {
            error: ApiError,
        }

        let mut error = serde_json::from_str::<Envelope>(body).ok()?.error;
        if error.code == 0 {
            error.code = status;
        }
        Some(error)
    }

    /// The `reason` of the first error entry, if any.
    pub fn reason(&self) -> Option<&str> {
        self.errors.first().map(|e| e.reason.as_str())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "YouTube API error {}: {}", self.code, self.message)?;
        if let Some(reason) = self.reason() {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Google serializes 64-bit integers as JSON strings; accept either representation.
#[derive(Deserialize)]
#[serde(untagged)]
enum U64Repr {
    Number(u64),
    String(String),
}

impl U64Repr {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::String(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

pub(crate) fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    U64Repr::deserialize(deserializer)?.into_u64()
}

pub(crate) fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<U64Repr>::deserialize(deserializer)?
        .map(U64Repr::into_u64)
        .transpose()
}
