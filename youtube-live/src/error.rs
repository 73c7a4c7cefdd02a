//! Errors surfaced by the public API.
//!
//! Internal plumbing uses [`eyre::Report`] the same way the REST client does. The conditions
//! callers are expected to branch on (needs login, not live, bad handle, ...) get their own
//! variants here so they can be matched without string inspection.

use std::io;
use std::time::Duration;

use crate::youtube_api::ApiError;

/// Result alias for the public API.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The session was constructed with unusable settings.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No usable credentials: the refresh token was rejected and the browser flow has already
    /// been used once for this session (or the provider refused the grant outright).
    #[error("user not logged in")]
    NotLoggedIn(#[source] eyre::Report),

    /// The `state` returned to the OAuth callback is not the one we sent.
    #[error("state mismatch in 3-legged OAuth flow")]
    StateMismatch,

    /// The browser never came back to the local callback endpoint.
    #[error("timed out after {0:?} waiting for the OAuth callback")]
    CallbackTimeout(Duration),

    /// The OAuth callback was hit without an authorization code.
    #[error("no authorization code in OAuth callback{}", .0.as_deref().map(|e| format!(" (provider error: {e})")).unwrap_or_default())]
    MissingAuthorizationCode(Option<String>),

    /// The local OAuth callback listener could not be bound.
    #[error("failed to bind OAuth callback listener on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The channel has no live broadcast right now.
    #[error("user not live")]
    NotLive,

    /// Channel handles cannot be blank.
    #[error("youtube channel handle is invalid, cannot be blank")]
    InvalidHandle,

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("broadcast not found: {0}")]
    BroadcastNotFound(String),

    #[error("live chat disabled for broadcast {0}")]
    ChatDisabled(String),

    /// A structured error response from the YouTube API.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Other(eyre::Report),
}

impl Error {
    /// Whether the caller needs to (re-)authenticate before retrying.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::NotLoggedIn(_))
    }
}

impl From<eyre::Report> for Error {
    /// Recovers typed conditions that travelled through the collaborator traits inside an
    /// [`eyre::Report`], such as a [`Error::NotLoggedIn`] raised while fetching a token for a
    /// REST call, or a structured [`ApiError`].
    fn from(report: eyre::Report) -> Self {
        match report.downcast::<Error>() {
            Ok(error) => error,
            Err(report) => match report.downcast::<ApiError>() {
                Ok(api) => Self::Api(api),
                Err(report) => Self::Other(report),
            },
        }
    }
}
