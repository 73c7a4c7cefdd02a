//! Follow a YouTube live stream's chat and talk back to it.
//!
//! [`YouTubeLive`] finds a channel's current broadcast, attaches to its live chat, and hands
//! back a stream of [`LiveEvent`]s plus a sender for [`BotCommand`]s. Authentication is lazy:
//! the first API call exchanges the stored refresh token for an access token, or, if there is
//! none, walks the user through Google's consent screen in their browser.
//!
//! ```rust,no_run
//! # async fn example() -> youtube_live::Result<()> {
//! use tokio_util::sync::CancellationToken;
//! use youtube_live::{BotCommand, Credentials, LiveEvent, YouTubeLive};
//!
//! let yt = YouTubeLive::from_credentials(Credentials::from_env_file(".env")?).build()?;
//! let broadcast = yt.current_broadcast_id_from_channel_handle("@ferris").await?;
//!
//! let cancel = CancellationToken::new();
//! let mut chat = yt.attach(&cancel, &broadcast).await?;
//! let _ = chat.commands.send(BotCommand::send("hello from Rust")).await;
//! while let Some(event) = chat.events.recv().await {
//!     if let LiveEvent::ChatMessage(m) = event {
//!         println!("{}: {}", m.display_name, m.message);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::oauth::{TokenSource, TokenSourceConfig};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod background;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod events;
mod net;
pub mod oauth;
pub mod transport;
pub mod youtube_api;

#[cfg(test)]
mod test_support;

pub use background::Attachment;
pub use config::Credentials;
pub use error::{Error, Result};
pub use events::{BanType, BotCommand, LiveEvent};
pub use oauth::{AuthorizationHandler, BearerToken, BrowserAuthorization, OAuthEndpoints};
pub use youtube_api::YouTubeClient;

/// A signed-in connection to YouTube.
///
/// Cheap to clone; clones share the same tokens.
#[derive(Debug, Clone)]
pub struct YouTubeLive {
    tokens: Arc<TokenSource>,
    client: Arc<YouTubeClient>,
}

impl YouTubeLive {
    /// Starts configuring a session for an OAuth client registered in the Google Cloud console.
    pub fn builder(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> YouTubeLiveBuilder {
        YouTubeLiveBuilder {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: None,
            listen_addr: "127.0.0.1:0".to_string(),
            additional_scopes: Vec::new(),
            http_client: None,
            oauth_endpoints: OAuthEndpoints::default(),
            authorizer: None,
            on_new_refresh_token: None,
            api_base: None,
        }
    }

    /// Like [`YouTubeLive::builder`], filled in from loaded [`Credentials`].
    pub fn from_credentials(credentials: Credentials) -> YouTubeLiveBuilder {
        Self::builder(credentials.client_id, credentials.client_secret)
            .refresh_token(credentials.refresh_token)
            .additional_scopes(credentials.additional_scopes)
    }

    /// The underlying REST client, for calls this type does not wrap.
    pub fn client(&self) -> &YouTubeClient {
        &self.client
    }

    /// Attaches to the live chat of `broadcast_id`.
    ///
    /// The session runs until the chat ends, the service refuses to continue, the event
    /// receiver is dropped, or `cancel` is cancelled. In every case the event channel closes.
    pub async fn attach(&self, cancel: &CancellationToken, broadcast_id: &str) -> Result<Attachment> {
        background::attach(&*self.client, Arc::clone(&self.client), cancel, broadcast_id).await
    }

    /// Whether `channel_id` is broadcasting live right now.
    pub async fn is_live(&self, channel_id: &str) -> Result<bool> {
        broadcast::is_live(&*self.client, channel_id).await
    }

    /// Resolves a handle such as `@ferris` (the `@` is optional) to a channel ID.
    pub async fn channel_id_from_handle(&self, handle: &str) -> Result<String> {
        broadcast::channel_id_from_handle(&*self.client, handle).await
    }

    pub async fn current_broadcast_id_from_channel_handle(&self, handle: &str) -> Result<String> {
        let channel_id = self.channel_id_from_handle(handle).await?;
        self.current_broadcast_id_from_channel_id(&channel_id).await
    }

    /// The video `channel_id` is currently live on, or [`Error::NotLive`].
    pub async fn current_broadcast_id_from_channel_id(&self, channel_id: &str) -> Result<String> {
        broadcast::current_broadcast_id(&*self.client, channel_id).await
    }

    /// Like [`YouTubeLive::current_broadcast_id_from_channel_id`], but asks search only.
    pub async fn current_broadcast_id_via_search(&self, channel_id: &str) -> Result<String> {
        broadcast::current_broadcast_id_via_search(&*self.client, channel_id).await
    }

    /// A current access token, refreshing or signing in as needed.
    pub async fn token(&self) -> Result<BearerToken> {
        self.tokens.token().await
    }

    /// Sends the user through the browser sign-in flow, even if the session already has
    /// working credentials.
    pub async fn login(&self) -> Result<()> {
        self.tokens.login().await?;
        Ok(())
    }

    /// Replaces the refresh token, e.g. one obtained by the caller's own OAuth flow.
    ///
    /// The next call mints a new access token from it.
    pub async fn set_refresh_token(&self, refresh_token: impl Into<String>) {
        self.tokens.set_refresh_token(refresh_token.into()).await;
    }

    /// The refresh token currently in use, for persisting between runs.
    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens.refresh_token().await
    }
}

/// Configures a [`YouTubeLive`] session.
pub struct YouTubeLiveBuilder {
    client_id: String,
    client_secret: String,
    refresh_token: Option<String>,
    listen_addr: String,
    additional_scopes: Vec<String>,
    http_client: Option<reqwest::Client>,
    oauth_endpoints: OAuthEndpoints,
    authorizer: Option<Arc<dyn AuthorizationHandler>>,
    on_new_refresh_token: Option<oauth::RefreshTokenHook>,
    api_base: Option<String>,
}

impl fmt::Debug for YouTubeLiveBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeLiveBuilder")
            .field("client_id", &self.client_id)
            .field("listen_addr", &self.listen_addr)
            .field("additional_scopes", &self.additional_scopes)
            .field("oauth_endpoints", &self.oauth_endpoints)
            .finish_non_exhaustive()
    }
}

impl YouTubeLiveBuilder {
    /// A refresh token from an earlier session. Empty means none.
    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Where the sign-in callback server listens, as `host:port`.
    ///
    /// Defaults to `127.0.0.1:0`. With an unspecified host such as `0.0.0.0`, the redirect
    /// goes to the best address of this machine instead.
    pub fn listen_addr(mut self, listen_addr: impl Into<String>) -> Self {
        self.listen_addr = listen_addr.into();
        self
    }

    /// Scopes to request in addition to [`oauth::YOUTUBE_SCOPE`].
    pub fn additional_scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.additional_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// The client used for Data API calls.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn oauth_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.oauth_endpoints = endpoints;
        self
    }

    /// Replaces the browser as the way the user is sent to the consent screen.
    pub fn authorization_handler(mut self, handler: impl AuthorizationHandler + 'static) -> Self {
        self.authorizer = Some(Arc::new(handler));
        self
    }

    /// Called with every refresh token the session obtains, so it can be persisted.
    pub fn on_new_refresh_token(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_new_refresh_token = Some(Arc::new(hook));
        self
    }

    #[cfg(test)]
    pub(crate) fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    pub fn build(self) -> Result<YouTubeLive> {
        if self.listen_addr.trim().is_empty() {
            return Err(Error::Config("callback listen address must not be empty".into()));
        }
        if self.additional_scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::Config("scopes must not be empty".into()));
        }

        let tokens = Arc::new(TokenSource::new(TokenSourceConfig {
            client_id: self.client_id,
            client_secret: self.client_secret,
            additional_scopes: self.additional_scopes,
            refresh_token: self.refresh_token,
            listen_addr: self.listen_addr,
            endpoints: self.oauth_endpoints,
            authorizer: self
                .authorizer
                .unwrap_or_else(|| Arc::new(BrowserAuthorization::default())),
            on_new_refresh_token: self.on_new_refresh_token,
        })?);

        let mut client = YouTubeClient::new(Arc::clone(&tokens), self.http_client.unwrap_or_default());
        if let Some(api_base) = self.api_base {
            client = client.with_api_base(api_base);
        }

        Ok(YouTubeLive {
            tokens,
            client: Arc::new(client),
        })
    }
}
