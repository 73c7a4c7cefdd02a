//! OAuth 2.0 token management for YouTube API authentication.
//!
//! Access tokens are minted from a refresh token when possible. When that fails, the user is
//! sent through Google's three-legged authorization flow with PKCE, and the redirect is caught
//! by a short-lived local HTTP server (see [`callback`]).

mod callback;

pub use callback::CallbackParams;

use crate::error::{Error, Result};
use crate::net::ListenEndpoint;
use callback::CallbackServer;
use eyre::Context;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::instrument;

/// The scope every session requests, after any caller-supplied scopes.
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

const OAUTH_DONE_HTML: &str = include_str!("../../oauth_success.html");

/// How long the browser has to come back to the callback endpoint.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const CALLBACK_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Subtracted from the provider's lifetime so a token is never used right as it lapses.
const EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Assumed when the provider does not say how long a token lives.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3300);

/// Where to send the user for consent, and where to exchange codes for tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://www.googleapis.com/oauth2/v3/token".to_string(),
        }
    }
}

/// An access token ready to be put in an `Authorization: Bearer` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub access_token: String,
    /// When the token should be considered expired. Includes a safety buffer.
    pub expires_at: SystemTime,
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("access_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Invoked with every new refresh token the session obtains, e.g. to persist it.
pub type RefreshTokenHook = Arc<dyn Fn(&str) + Send + Sync>;

pub type AuthorizationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CallbackParams>> + Send + 'a>>;

/// Gets the user to grant access and reports what the provider redirected back with.
///
/// The default, [`BrowserAuthorization`], opens the system browser and listens for the
/// redirect on `listener`. Swap it out for headless environments or tests.
pub trait AuthorizationHandler: Send + Sync {
    fn authorize<'a>(
        &'a self,
        authorize_url: &'a str,
        listener: Arc<TcpListener>,
    ) -> AuthorizationFuture<'a>;
}

/// Opens the authorization URL in the user's browser and waits for the redirect.
#[derive(Debug, Clone)]
pub struct BrowserAuthorization {
    done_html: &'static str,
    timeout: Duration,
    open_url: fn(&str) -> std::io::Result<()>,
}

impl Default for BrowserAuthorization {
    fn default() -> Self {
        Self {
            done_html: OAUTH_DONE_HTML,
            timeout: CALLBACK_TIMEOUT,
            open_url: webbrowser::open,
        }
    }
}

impl BrowserAuthorization {
    /// HTML shown in the browser once the redirect has been received.
    pub fn with_done_html(mut self, html: &'static str) -> Self {
        self.done_html = html;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces how the authorization URL is shown to the user, e.g. printing it on a
    /// machine without a browser.
    pub fn with_url_opener(mut self, open_url: fn(&str) -> std::io::Result<()>) -> Self {
        self.open_url = open_url;
        self
    }
}

impl AuthorizationHandler for BrowserAuthorization {
    fn authorize<'a>(
        &'a self,
        authorize_url: &'a str,
        listener: Arc<TcpListener>,
    ) -> AuthorizationFuture<'a> {
        Box::pin(async move {
            let mut server = CallbackServer::start(listener, self.done_html);

            tracing::info!(url = %authorize_url, "asking user to follow OAuth flow");
            if let Err(e) = (self.open_url)(authorize_url) {
                tracing::warn!(
                    error = %e,
                    url = %authorize_url,
                    "could not open browser, visit the URL manually to continue"
                );
            }

            let result = match tokio::time::timeout(self.timeout, server.next_callback()).await {
                Ok(Some(params)) => Ok(params),
                Ok(None) => Err(Error::Other(eyre::eyre!(
                    "OAuth callback server stopped before receiving a callback"
                ))),
                Err(_) => {
                    tracing::error!(timeout = ?self.timeout, "gave up waiting for OAuth callback");
                    Err(Error::CallbackTimeout(self.timeout))
                }
            };
            server.shutdown(CALLBACK_SHUTDOWN_GRACE).await;
            result
        })
    }
}

/// Everything needed to set up a [`TokenSource`].
pub(crate) struct TokenSourceConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) additional_scopes: Vec<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) listen_addr: String,
    pub(crate) endpoints: OAuthEndpoints,
    pub(crate) authorizer: Arc<dyn AuthorizationHandler>,
    pub(crate) on_new_refresh_token: Option<RefreshTokenHook>,
}

type OAuthClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Clone)]
struct TimeBoundAccessToken {
    access_token: String,
    /// When the current access token expires (with safety buffer)
    expires_at: SystemTime,
}

/// `now + expires_in`, less the safety buffer.
///
/// Lifetimes that are missing or too large to represent fall back to [`DEFAULT_LIFETIME`].
fn expiry(now: SystemTime, expires_in: Option<Duration>) -> SystemTime {
    expires_in
        .and_then(|expires_in| now.checked_add(expires_in))
        .map(|at| at.checked_sub(EXPIRY_BUFFER).unwrap_or(now))
        .unwrap_or(now + DEFAULT_LIFETIME)
}

impl TimeBoundAccessToken {
    fn new(token: &BasicTokenResponse) -> Self {
        Self {
            access_token: token.access_token().secret().clone(),
            expires_at: expiry(SystemTime::now(), token.expires_in()),
        }
    }

    fn is_fresh(&self) -> bool {
        SystemTime::now() < self.expires_at
    }

    fn bearer(&self) -> BearerToken {
        BearerToken {
            access_token: self.access_token.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Whether this session has already completed a browser flow.
///
/// After one completed flow, a failing refresh surfaces [`Error::NotLoggedIn`] instead of
/// popping up the browser again; only an explicit [`TokenSource::login`] starts another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    NotAttempted,
    Attempted,
}

struct AuthSession {
    endpoint: ListenEndpoint,
    refresh_token: Option<String>,
    access: Option<TimeBoundAccessToken>,
    flow: FlowState,
}

/// Produces access tokens for the Data API.
///
/// All token work happens under one async mutex, so concurrent callers that find the cached
/// token stale wait for the single refresh (or browser flow) in progress and then share its
/// result.
pub(crate) struct TokenSource {
    client: OAuthClient,
    scopes: Vec<String>,
    http: oauth2::reqwest::Client,
    authorizer: Arc<dyn AuthorizationHandler>,
    on_new_refresh_token: Option<RefreshTokenHook>,
    session: Mutex<AuthSession>,
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("client_id", self.client.client_id())
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl TokenSource {
    pub(crate) fn new(config: TokenSourceConfig) -> Result<Self> {
        if config.client_id.trim().is_empty() {
            return Err(Error::Config("client id must not be empty".into()));
        }
        let auth_url = AuthUrl::new(config.endpoints.auth_url)
            .map_err(|e| Error::Config(format!("invalid authorization endpoint: {e}")))?;
        let token_url = TokenUrl::new(config.endpoints.token_url)
            .map_err(|e| Error::Config(format!("invalid token endpoint: {e}")))?;

        let mut client = BasicClient::new(ClientId::new(config.client_id))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);
        if !config.client_secret.is_empty() {
            client = client.set_client_secret(ClientSecret::new(config.client_secret));
        }

        let mut scopes: Vec<String> = Vec::new();
        for scope in config
            .additional_scopes
            .into_iter()
            .chain(std::iter::once(YOUTUBE_SCOPE.to_string()))
        {
            let scope = scope.trim().to_string();
            if !scope.is_empty() && !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }

        let http = oauth2::reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")?;

        Ok(Self {
            client,
            scopes,
            http,
            authorizer: config.authorizer,
            on_new_refresh_token: config.on_new_refresh_token,
            session: Mutex::new(AuthSession {
                endpoint: ListenEndpoint::new(config.listen_addr),
                refresh_token: config.refresh_token.filter(|t| !t.is_empty()),
                access: None,
                flow: FlowState::NotAttempted,
            }),
        })
    }

    /// Returns a usable access token, refreshing or re-authorizing as needed.
    #[instrument(skip(self))]
    pub(crate) async fn token(&self) -> Result<BearerToken> {
        let mut session = self.session.lock().await;
        if let Some(access) = session.access.as_ref().filter(|a| a.is_fresh()) {
            return Ok(access.bearer());
        }

        let refresh_failure = match session.refresh_token.clone() {
            Some(refresh_token) => match self.refresh(&refresh_token).await {
                Ok(token) => {
                    tracing::debug!("access token successfully refreshed");
                    return Ok(self.store(&mut session, &token));
                }
                Err(e) => e,
            },
            None => eyre::eyre!("no refresh token available"),
        };

        if session.flow == FlowState::Attempted {
            tracing::error!(error = %refresh_failure, "access token refresh failed after authorization");
            return Err(Error::NotLoggedIn(refresh_failure));
        }

        tracing::info!(reason = %refresh_failure, "cannot refresh access token, starting authorization flow");
        self.authorize(&mut session).await
    }

    /// Runs the browser flow now, even if the session already went through one.
    #[instrument(skip(self))]
    pub(crate) async fn login(&self) -> Result<BearerToken> {
        let mut session = self.session.lock().await;
        session.flow = FlowState::NotAttempted;
        session.access = None;
        self.authorize(&mut session).await
    }

    /// Replaces the refresh token and forgets the cached access token.
    pub(crate) async fn set_refresh_token(&self, refresh_token: String) {
        let mut session = self.session.lock().await;
        session.refresh_token = Some(refresh_token);
        session.access = None;
    }

    pub(crate) async fn refresh_token(&self) -> Option<String> {
        self.session.lock().await.refresh_token.clone()
    }

    async fn refresh(&self, refresh_token: &str) -> eyre::Result<BasicTokenResponse> {
        tracing::debug!("attempting to refresh OAuth token");
        match self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
        {
            Ok(token) => Ok(token),
            Err(ref e @ RequestTokenError::ServerResponse(ref sr))
                if matches!(sr.error(), BasicErrorResponseType::InvalidGrant) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Err(eyre::eyre!("refresh token rejected: {e}"))
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Caches `token`, adopting its refresh token if it carries a new one.
    fn store(&self, session: &mut AuthSession, token: &BasicTokenResponse) -> BearerToken {
        match token.refresh_token() {
            Some(new) if session.refresh_token.as_deref() != Some(new.secret().as_str()) => {
                tracing::debug!("new token includes refresh token");
                session.refresh_token = Some(new.secret().clone());
                if let Some(hook) = &self.on_new_refresh_token {
                    hook(new.secret().as_str());
                }
            }
            Some(_) => {}
            None => tracing::trace!("new token lacks refresh token, preserving original"),
        }

        let access = TimeBoundAccessToken::new(token);
        let bearer = access.bearer();
        session.access = Some(access);
        bearer
    }

    async fn authorize(&self, session: &mut AuthSession) -> Result<BearerToken> {
        let endpoint = session.endpoint.resolve().await?;
        let redirect_url = RedirectUrl::new(endpoint.redirect_uri())
            .map_err(|e| Error::Config(format!("invalid redirect URI: {e}")))?;
        let client = self.client.clone().set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        let params = self
            .authorizer
            .authorize(auth_url.as_str(), Arc::clone(&endpoint.listener))
            .await?;

        if params.state.as_deref() != Some(csrf.secret().as_str()) {
            tracing::error!("OAuth callback state does not match the one we sent");
            return Err(Error::StateMismatch);
        }
        let Some(code) = params.code else {
            tracing::error!(provider_error = ?params.error, "OAuth callback carried no authorization code");
            return Err(Error::MissingAuthorizationCode(params.error));
        };

        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(classify_exchange_error)?;

        tracing::info!("OAuth authorization completed");
        session.flow = FlowState::Attempted;
        Ok(self.store(session, &token))
    }
}

/// Rejections from the token endpoint mean the user has to log in again; anything else is a
/// transport problem.
fn classify_exchange_error<RE>(e: RequestTokenError<RE, BasicErrorResponse>) -> Error
where
    RE: std::error::Error + Send + Sync + 'static,
{
    if matches!(e, RequestTokenError::ServerResponse(_)) {
        tracing::warn!("authorization code exchange rejected: {}", e);
        Error::NotLoggedIn(eyre::Report::new(e))
    } else {
        Error::Other(eyre::Report::new(e).wrap_err("exchange authorization code for access token"))
    }
}
