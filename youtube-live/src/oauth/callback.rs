//! Local HTTP server receiving the OAuth redirect.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Query parameters the provider appended to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// The authorization code. Absent if the user denied access.
    pub code: Option<String>,
    /// The anti-CSRF state echoed back by the provider.
    pub state: Option<String>,
    /// The provider's error code, e.g. `access_denied`.
    pub error: Option<String>,
}

impl CallbackParams {
    pub(crate) fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
            match &*k {
                "code" => params.code = Some(v.into_owned()),
                "state" => params.state = Some(v.into_owned()),
                "error" => params.error = Some(v.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Serves `/callback` on an already bound listener until shut down.
///
/// Every hit on `/callback` is forwarded to [`CallbackServer::next_callback`]; only the
/// first one is kept, later ones still get an HTTP response but are otherwise ignored.
pub(crate) struct CallbackServer {
    callbacks: mpsc::Receiver<CallbackParams>,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

impl CallbackServer {
    pub(crate) fn start(listener: Arc<TcpListener>, done_html: &'static str) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(listener, tx, shutdown.clone(), done_html));
        Self {
            callbacks: rx,
            shutdown,
            accept_task,
        }
    }

    /// Waits for the browser to hit the callback route.
    ///
    /// Returns `None` if the server stopped before that happened.
    pub(crate) async fn next_callback(&mut self) -> Option<CallbackParams> {
        self.callbacks.recv().await
    }

    /// Stops accepting, lets in-flight connections finish for up to `grace`, then aborts
    /// whatever is left.
    pub(crate) async fn shutdown(mut self, grace: Duration) {
        self.shutdown.cancel();
        if tokio::time::timeout(grace, &mut self.accept_task)
            .await
            .is_err()
        {
            tracing::warn!(?grace, "OAuth callback server did not shut down in time");
            self.accept_task.abort();
        }
        tracing::debug!("OAuth callback server stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: Arc<TcpListener>,
    callbacks: mpsc::Sender<CallbackParams>,
    shutdown: CancellationToken,
    done_html: &'static str,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!(%peer, "accepted OAuth callback connection");
                    connections.spawn(serve_connection(
                        stream,
                        callbacks.clone(),
                        shutdown.clone(),
                        done_html,
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept OAuth callback connection");
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: TcpStream,
    callbacks: mpsc::Sender<CallbackParams>,
    shutdown: CancellationToken,
    done_html: &'static str,
) {
    let io = hyper_util::rt::TokioIo::new(stream);
    let service = service_fn(move |req: Request<body::Incoming>| {
        let response = handle(&req, &callbacks, done_html);
        async move { Ok::<_, Infallible>(response) }
    });
    let conn = hyper::server::conn::http1::Builder::new().serve_connection(io, service);
    let mut conn = std::pin::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "OAuth callback connection failed");
    }
}

fn handle(
    req: &Request<body::Incoming>,
    callbacks: &mpsc::Sender<CallbackParams>,
    done_html: &'static str,
) -> Response<Full<Bytes>> {
    if req.uri().path() != "/callback" {
        return respond(StatusCode::NOT_FOUND, "text/plain", "not found".into());
    }

    let params = CallbackParams::from_query(req.uri().query().unwrap_or(""));
    let response = match (&params.code, &params.error) {
        (Some(_), _) => respond(StatusCode::OK, "text/html; charset=utf-8", done_html.into()),
        (None, Some(error)) => respond(
            StatusCode::BAD_REQUEST,
            "text/plain",
            format!("no code found in the callback: {error}").into(),
        ),
        (None, None) => respond(
            StatusCode::BAD_REQUEST,
            "text/plain",
            "no code found in the callback".into(),
        ),
    };

    if callbacks.try_send(params).is_err() {
        tracing::debug!("ignoring repeated OAuth callback");
    }
    response
}

fn respond(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
