//! Local HTTP listener for the provider's redirect.
//!
//! The listener accepts connections on a background task, answers the first
//! request on the callback path and hands its outcome to the waiting login
//! through a single-use channel. Lifecycle:
//!
//! ```text
//! bind ─▶ Listening ─▶ Completed(Success | Failure) ─▶ ShutDown
//!             └──────────────────────────────────────────▲
//! ```
//!
//! Shutdown is triggered by the owner only and is idempotent.

use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{LoginError, Result};
use crate::templates::{failure_html, SUCCESS_HTML};

/// Largest request head the listener will read.
const MAX_HEAD_BYTES: usize = 8 * 1024;

/// How long a client may take to send its request head.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for an in-flight response.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Reason used when the redirect has neither a code nor an error.
pub const NO_CODE_REASON: &str = "no authorization code received";

/// Outcome of the provider's redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// The provider issued an authorization code.
    Success {
        /// Authorization code.
        code: String,
        /// State echoed by the provider.
        state: String,
    },
    /// The provider reported an error, or sent no code.
    Failure {
        /// Human-readable reason.
        reason: String,
    },
}

impl CallbackResult {
    /// Interpret the query of a callback URL.
    pub fn from_url(url: &Url) -> Self {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;

        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut code,
                "state" => &mut state,
                "error" => &mut error,
                "error_description" => &mut error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        if let Some(error) = error.filter(|e| !e.is_empty()) {
            let mut reason = format!("OIDC error: {}", error);
            if let Some(description) = error_description.filter(|d| !d.is_empty()) {
                reason.push_str(" - ");
                reason.push_str(&description);
            }
            return Self::Failure { reason };
        }

        match code.filter(|c| !c.is_empty()) {
            Some(code) => Self::Success {
                code,
                state: state.unwrap_or_default(),
            },
            None => Self::Failure {
                reason: NO_CODE_REASON.to_string(),
            },
        }
    }

    /// Whether this is a successful redirect.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Outcome recorded by a completed listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// A code was received.
    Success,
    /// An error or a malformed redirect was received.
    Failure,
}

/// Observable state of a [`CallbackListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Bound and waiting for the redirect.
    Listening,
    /// The redirect arrived and its result was published.
    Completed(CallbackOutcome),
    /// The accept loop has stopped and the socket is closed.
    ShutDown,
}

/// Receiving end of the single-use result channel.
pub type CallbackReceiver = oneshot::Receiver<CallbackResult>;

/// Handle to a running callback listener.
///
/// Owned by exactly one login attempt. Call [`shutdown`](Self::shutdown) on
/// every exit path; dropping the handle without it cancels the accept loop as
/// a fallback but cannot wait for it.
pub struct CallbackListener {
    local_addrs: Vec<SocketAddr>,
    state: Arc<Mutex<ListenerState>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind every address `addr` resolves to and start serving `path` in the
    /// background.
    ///
    /// `localhost:45450` binds both loopback families when available. An
    /// address that is already in use fails the bind; an address family the
    /// host does not support is skipped.
    pub async fn bind(addr: &str, path: &str) -> Result<(Self, CallbackReceiver)> {
        let bind_error = |source| LoginError::ListenerBind {
            addr: addr.to_string(),
            source,
        };
        let listeners = bind_all(addr).await.map_err(bind_error)?;
        let local_addrs = listeners
            .iter()
            .map(TcpListener::local_addr)
            .collect::<io::Result<Vec<_>>>()
            .map_err(bind_error)?;

        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(Mutex::new(ListenerState::Listening));
        let cancel = CancellationToken::new();

        let server = CallbackServer {
            path: Arc::from(path),
            sender: Arc::new(Mutex::new(Some(sender))),
            state: state.clone(),
        };
        let task = tokio::spawn(server.run(listeners, cancel.clone()));

        info!(addrs = ?local_addrs, path, "Callback listener started");

        Ok((
            Self {
                local_addrs,
                state,
                cancel,
                task: Some(task),
            },
            receiver,
        ))
    }

    /// First address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addrs[0]
    }

    /// Every address the listener is bound to.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// Responses already being written get a short grace period before the
    /// loop is aborted. Returns `false` if the listener was already shut down.
    pub async fn shutdown(&mut self) -> bool {
        let Some(mut task) = self.task.take() else {
            return false;
        };

        self.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("Callback listener did not stop in time, aborting it");
            task.abort();
            let _ = task.await;
        }

        *self.state.lock() = ListenerState::ShutDown;
        debug!(addrs = ?self.local_addrs, "Callback listener shut down");
        true
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel.cancel();
            task.abort();
            *self.state.lock() = ListenerState::ShutDown;
        }
    }
}

impl std::fmt::Debug for CallbackListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackListener")
            .field("local_addrs", &self.local_addrs)
            .field("state", &self.state())
            .finish()
    }
}

/// Bind each resolved address. With port 0 the later addresses reuse the
/// port picked for the first one.
async fn bind_all(addr: &str) -> io::Result<Vec<TcpListener>> {
    let mut listeners: Vec<TcpListener> = Vec::new();
    let mut last_error = None;

    for mut candidate in tokio::net::lookup_host(addr).await? {
        if candidate.port() == 0 {
            if let Some(first) = listeners.first() {
                candidate.set_port(first.local_addr()?.port());
            }
        }
        match TcpListener::bind(candidate).await {
            Ok(listener) => listeners.push(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => return Err(e),
            Err(e) => {
                debug!(addr = %candidate, error = %e, "Skipping unavailable callback address");
                last_error = Some(e);
            }
        }
    }

    if listeners.is_empty() {
        return Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")
        }));
    }
    Ok(listeners)
}

/// Accept-loop side of the listener, shared by every connection task.
#[derive(Clone)]
struct CallbackServer {
    path: Arc<str>,
    sender: Arc<Mutex<Option<oneshot::Sender<CallbackResult>>>>,
    state: Arc<Mutex<ListenerState>>,
}

impl CallbackServer {
    async fn run(self, listeners: Vec<TcpListener>, cancel: CancellationToken) {
        let mut accept_loops = JoinSet::new();
        for listener in listeners {
            accept_loops.spawn(self.clone().accept_loop(listener, cancel.clone()));
        }
        while accept_loops.join_next().await.is_some() {}
    }

    /// Connections are served on their own tasks so an idle one (a browser
    /// preconnect) cannot hold up the redirect.
    async fn accept_loop(self, listener: TcpListener, cancel: CancellationToken) {
        let mut connections = JoinSet::new();
        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => continue,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept callback connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };

            debug!(%peer, "Accepted callback connection");
            let server = self.clone();
            let cancel = cancel.clone();
            connections.spawn(async move {
                if let Err(e) = server.handle(stream, cancel).await {
                    debug!(%peer, error = %e, "Callback connection failed");
                }
            });
        }
        drop(listener);

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            connections.abort_all();
        }
    }

    async fn handle(&self, mut stream: TcpStream, cancel: CancellationToken) -> io::Result<()> {
        // A connection still sending its request when the listener stops is dropped.
        let head = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            head = tokio::time::timeout(READ_TIMEOUT, read_request_head(&mut stream)) => head
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out reading request"))??,
        };

        let (response, claimed) = self.route(&head);
        let written = write_response(&mut stream, &response).await;

        // Publish even if the browser went away before reading the page.
        if let Some((result, sender)) = claimed {
            self.publish(result, sender);
        }
        written
    }

    /// Build the response; a valid redirect also claims the result slot.
    fn route(
        &self,
        head: &str,
    ) -> (HttpResponse, Option<(CallbackResult, oneshot::Sender<CallbackResult>)>) {
        let Some((method, target)) = parse_request_line(head) else {
            return (HttpResponse::bad_request("Malformed request"), None);
        };
        let Ok(url) = Url::parse(&format!("http://localhost{}", target)) else {
            return (HttpResponse::bad_request("Malformed request target"), None);
        };

        if url.path() != &*self.path {
            return (HttpResponse::plain(404, "Not Found"), None);
        }
        if method != "GET" {
            return (HttpResponse::plain(405, "Method Not Allowed"), None);
        }
        let Some(sender) = self.sender.lock().take() else {
            return (
                HttpResponse::html(409, failure_html("This login attempt has already completed.")),
                None,
            );
        };

        let result = CallbackResult::from_url(&url);
        let response = match &result {
            CallbackResult::Success { .. } => HttpResponse::html(200, SUCCESS_HTML.to_string()),
            CallbackResult::Failure { reason } => HttpResponse::html(400, failure_html(reason)),
        };
        (response, Some((result, sender)))
    }

    fn publish(&self, result: CallbackResult, sender: oneshot::Sender<CallbackResult>) {
        let outcome = if result.is_success() {
            CallbackOutcome::Success
        } else {
            CallbackOutcome::Failure
        };
        {
            let mut state = self.state.lock();
            if *state == ListenerState::Listening {
                *state = ListenerState::Completed(outcome);
            }
        }

        info!(outcome = ?outcome, "Received authorization callback");
        if sender.send(result).is_err() {
            debug!("Callback arrived after the login stopped waiting");
        }
    }
}

async fn read_request_head(stream: &mut TcpStream) -> io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() >= MAX_HEAD_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request head too large"));
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_request_line(head: &str) -> Option<(&str, &str)> {
    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    target.starts_with('/').then_some((method, target))
}

async fn write_response(stream: &mut TcpStream, response: &HttpResponse) -> io::Result<()> {
    stream.write_all(response.to_http().as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

struct HttpResponse {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl HttpResponse {
    fn html(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    fn plain(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.to_string(),
        }
    }

    fn bad_request(body: &str) -> Self {
        Self::plain(400, body)
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            _ => "Unknown",
        }
    }

    fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PATH: &str = "/oidc/callback";

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    async fn start() -> (CallbackListener, CallbackReceiver, String) {
        let (listener, receiver) = CallbackListener::bind("127.0.0.1:0", PATH).await.unwrap();
        let base = format!("http://{}", listener.local_addr());
        (listener, receiver, base)
    }

    #[test]
    fn test_from_url_success() {
        let url = Url::parse("http://localhost/oidc/callback?code=abc&state=xyz").unwrap();
        assert_eq!(
            CallbackResult::from_url(&url),
            CallbackResult::Success {
                code: "abc".into(),
                state: "xyz".into()
            }
        );
    }

    #[test]
    fn test_from_url_error_takes_precedence() {
        let url = Url::parse(
            "http://localhost/oidc/callback?code=abc&error=access_denied&error_description=User%20denied",
        )
        .unwrap();
        assert_eq!(
            CallbackResult::from_url(&url),
            CallbackResult::Failure {
                reason: "OIDC error: access_denied - User denied".into()
            }
        );
    }

    #[test]
    fn test_from_url_without_code() {
        let url = Url::parse("http://localhost/oidc/callback?state=xyz&code=").unwrap();
        assert_eq!(
            CallbackResult::from_url(&url),
            CallbackResult::Failure {
                reason: NO_CODE_REASON.into()
            }
        );
    }

    #[test]
    fn test_parse_request_line() {
        assert_eq!(
            parse_request_line("GET /oidc/callback?code=1 HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some(("GET", "/oidc/callback?code=1"))
        );
        assert_eq!(parse_request_line("garbage"), None);
        assert_eq!(parse_request_line("GET http://evil/ HTTP/1.1"), None);
    }

    #[tokio::test]
    async fn test_success_callback() {
        let (mut listener, receiver, base) = start().await;

        let response = client()
            .get(format!("{}{}?code=the-code&state=the-state", base, PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(response.text().await.unwrap().contains("Authentication Successful"));

        let result = receiver.await.unwrap();
        assert_eq!(
            result,
            CallbackResult::Success {
                code: "the-code".into(),
                state: "the-state".into()
            }
        );
        assert_eq!(
            listener.state(),
            ListenerState::Completed(CallbackOutcome::Success)
        );

        assert!(listener.shutdown().await);
        assert_eq!(listener.state(), ListenerState::ShutDown);
    }

    #[tokio::test]
    async fn test_error_callback() {
        let (mut listener, receiver, base) = start().await;

        let response = client()
            .get(format!(
                "{}{}?error=access_denied&error_description=The+user+said+no",
                base, PATH
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        assert!(response.text().await.unwrap().contains("access_denied"));

        match receiver.await.unwrap() {
            CallbackResult::Failure { reason } => {
                assert_eq!(reason, "OIDC error: access_denied - The user said no")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            listener.state(),
            ListenerState::Completed(CallbackOutcome::Failure)
        );
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_code_callback() {
        let (mut listener, receiver, base) = start().await;

        let response = client()
            .get(format!("{}{}?state=only", base, PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        assert_eq!(
            receiver.await.unwrap(),
            CallbackResult::Failure {
                reason: NO_CODE_REASON.into()
            }
        );
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_other_paths_do_not_consume_result() {
        let (mut listener, receiver, base) = start().await;
        let client = client();

        let response = client.get(format!("{}/favicon.ico", base)).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
        let response = client.post(format!("{}{}?code=x", base, PATH)).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 405);
        assert_eq!(listener.state(), ListenerState::Listening);

        client
            .get(format!("{}{}?code=real&state=s", base, PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(
            receiver.await.unwrap(),
            CallbackResult::Success {
                code: "real".into(),
                state: "s".into()
            }
        );
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_callback_is_rejected() {
        let (mut listener, receiver, base) = start().await;
        let client = client();

        client
            .get(format!("{}{}?code=first", base, PATH))
            .send()
            .await
            .unwrap();
        let response = client
            .get(format!("{}{}?code=second", base, PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 409);

        match receiver.await.unwrap() {
            CallbackResult::Success { code, .. } => assert_eq!(code, "first"),
            other => panic!("unexpected result: {other:?}"),
        }
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_releases_port() {
        let (mut listener, receiver, _) = start().await;
        let addr = listener.local_addr();

        assert!(listener.shutdown().await);
        assert!(!listener.shutdown().await);
        assert_eq!(listener.state(), ListenerState::ShutDown);

        // The sender went away with the accept loop.
        assert!(receiver.await.is_err());

        let rebound = TcpListener::bind(addr).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_late_callback_after_receiver_dropped() {
        let (mut listener, receiver, base) = start().await;
        drop(receiver);

        let response = client()
            .get(format!("{}{}?code=late", base, PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert!(listener.shutdown().await);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap().to_string();

        let err = CallbackListener::bind(&addr, PATH).await.unwrap_err();
        match err {
            LoginError::ListenerBind { addr: failed, .. } => assert_eq!(failed, addr),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_delay_callback() {
        let (mut listener, receiver, base) = start().await;

        // Connected but never sends a request, like a browser preconnect.
        let _idle = tokio::net::TcpStream::connect(listener.local_addr()).await.unwrap();
        let _idle_too = tokio::net::TcpStream::connect(listener.local_addr()).await.unwrap();

        let started = std::time::Instant::now();
        let response = client()
            .get(format!("{}{}?code=fast&state=s", base, PATH))
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let result = tokio::time::timeout(Duration::from_secs(3), receiver)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_success());
        assert!(started.elapsed() < READ_TIMEOUT / 2);

        // Idle connections are dropped on shutdown rather than waited for.
        let started = std::time::Instant::now();
        assert!(listener.shutdown().await);
        assert!(started.elapsed() < SHUTDOWN_GRACE);
    }

    #[tokio::test]
    async fn test_localhost_binds_every_loopback_address() {
        let (mut listener, receiver) = CallbackListener::bind("localhost:0", PATH).await.unwrap();
        let port = listener.local_addr().port();
        assert!(listener.local_addrs().iter().all(|a| a.port() == port));
        assert!(listener.local_addrs().iter().all(|a| a.ip().is_loopback()));

        // Whichever family localhost resolves to first, the redirect lands.
        let response = client()
            .get(format!("http://localhost:{}{}?code=c&state=s", port, PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert!(receiver.await.unwrap().is_success());
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_cancels_accept_loop() {
        let (listener, _receiver, _) = start().await;
        let state = listener.state.clone();
        drop(listener);
        assert_eq!(*state.lock(), ListenerState::ShutDown);
    }
}
