// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a settable clock and a scripted fake remote.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::any;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self { now: AtomicU64::new(now_ms) }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// One scripted response. `{base}` in the body expands to the server's
/// `http://host:port` so paginated bodies can point back at the fake.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(value: serde_json::Value) -> Self {
        Self { status: 200, body: value.to_string(), delay: Duration::ZERO }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into(), delay: Duration::ZERO }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request as the fake saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

impl Recorded {
    /// Decode a form-encoded body into a map.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
    }
}

#[derive(Default)]
struct RouteState {
    replies: Vec<Reply>,
    hits: AtomicU32,
    requests: Mutex<Vec<Recorded>>,
}

/// Local axum server answering each route from a script.
///
/// The n-th request to a route gets the n-th reply; once the script runs
/// out the last reply repeats. Dropping the server stops it.
pub struct FakeRemote {
    addr: SocketAddr,
    routes: HashMap<String, Arc<RouteState>>,
    shutdown: CancellationToken,
}

impl FakeRemote {
    pub async fn start(routes: Vec<(&str, Vec<Reply>)>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let base = format!("http://{addr}");

        let mut router = Router::new();
        let mut states = HashMap::new();
        for (path, replies) in routes {
            let state = Arc::new(RouteState { replies, ..Default::default() });
            states.insert(path.to_owned(), Arc::clone(&state));
            let base = base.clone();
            router = router.route(
                path,
                any(move |uri: Uri, headers: HeaderMap, body: String| {
                    let state = Arc::clone(&state);
                    let base = base.clone();
                    async move { answer(&state, &base, uri, headers, body).await }
                }),
            );
        }

        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await.ok();
        });

        Ok(Self { addr, routes: states, shutdown })
    }

    /// `http://host:port` with no trailing slash.
    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> anyhow::Result<url::Url> {
        Ok(url::Url::parse(&format!("{}{path}", self.base()))?)
    }

    pub fn hits(&self, path: &str) -> u32 {
        self.routes.get(path).map(|r| r.hits.load(Ordering::SeqCst)).unwrap_or(0)
    }

    pub fn requests(&self, path: &str) -> Vec<Recorded> {
        self.routes.get(path).map(|r| r.requests.lock().clone()).unwrap_or_default()
    }
}

impl Drop for FakeRemote {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn answer(
    state: &RouteState,
    base: &str,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let idx = state.hits.fetch_add(1, Ordering::SeqCst) as usize;
    state.requests.lock().push(Recorded {
        query: uri.query().map(str::to_owned),
        authorization: headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body,
    });

    let reply = state
        .replies
        .get(idx)
        .or_else(|| state.replies.last())
        .cloned()
        .unwrap_or_else(|| Reply::status(500, "{}"));
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    (
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        reply.body.replace("{base}", base),
    )
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Convert any `Display` error into `anyhow::Error`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression returns `Err` whose display contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        #[allow(clippy::expect_used)]
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
