// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local HTTP listener for the provider's redirect back to `/callback`.

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use url::Url;

use crate::error::AuthError;
use crate::location::Location;
use crate::session::{CallbackOutcome, SessionManager};

pub type CallbackResult = Result<CallbackOutcome, AuthError>;

#[derive(Clone)]
pub struct CallbackState {
    pub session: Arc<SessionManager>,
    pub location: Arc<dyn Location>,
    /// Redirect URI the provider was given; the received query is applied to it.
    pub redirect_uri: Url,
    pub results: mpsc::Sender<CallbackResult>,
    pub cancel: CancellationToken,
}

pub fn build_callback_router(state: CallbackState) -> Router {
    let path = state.redirect_uri.path().to_owned();
    Router::new()
        .route(&path, get(callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn callback(
    State(s): State<CallbackState>,
    RawQuery(query): RawQuery,
) -> (StatusCode, String) {
    let mut url = s.redirect_uri.clone();
    url.set_query(query.as_deref());
    s.location.replace(url);

    let result = s.session.handle_callback(&s.cancel).await;
    let response = match &result {
        Ok(CallbackOutcome::NotACallback) => {
            return (StatusCode::BAD_REQUEST, "missing code or error parameter\n".to_owned());
        }
        Ok(CallbackOutcome::Connected) => {
            (StatusCode::OK, "Connected to Spotify. You can close this window.\n".to_owned())
        }
        Ok(CallbackOutcome::ProviderError(reason)) => {
            (StatusCode::BAD_REQUEST, format!("Spotify login failed: {reason}\n"))
        }
        Err(e) => (error_status(e), format!("{e}\n")),
    };
    if s.results.send(result).await.is_err() {
        debug!("callback result receiver dropped");
    }
    response
}

fn error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::StateMismatch => StatusCode::BAD_REQUEST,
        AuthError::ConfigMissing | AuthError::CryptoUnavailable => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AuthError::TokenExchange { .. } | AuthError::Fetch { .. } => StatusCode::BAD_GATEWAY,
        AuthError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Serve the callback route until one callback completes (or `cancel` fires)
/// and return its result. `None` means cancelled before any callback arrived.
pub async fn serve_callback(
    listener: TcpListener,
    session: Arc<SessionManager>,
    location: Arc<dyn Location>,
    redirect_uri: Url,
    cancel: CancellationToken,
) -> anyhow::Result<Option<CallbackResult>> {
    let (tx, mut rx) = mpsc::channel(1);
    let router = build_callback_router(CallbackState {
        session,
        location,
        redirect_uri,
        results: tx,
        cancel: cancel.clone(),
    });

    let stop = cancel.child_token();
    let server_stop = stop.clone();
    info!(addr = %listener.local_addr()?, "waiting for login callback");
    let server = tokio::spawn(async move {
        axum::serve(listener, router).with_graceful_shutdown(server_stop.cancelled_owned()).await
    });

    let result = tokio::select! {
        r = rx.recv() => r,
        _ = cancel.cancelled() => None,
    };
    stop.cancel();
    server.await??;
    Ok(result)
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
