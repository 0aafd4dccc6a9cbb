// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared HTTP plumbing for the token and resource clients.

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AuthError;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build the client used for provider calls.
pub fn client() -> reqwest::Client {
    ensure_crypto();
    reqwest::Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default()
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, AuthError>>,
) -> Result<T, AuthError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        result = fut => result,
    }
}

/// Parse a response body as JSON, treating anything unparsable as `{}`.
pub(crate) async fn json_body(resp: reqwest::Response) -> serde_json::Value {
    match resp.bytes().await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
        Err(e) => {
            tracing::debug!(err = %e, "failed to read response body");
            serde_json::Value::Object(Default::default())
        }
    }
}
