// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint client: authorization-code exchange and refresh.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::AuthError;
use crate::http::{cancellable, json_body};

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Fields consumed from a successful token response.
///
/// Everything the provider may omit stays optional so callers decide what
/// to keep from the previous session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in_secs: u64,
    pub scope: Option<String>,
}

impl TokenGrant {
    fn from_value(value: &Value) -> Self {
        Self {
            access_token: non_empty_str(value.get("access_token")),
            refresh_token: non_empty_str(value.get("refresh_token")),
            expires_in_secs: value
                .get("expires_in")
                .and_then(Value::as_u64)
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            scope: non_empty_str(value.get("scope")),
        }
    }

    /// Absolute expiry for a grant received at `now_ms`.
    pub fn expires_at(&self, now_ms: u64) -> u64 {
        now_ms.saturating_add(self.expires_in_secs.saturating_mul(1000))
    }
}

/// Stateless client for the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_url: Url,
}

impl TokenClient {
    pub fn new(http: reqwest::Client, token_url: Url) -> Self {
        Self { http, token_url }
    }

    /// Exchange an authorization code for tokens (`authorization_code` grant).
    pub async fn exchange_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        code: &str,
        code_verifier: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenGrant, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
            ("code_verifier", code_verifier),
        ];
        cancellable(cancel, self.post_form(&form)).await
    }

    /// Trade a refresh token for a new access token (`refresh_token` grant).
    ///
    /// The provider may not rotate the refresh token; the returned grant then
    /// has `refresh_token: None` and the caller keeps the old one.
    pub async fn refresh(
        &self,
        client_id: &str,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenGrant, AuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];
        cancellable(cancel, self.post_form(&form)).await
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenGrant, AuthError> {
        let resp = self.http.post(self.token_url.clone()).form(form).send().await.map_err(|e| {
            AuthError::TokenExchange { message: format!("token request failed: {e}"), status: None }
        })?;

        let status = resp.status();
        let body = json_body(resp).await;
        if !status.is_success() {
            debug!(status = status.as_u16(), "token endpoint rejected request");
            return Err(AuthError::TokenExchange {
                message: token_error_message(&body, status.as_u16()),
                status: Some(status.as_u16()),
            });
        }
        Ok(TokenGrant::from_value(&body))
    }
}

/// `error_description`, then `error`, then a generic status-coded message.
pub fn token_error_message(body: &Value, status: u16) -> String {
    non_empty_str(body.get("error_description"))
        .or_else(|| non_empty_str(body.get("error")))
        .unwrap_or_else(|| format!("token request failed ({status})"))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
