// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the auth and catalog pipeline.

use thiserror::Error;

/// Failures surfaced by login, token, and fetch operations.
///
/// Nothing here is fatal to the process. Callers show the message once and
/// fall back to cached data; [`AuthError::Cancelled`] is discarded silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Client id or redirect URI is not configured.
    #[error("client id or redirect URI is not configured")]
    ConfigMissing,

    /// No secure hash primitive is available to derive a PKCE challenge.
    #[error("no secure SHA-256 implementation is available")]
    CryptoUnavailable,

    /// The callback `state` did not match the pending authorization.
    #[error("login verification failed (state mismatch), please try again")]
    StateMismatch,

    /// The token endpoint rejected an exchange or refresh.
    #[error("{message}")]
    TokenExchange { message: String, status: Option<u16> },

    /// The resource endpoint rejected a page request.
    #[error("{message}")]
    Fetch { message: String, status: Option<u16> },

    /// Superseded by a newer operation; carries no user-visible meaning.
    #[error("operation cancelled")]
    Cancelled,
}

impl AuthError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status reported by the remote, when there was one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::TokenExchange { status, .. } | Self::Fetch { status, .. } => *status,
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "CONFIG_MISSING",
            Self::CryptoUnavailable => "CRYPTO_UNAVAILABLE",
            Self::StateMismatch => "STATE_MISMATCH",
            Self::TokenExchange { .. } => "TOKEN_EXCHANGE",
            Self::Fetch { .. } => "FETCH",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Failures of the backing key-value medium. Never escapes the store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage is unavailable")]
    Unavailable,

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
