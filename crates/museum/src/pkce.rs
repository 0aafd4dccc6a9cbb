// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth authorization code + PKCE (RFC 7636) helpers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, SeedableRng, TryRngCore};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::AuthError;

/// Length of the `state` parameter.
pub const STATE_LEN: usize = 24;

/// Length of the code verifier (RFC 7636 allows 43-128).
pub const VERIFIER_LEN: usize = 96;

const CHARSET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Where SHA-256 comes from when deriving a challenge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DigestProvider {
    #[default]
    Sha256,
    /// No secure hash available. Challenge derivation fails.
    Unavailable,
}

pub fn generate_state() -> String {
    random_string(STATE_LEN)
}

pub fn generate_verifier() -> String {
    random_string(VERIFIER_LEN)
}

/// Random alphanumeric string from the OS RNG.
///
/// Falls back to a time-seeded PRNG if the OS source fails, so this never
/// errors. Only the challenge derivation is allowed to fail.
pub fn random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => encode_alphanumeric(&bytes),
        Err(e) => {
            tracing::warn!(err = %e, "secure random source unavailable, using fallback");
            fallback_string(len)
        }
    }
}

fn fallback_string(len: usize) -> String {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let mut rng = SmallRng::seed_from_u64(seed ^ u64::from(std::process::id()));
    (0..len).map(|_| char::from(CHARSET[rng.random_range(0..CHARSET.len())])).collect()
}

fn encode_alphanumeric(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(CHARSET[usize::from(*b) % CHARSET.len()])).collect()
}

/// Compute code_challenge = base64url_nopad(sha256(verifier)).
pub fn derive_challenge(verifier: &str, digest: DigestProvider) -> Result<String, AuthError> {
    match digest {
        DigestProvider::Sha256 => {
            let hash = Sha256::digest(verifier.as_bytes());
            Ok(URL_SAFE_NO_PAD.encode(hash))
        }
        DigestProvider::Unavailable => Err(AuthError::CryptoUnavailable),
    }
}

/// Parameters for the provider's authorize redirect.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    pub state: &'a str,
    pub code_challenge: &'a str,
}

/// Build the full authorization URL with PKCE parameters.
pub fn build_authorize_url(authorize_url: &Url, req: &AuthorizeRequest<'_>) -> Url {
    let mut url = authorize_url.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", req.client_id)
        .append_pair("redirect_uri", req.redirect_uri)
        .append_pair("scope", &req.scopes.join(" "))
        .append_pair("state", req.state)
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", req.code_challenge);
    url
}

#[cfg(test)]
#[path = "pkce_tests.rs"]
mod tests;
