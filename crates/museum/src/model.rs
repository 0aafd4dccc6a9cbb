// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted record types and their shape validators.
//!
//! Reads go through `from_value`, which checks every field's JSON type and
//! returns `None` rather than a partially-valid record. Writes use serde.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An authenticated session with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry, epoch milliseconds.
    pub expires_at: u64,
    #[serde(default)]
    pub scope: String,
}

impl AuthSession {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let session = Self {
            access_token: obj.get("accessToken")?.as_str()?.to_owned(),
            refresh_token: obj.get("refreshToken")?.as_str()?.to_owned(),
            expires_at: json_u64(obj.get("expiresAt")?)?,
            scope: optional_str(obj.get("scope"))?.unwrap_or_default(),
        };
        session.is_valid().then_some(session)
    }

    /// Semantic checks beyond JSON types.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && self.expires_at > 0
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at <= now_ms
    }
}

/// PKCE state held between the authorize redirect and the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl PendingAuthorization {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let pending = Self {
            state: obj.get("state")?.as_str()?.to_owned(),
            code_verifier: obj.get("codeVerifier")?.as_str()?.to_owned(),
            refresh_token: optional_str(obj.get("refreshToken"))?,
        };
        pending.is_valid().then_some(pending)
    }

    pub fn is_valid(&self) -> bool {
        !self.state.is_empty() && !self.code_verifier.is_empty()
    }
}

/// One playlist in the displayed catalog. Identity is `link`, then `title`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistEntry {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_artist: Option<String>,
}

static PLAYLIST_URI: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"spotify:playlist:([A-Za-z0-9]+)").ok());

impl PlaylistEntry {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let tracks = match obj.get("tracks") {
            None => None,
            Some(v) => Some(json_u64(v)?),
        };
        Some(Self {
            title: obj.get("title")?.as_str()?.to_owned(),
            description: optional_str(obj.get("description"))?,
            tracks,
            cover_url: optional_str(obj.get("coverUrl"))?,
            link: obj.get("link")?.as_str()?.to_owned(),
            top_artist: optional_str(obj.get("topArtist"))?,
        })
    }

    /// Keep only entries that pass shape validation, in order.
    pub fn filter_valid(values: &[Value]) -> Vec<Self> {
        values.iter().filter_map(Self::from_value).collect()
    }

    /// Stable identity used to match entries across sources.
    pub fn key(&self) -> &str {
        if self.link.is_empty() {
            &self.title
        } else {
            &self.link
        }
    }

    /// Playlist id from a `spotify:playlist:<id>` URI or an
    /// `https://open.spotify.com/playlist/<id>` link.
    pub fn playlist_id(&self) -> Option<String> {
        let link = self.link.trim();
        if link.is_empty() {
            return None;
        }
        if let Some(caps) = PLAYLIST_URI.as_ref().and_then(|re| re.captures(link)) {
            return caps.get(1).map(|m| m.as_str().to_owned());
        }
        let url = url::Url::parse(link).ok()?;
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        segments.find(|s| *s == "playlist")?;
        segments.next().map(str::to_owned)
    }

    /// Embeddable player URL for this playlist.
    pub fn embed_url(&self) -> Option<String> {
        self.playlist_id().map(|id| {
            format!("https://open.spotify.com/embed/playlist/{id}?utm_source=generator")
        })
    }
}

/// `Some(None)` when absent, `Some(Some(_))` for a string, `None` for a wrong type.
fn optional_str(value: Option<&Value>) -> Option<Option<String>> {
    match value {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(_) => None,
    }
}

/// Non-negative integral JSON number. Accepts `1.0`-style floats.
fn json_u64(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
