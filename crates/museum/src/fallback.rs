// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static fallback catalog document, read from disk or fetched over HTTP.
//!
//! The document is a JSON array of loosely-shaped entries. Field aliases are
//! normalized here and the result is run through the entry validator.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::AuthError;
use crate::http::cancellable;
use crate::model::PlaylistEntry;

#[derive(Debug, Clone)]
pub enum FallbackSource {
    None,
    File(PathBuf),
    Http { http: reqwest::Client, url: Url },
}

impl FallbackSource {
    /// `http(s)://` locations are fetched; anything else is a file path.
    /// An empty location disables the fallback.
    pub fn from_location(location: &str, http: reqwest::Client) -> Self {
        let location = location.trim();
        if location.is_empty() {
            return Self::None;
        }
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Http { http, url },
            _ => Self::File(PathBuf::from(location)),
        }
    }

    /// Load and normalize the document. An absent source yields an empty list.
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<PlaylistEntry>, AuthError> {
        let raw = match self {
            Self::None => return Ok(Vec::new()),
            Self::File(path) => cancellable(cancel, read_file(path)).await?,
            Self::Http { http, url } => cancellable(cancel, get_document(http, url)).await?,
        };
        let value: Value = serde_json::from_str(&raw).map_err(|e| AuthError::Fetch {
            message: format!("fallback document is not valid JSON: {e}"),
            status: None,
        })?;
        let Some(items) = value.as_array() else {
            return Err(AuthError::Fetch {
                message: "fallback document is not a JSON array".to_owned(),
                status: None,
            });
        };
        let entries = normalize_document(items);
        debug!(entries = entries.len(), "loaded fallback document");
        Ok(entries)
    }
}

async fn read_file(path: &Path) -> Result<String, AuthError> {
    tokio::fs::read_to_string(path).await.map_err(|e| AuthError::Fetch {
        message: format!("failed to read fallback document {}: {e}", path.display()),
        status: None,
    })
}

async fn get_document(http: &reqwest::Client, url: &Url) -> Result<String, AuthError> {
    let resp = http.get(url.clone()).send().await.map_err(|e| AuthError::Fetch {
        message: format!("failed to fetch fallback document: {e}"),
        status: None,
    })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AuthError::Fetch {
            message: format!("failed to fetch fallback document ({status})"),
            status: Some(status.as_u16()),
        });
    }
    resp.text().await.map_err(|e| AuthError::Fetch {
        message: format!("failed to read fallback document: {e}"),
        status: Some(status.as_u16()),
    })
}

/// Normalize every item, dropping the ones that still fail validation.
pub fn normalize_document(items: &[Value]) -> Vec<PlaylistEntry> {
    items.iter().filter_map(normalize_item).collect()
}

fn normalize_item(item: &Value) -> Option<PlaylistEntry> {
    let obj = item.as_object()?;
    let mut out = Map::new();

    if let Some(title) = first_str(item, &["/title", "/name"]) {
        out.insert("title".into(), title);
    }
    if let Some(desc) = obj.get("description").filter(|v| !v.is_null()) {
        out.insert("description".into(), desc.clone());
    }
    match obj.get("tracks") {
        Some(Value::Object(t)) => {
            if let Some(total) = t.get("total") {
                out.insert("tracks".into(), total.clone());
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            out.insert("tracks".into(), other.clone());
        }
    }
    if let Some(cover) = first_str(item, &["/coverUrl", "/image", "/images/0/url"]) {
        out.insert("coverUrl".into(), cover);
    }
    if let Some(link) = first_str(item, &["/link", "/external_urls/spotify"]) {
        out.insert("link".into(), link);
    }
    if let Some(artist) = first_str(item, &["/topArtist", "/artist"]) {
        out.insert("topArtist".into(), artist);
    }

    PlaylistEntry::from_value(&Value::Object(out))
}

fn first_str(item: &Value, pointers: &[&str]) -> Option<Value> {
    pointers
        .iter()
        .filter_map(|p| item.pointer(p))
        .find(|v| v.as_str().is_some_and(|s| !s.is_empty()))
        .cloned()
}

#[cfg(test)]
#[path = "fallback_tests.rs"]
mod tests;
