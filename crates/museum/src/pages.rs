// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cursor-following fetch of the user's playlist collection.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::AuthError;
use crate::http::{cancellable, json_body};
use crate::model::PlaylistEntry;

/// Items requested per page.
pub const PAGE_LIMIT: u32 = 50;

/// Hard stop for a `next` chain that never ends.
pub const MAX_PAGES: usize = 1000;

pub const UNTITLED: &str = "Untitled playlist";

/// Every item across all pages, plus the count the server reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub total: u64,
    pub items: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct PlaylistClient {
    http: reqwest::Client,
    first_page: Url,
}

impl PlaylistClient {
    /// Client for `GET {api_base}/v1/me/{collection}?limit=50`.
    pub fn new(
        http: reqwest::Client,
        api_base: &Url,
        collection: &str,
    ) -> Result<Self, url::ParseError> {
        let mut first_page = api_base.join(&format!("/v1/me/{collection}"))?;
        first_page.query_pairs_mut().append_pair("limit", &PAGE_LIMIT.to_string());
        Ok(Self { http, first_page })
    }

    pub fn first_page(&self) -> &Url {
        &self.first_page
    }

    /// Follow `next` until it is absent. All-or-nothing: any failed page
    /// discards everything accumulated so far.
    pub async fn fetch_all_pages(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Page, AuthError> {
        cancellable(cancel, self.walk(access_token)).await
    }

    async fn walk(&self, access_token: &str) -> Result<Page, AuthError> {
        let mut items = Vec::new();
        let mut server_total: Option<u64> = None;
        let mut next = Some(self.first_page.clone());
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if pages >= MAX_PAGES {
                return Err(AuthError::Fetch {
                    message: format!("pagination exceeded {MAX_PAGES} pages"),
                    status: None,
                });
            }
            pages += 1;

            let body = self.get_page(&url, access_token).await?;
            if let Some(page_items) = body.get("items").and_then(Value::as_array) {
                items.extend(page_items.iter().cloned());
            }
            if server_total.is_none() {
                server_total = body.get("total").and_then(Value::as_u64);
            }
            next = match body.get("next").and_then(Value::as_str) {
                Some(s) if !s.is_empty() => Some(url.join(s).map_err(|e| AuthError::Fetch {
                    message: format!("invalid next page URL: {e}"),
                    status: None,
                })?),
                _ => None,
            };
        }

        let total = server_total.filter(|t| *t > 0).unwrap_or(items.len() as u64);
        debug!(pages, items = items.len(), total, "fetched playlist pages");
        Ok(Page { total, items })
    }

    async fn get_page(&self, url: &Url, access_token: &str) -> Result<Value, AuthError> {
        let resp =
            self.http.get(url.clone()).bearer_auth(access_token).send().await.map_err(|e| {
                AuthError::Fetch { message: format!("failed to fetch playlists: {e}"), status: None }
            })?;

        let status = resp.status();
        let body = json_body(resp).await;
        if !status.is_success() {
            debug!(status = status.as_u16(), "playlist page request rejected");
            return Err(AuthError::Fetch {
                message: fetch_error_message(&body, status.as_u16()),
                status: Some(status.as_u16()),
            });
        }
        Ok(body)
    }
}

/// `error.message` from the resource API, else a generic status-coded message.
pub fn fetch_error_message(body: &Value, status: u16) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("failed to fetch playlists ({status})"))
}

/// Map a resource item into a catalog entry, filling defaults for gaps.
pub fn entry_from_item(item: &Value) -> PlaylistEntry {
    let text = |ptr: &str| {
        item.pointer(ptr).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
    };
    PlaylistEntry {
        title: text("/name").unwrap_or_else(|| UNTITLED.to_owned()),
        description: Some(text("/description").unwrap_or_default()),
        tracks: Some(item.pointer("/tracks/total").and_then(Value::as_u64).unwrap_or(0)),
        cover_url: Some(text("/images/0/url").unwrap_or_default()),
        link: text("/external_urls/spotify").unwrap_or_default(),
        top_artist: None,
    }
}

#[cfg(test)]
#[path = "pages_tests.rs"]
mod tests;
