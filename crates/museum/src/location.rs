// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use parking_lot::Mutex;
use url::Url;

/// The app's current location and navigation hand-off.
pub trait Location: Send + Sync {
    fn current(&self) -> Url;
    /// Rewrite the visible location without navigating (history replace).
    fn replace(&self, url: Url);
    /// Navigate away, e.g. to the provider's authorize page.
    fn assign(&self, url: Url);
}

/// In-process location. Records the last navigation target.
#[derive(Debug)]
pub struct MemoryLocation {
    current: Mutex<Url>,
    assigned: Mutex<Option<Url>>,
}

impl MemoryLocation {
    pub fn new(url: Url) -> Self {
        Self { current: Mutex::new(url), assigned: Mutex::new(None) }
    }

    /// Last URL handed to [`Location::assign`].
    pub fn assigned(&self) -> Option<Url> {
        self.assigned.lock().clone()
    }
}

impl Location for MemoryLocation {
    fn current(&self) -> Url {
        self.current.lock().clone()
    }

    fn replace(&self, url: Url) {
        *self.current.lock() = url;
    }

    fn assign(&self, url: Url) {
        *self.assigned.lock() = Some(url);
    }
}

/// Copy of `url` with the named query parameters removed.
pub fn strip_query_params(url: &Url, names: &[&str]) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !names.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    if kept.is_empty() {
        out.set_query(None);
    } else {
        out.query_pairs_mut().clear().extend_pairs(kept);
    }
    out
}

/// First value of a query parameter.
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
}

#[cfg(test)]
#[path = "location_tests.rs"]
mod tests;
