// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed persistence for the session, pending PKCE state, and catalog cache.
//!
//! Every getter validates shape and returns `None` on any failure. Every
//! setter is best-effort: invalid values and storage errors are logged and
//! dropped. Nothing here returns an error to the caller.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{AuthSession, PendingAuthorization, PlaylistEntry};
use crate::storage::{Storage, MAX_RECORD_BYTES};

pub const AUTH_KEY: &str = "digitalMuseum.spotifyAuth";
pub const PENDING_KEY: &str = "digitalMuseum.spotifyPkce";
pub const CACHE_KEY: &str = "digitalMuseum.cachedPlaylists";

/// The only component with write access to durable state.
#[derive(Clone)]
pub struct Store {
    storage: Arc<dyn Storage>,
}

impl Store {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    // -- Auth session ---------------------------------------------------------

    pub fn get_auth(&self) -> Option<AuthSession> {
        AuthSession::from_value(&self.read(AUTH_KEY)?)
    }

    pub fn set_auth(&self, session: &AuthSession) {
        if !session.is_valid() {
            debug!("refusing to persist invalid auth session");
            return;
        }
        self.write(AUTH_KEY, session);
    }

    pub fn clear_auth(&self) {
        self.remove(AUTH_KEY);
    }

    // -- Pending authorization ------------------------------------------------

    pub fn get_pending(&self) -> Option<PendingAuthorization> {
        PendingAuthorization::from_value(&self.read(PENDING_KEY)?)
    }

    pub fn set_pending(&self, pending: &PendingAuthorization) {
        if !pending.is_valid() {
            debug!("refusing to persist invalid pending authorization");
            return;
        }
        self.write(PENDING_KEY, pending);
    }

    pub fn clear_pending(&self) {
        self.remove(PENDING_KEY);
    }

    // -- Catalog cache --------------------------------------------------------

    /// Cached catalog. An empty or all-invalid record reads as absent.
    pub fn get_cache(&self) -> Option<Vec<PlaylistEntry>> {
        let value = self.read(CACHE_KEY)?;
        let entries = PlaylistEntry::filter_valid(value.as_array()?);
        (!entries.is_empty()).then_some(entries)
    }

    /// Replace the cache. `None` or an empty list deletes the key.
    pub fn set_cache(&self, entries: Option<&[PlaylistEntry]>) {
        match entries {
            Some(list) if !list.is_empty() => self.write(CACHE_KEY, list),
            _ => self.clear_cache(),
        }
    }

    pub fn clear_cache(&self) {
        self.remove(CACHE_KEY);
    }

    // -- Raw access -----------------------------------------------------------

    fn read(&self, key: &str) -> Option<Value> {
        let raw = match self.storage.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(key, err = %e, "storage read failed");
                return None;
            }
        };
        if raw.len() > MAX_RECORD_BYTES {
            warn!(key, bytes = raw.len(), "stored record too large, ignoring");
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, err = %e, "stored record is not valid JSON");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                warn!(key, err = %e, "failed to serialize record");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(key, &json) {
            debug!(key, err = %e, "storage write failed");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.storage.remove_item(key) {
            debug!(key, err = %e, "storage remove failed");
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
