// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog reconciliation: authenticated pages, the static fallback
//! document, and the cache, merged into one displayed view.
//!
//! Each load takes a generation number and a cancellation token. Starting a
//! new load cancels the previous one, and a result is only committed while
//! its generation is still current, so a late response never overwrites a
//! newer one.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fallback::FallbackSource;
use crate::model::PlaylistEntry;
use crate::pages::{entry_from_item, Page, PlaylistClient};
use crate::store::Store;

/// What the display layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogView {
    pub entries: Vec<PlaylistEntry>,
    pub error: Option<String>,
    pub loading: bool,
}

/// Handle for one started load.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    cancel: CancellationToken,
    access_token: Option<String>,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Default)]
struct Inner {
    generation: u64,
    cancel: Option<CancellationToken>,
}

pub struct CatalogLoader {
    store: Store,
    playlists: PlaylistClient,
    fallback: FallbackSource,
    inner: Mutex<Inner>,
    view_tx: watch::Sender<CatalogView>,
}

impl CatalogLoader {
    /// The initial view shows the cache, if any.
    pub fn new(store: Store, playlists: PlaylistClient, fallback: FallbackSource) -> Arc<Self> {
        let initial = CatalogView { entries: store.get_cache().unwrap_or_default(), ..Default::default() };
        let (view_tx, _) = watch::channel(initial);
        Arc::new(Self { store, playlists, fallback, inner: Mutex::new(Inner::default()), view_tx })
    }

    pub fn view(&self) -> CatalogView {
        self.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CatalogView> {
        self.view_tx.subscribe()
    }

    /// Enter the loaded phase and run the load to completion.
    pub async fn load(&self, access_token: Option<String>) {
        let ticket = self.begin(access_token);
        self.run(ticket).await;
    }

    /// Start a load, superseding any in flight. Cheap and synchronous so the
    /// order of calls fixes the order of generations.
    pub fn begin(&self, access_token: Option<String>) -> LoadTicket {
        let mut inner = self.inner.lock();
        if let Some(prev) = inner.cancel.take() {
            prev.cancel();
        }
        inner.generation += 1;
        let cancel = CancellationToken::new();
        inner.cancel = Some(cancel.clone());
        LoadTicket { generation: inner.generation, cancel, access_token }
    }

    pub async fn run(&self, ticket: LoadTicket) {
        match ticket.access_token.clone() {
            None => self.run_unauthenticated(&ticket).await,
            Some(token) => self.run_authenticated(&ticket, &token).await,
        }
    }

    /// Leave the loaded phase: cancel anything in flight and clear transient
    /// flags. Entries stay as they are.
    pub fn leave(&self) {
        self.supersede();
        self.view_tx.send_if_modified(|view| {
            let changed = view.loading || view.error.is_some();
            view.loading = false;
            view.error = None;
            changed
        });
    }

    /// Cancel anything in flight and show the cache (or nothing).
    pub fn show_cache(&self) {
        self.supersede();
        let cached = self.store.get_cache().unwrap_or_default();
        self.view_tx.send_modify(|view| {
            *view = CatalogView { entries: cached, ..Default::default() };
        });
    }

    fn supersede(&self) {
        let mut inner = self.inner.lock();
        if let Some(prev) = inner.cancel.take() {
            prev.cancel();
        }
        inner.generation += 1;
    }

    async fn run_unauthenticated(&self, ticket: &LoadTicket) {
        let entries = match self.fallback.fetch(&ticket.cancel).await {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => self.store.get_cache().unwrap_or_default(),
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                debug!(err = %e, "fallback document unavailable, using cache");
                self.store.get_cache().unwrap_or_default()
            }
        };
        self.commit(ticket, |view| {
            *view = CatalogView { entries, ..Default::default() };
        });
    }

    async fn run_authenticated(&self, ticket: &LoadTicket, access_token: &str) {
        self.commit(ticket, |view| {
            view.loading = true;
            view.error = None;
        });

        let (doc, pages) = tokio::join!(
            self.fallback.fetch(&ticket.cancel),
            self.playlists.fetch_all_pages(access_token, &ticket.cancel),
        );
        if ticket.cancel.is_cancelled() {
            return;
        }

        match pages {
            Ok(page) => {
                let doc = doc.unwrap_or_else(|e| {
                    debug!(err = %e, "fallback document unavailable, skipping enrichment");
                    Vec::new()
                });
                let entries = enrich(first_half(&page), &doc);
                info!(total = page.total, kept = entries.len(), "catalog loaded");
                let store = self.store.clone();
                self.commit_with(ticket, || store.set_cache(Some(&entries)), |view| {
                    *view = CatalogView { entries: entries.clone(), ..Default::default() };
                });
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                warn!(err = %e, status = ?e.http_status(), "catalog fetch failed, using cache");
                let cached = self.store.get_cache().unwrap_or_default();
                self.commit(ticket, |view| {
                    *view = CatalogView { entries: cached, error: Some(e.to_string()), loading: false };
                });
            }
        }
    }

    fn commit(&self, ticket: &LoadTicket, update: impl FnOnce(&mut CatalogView)) -> bool {
        self.commit_with(ticket, || {}, update)
    }

    /// Apply `effect` and `update` only if `ticket` is still the newest load.
    fn commit_with(
        &self,
        ticket: &LoadTicket,
        effect: impl FnOnce(),
        update: impl FnOnce(&mut CatalogView),
    ) -> bool {
        let inner = self.inner.lock();
        if inner.generation != ticket.generation || ticket.cancel.is_cancelled() {
            debug!(generation = ticket.generation, "discarding superseded catalog result");
            return false;
        }
        effect();
        self.view_tx.send_modify(update);
        true
    }
}

/// The first `floor(total / 2)` items, in server order.
pub fn first_half(page: &Page) -> Vec<PlaylistEntry> {
    let half = usize::try_from(page.total / 2).unwrap_or(usize::MAX);
    page.items.iter().take(half).map(entry_from_item).collect()
}

/// Copy `topArtist` from the fallback document onto entries with the same title.
pub fn enrich(mut entries: Vec<PlaylistEntry>, doc: &[PlaylistEntry]) -> Vec<PlaylistEntry> {
    for entry in &mut entries {
        if let Some(artist) = doc
            .iter()
            .find(|d| d.title == entry.title)
            .and_then(|d| d.top_artist.clone())
            .filter(|a| !a.is_empty())
        {
            entry.top_artist = Some(artist);
        }
    }
    entries
}

/// Restart the catalog load whenever the access token or the entered phase
/// changes. Outside the loaded phase a lost token shows the cache.
pub fn spawn_catalog_follower(
    loader: Arc<CatalogLoader>,
    mut tokens: watch::Receiver<Option<String>>,
    mut entered: watch::Receiver<bool>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<(Option<String>, bool)> = None;
        loop {
            let snapshot = (tokens.borrow_and_update().clone(), *entered.borrow_and_update());
            if last.as_ref() != Some(&snapshot) {
                let (token, is_entered) = snapshot.clone();
                let was_entered = last.as_ref().is_some_and(|(_, e)| *e);
                if is_entered {
                    let ticket = loader.begin(token);
                    let l = Arc::clone(&loader);
                    tokio::spawn(async move { l.run(ticket).await });
                } else if was_entered {
                    loader.leave();
                } else if token.is_none() && last.is_some() {
                    loader.show_cache();
                }
                last = Some(snapshot);
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                r = tokens.changed() => if r.is_err() { break },
                r = entered.changed() => if r.is_err() { break },
            }
        }
        loader.leave();
    })
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
