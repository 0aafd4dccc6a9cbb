// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::storage::MemoryStorage;

fn memory_store() -> (Store, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (Store::new(storage.clone()), storage)
}

fn session() -> AuthSession {
    AuthSession {
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        expires_at: 1_900_000_000_000,
        scope: "playlist-read-private".into(),
    }
}

fn entry(title: &str) -> PlaylistEntry {
    PlaylistEntry {
        title: title.into(),
        description: Some(String::new()),
        tracks: Some(10),
        cover_url: Some(String::new()),
        link: format!("https://open.spotify.com/playlist/{title}"),
        top_artist: None,
    }
}

#[test]
fn auth_round_trips() {
    let (store, _) = memory_store();
    assert_eq!(store.get_auth(), None);
    store.set_auth(&session());
    assert_eq!(store.get_auth(), Some(session()));
    store.clear_auth();
    assert_eq!(store.get_auth(), None);
}

#[test]
fn invalid_auth_write_is_a_no_op() {
    let (store, _) = memory_store();
    store.set_auth(&session());

    let mut invalid = session();
    invalid.access_token.clear();
    store.set_auth(&invalid);
    assert_eq!(store.get_auth(), Some(session()));

    let mut relative = session();
    relative.expires_at = 0;
    store.set_auth(&relative);
    assert_eq!(store.get_auth(), Some(session()));
}

#[test]
fn corrupt_records_read_as_absent() -> anyhow::Result<()> {
    let (store, storage) = memory_store();
    storage.set_item(AUTH_KEY, "{not json")?;
    storage.set_item(PENDING_KEY, "[1,2,3]")?;
    storage.set_item(CACHE_KEY, "{\"title\":\"x\"}")?;
    assert_eq!(store.get_auth(), None);
    assert_eq!(store.get_pending(), None);
    assert_eq!(store.get_cache(), None);
    Ok(())
}

#[test]
fn pending_round_trips_and_clears() {
    let (store, _) = memory_store();
    let pending = PendingAuthorization {
        state: "A".into(),
        code_verifier: "verifier".into(),
        refresh_token: None,
    };
    store.set_pending(&pending);
    assert_eq!(store.get_pending(), Some(pending));
    store.clear_pending();
    assert_eq!(store.get_pending(), None);
}

#[test]
fn cache_emptiness_collapses_to_absent() {
    let (store, storage) = memory_store();

    store.set_cache(Some(&[entry("a")]));
    store.set_cache(Some(&[]));
    assert_eq!(store.get_cache(), None);
    assert_eq!(storage.raw(CACHE_KEY), None);

    store.set_cache(Some(&[entry("a")]));
    store.set_cache(None);
    assert_eq!(store.get_cache(), None);
    assert_eq!(storage.raw(CACHE_KEY), None);
}

#[test]
fn cache_drops_invalid_entries_on_read() -> anyhow::Result<()> {
    let (store, storage) = memory_store();
    let raw = serde_json::json!([
        { "title": "keep", "link": "l1" },
        { "title": 5, "link": "l2" },
        { "title": "also", "link": "l3", "tracks": 4 },
    ]);
    storage.set_item(CACHE_KEY, &raw.to_string())?;

    let cache = store.get_cache().unwrap_or_default();
    let titles: Vec<&str> = cache.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, ["keep", "also"]);
    Ok(())
}

#[test]
fn all_invalid_cache_reads_as_absent() -> anyhow::Result<()> {
    let (store, storage) = memory_store();
    storage.set_item(CACHE_KEY, "[{\"title\":1},{\"link\":2}]")?;
    assert_eq!(store.get_cache(), None);
    Ok(())
}

#[test]
fn cache_preserves_order() {
    let (store, _) = memory_store();
    let entries = vec![entry("c"), entry("a"), entry("b")];
    store.set_cache(Some(&entries));
    assert_eq!(store.get_cache(), Some(entries));
}

#[test]
fn unavailable_storage_is_silent() {
    let store = Store::new(Arc::new(MemoryStorage::unavailable()));
    store.set_auth(&session());
    store.set_cache(Some(&[entry("a")]));
    store.clear_pending();
    assert_eq!(store.get_auth(), None);
    assert_eq!(store.get_cache(), None);
    assert_eq!(store.get_pending(), None);
}

#[test]
fn records_are_independent() {
    let (store, _) = memory_store();
    store.set_auth(&session());
    store.set_cache(Some(&[entry("a")]));
    store.clear_auth();
    assert!(store.get_cache().is_some());
}

mod properties {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn any_valid_session_round_trips(
            access in "[A-Za-z0-9._-]{1,64}",
            refresh in "[A-Za-z0-9._-]{0,64}",
            expires_at in 1u64..=4_102_444_800_000,
            scope in "[a-z -]{0,40}",
        ) {
            let (store, _) = memory_store();
            let session = AuthSession { access_token: access, refresh_token: refresh, expires_at, scope };
            store.set_auth(&session);
            prop_assert_eq!(store.get_auth(), Some(session));
        }
    }
}
