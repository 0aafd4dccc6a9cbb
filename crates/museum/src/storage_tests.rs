// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> =
        vars.iter().map(|&(k, v)| (k.to_owned(), v.to_owned())).collect();
    move |name: &str| map.get(name).cloned()
}

#[test]
fn file_storage_round_trips_and_removes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let storage = FileStorage::new(tmp.path().join("nested"));

    assert_eq!(storage.get_item("digitalMuseum.spotifyAuth")?, None);
    storage.set_item("digitalMuseum.spotifyAuth", "{\"a\":1}")?;
    assert_eq!(storage.get_item("digitalMuseum.spotifyAuth")?.as_deref(), Some("{\"a\":1}"));

    storage.set_item("digitalMuseum.spotifyAuth", "{}")?;
    assert_eq!(storage.get_item("digitalMuseum.spotifyAuth")?.as_deref(), Some("{}"));

    storage.remove_item("digitalMuseum.spotifyAuth")?;
    assert_eq!(storage.get_item("digitalMuseum.spotifyAuth")?, None);
    // Removing a missing key is fine.
    storage.remove_item("digitalMuseum.spotifyAuth")?;
    Ok(())
}

#[test]
fn file_storage_ignores_oversized_file() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let storage = FileStorage::new(tmp.path());
    std::fs::write(storage.path_for("big"), "x".repeat(MAX_RECORD_BYTES + 1))?;
    assert_eq!(storage.get_item("big")?, None);

    std::fs::write(storage.path_for("fits"), "x".repeat(MAX_RECORD_BYTES))?;
    assert_eq!(storage.get_item("fits")?.map(|s| s.len()), Some(MAX_RECORD_BYTES));
    Ok(())
}

#[test]
fn file_storage_leaves_no_temp_files() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let storage = FileStorage::new(tmp.path());
    storage.set_item("k", "v1")?;
    storage.set_item("k", "v2")?;

    let names: Vec<String> = std::fs::read_dir(tmp.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["k.json".to_owned()]);
    Ok(())
}

#[test]
fn file_storage_sanitizes_key_into_file_name() {
    let storage = FileStorage::new("/state");
    assert_eq!(storage.path_for("a/b:c"), PathBuf::from("/state/a_b_c.json"));
}

#[test]
fn unavailable_memory_storage_fails_every_call() {
    let storage = MemoryStorage::unavailable();
    assert!(storage.get_item("k").is_err());
    assert!(storage.set_item("k", "v").is_err());
    assert!(storage.remove_item("k").is_err());
}

#[test]
fn state_dir_prefers_explicit_override() {
    let dir = state_dir_with(env_from(&[
        ("MUSEUM_STATE_DIR", "/custom"),
        ("XDG_STATE_HOME", "/xdg"),
        ("HOME", "/home/u"),
    ]));
    assert_eq!(dir, PathBuf::from("/custom"));
}

#[test]
fn state_dir_falls_back_through_xdg_and_home() {
    assert_eq!(
        state_dir_with(env_from(&[("XDG_STATE_HOME", "/xdg"), ("HOME", "/home/u")])),
        PathBuf::from("/xdg/museum")
    );
    assert_eq!(
        state_dir_with(env_from(&[("HOME", "/home/u")])),
        PathBuf::from("/home/u/.local/state/museum")
    );
    assert_eq!(state_dir_with(env_from(&[])), PathBuf::from(".museum"));
}
