// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backing key-value media for the persistent store.
//!
//! Only [`crate::store::Store`] talks to these. Everything is string in,
//! string out; shape validation happens one level up.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::StorageError;

/// Largest raw record read before parsing. Anything bigger is treated as absent.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

/// Raw string key-value medium.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage. Can be built unavailable to model blocked storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    unavailable: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that fails every operation.
    pub fn unavailable() -> Self {
        Self { items: Mutex::new(HashMap::new()), unavailable: true }
    }

    /// Raw value for a key, bypassing validation.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.items.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.items.lock().remove(key);
        Ok(())
    }
}

/// One JSON file per key under a state directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    /// Files over [`MAX_RECORD_BYTES`] read as absent without being loaded.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        let mut file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();
        if len > MAX_RECORD_BYTES as u64 {
            warn!(path = %path.display(), bytes = len, "stored file too large, ignoring");
            return Ok(None);
        }
        let mut contents = String::with_capacity(len as usize);
        file.read_to_string(&mut contents)?;
        Ok(Some(contents))
    }

    /// Atomic write (write tmp + rename).
    ///
    /// The temp name carries PID and a counter so concurrent writers never
    /// share a `.tmp` file.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, value)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolve the default state directory.
///
/// Checks `MUSEUM_STATE_DIR`, then `$XDG_STATE_HOME/museum`,
/// then `$HOME/.local/state/museum`.
pub fn default_state_dir() -> PathBuf {
    state_dir_with(|name| std::env::var(name).ok())
}

pub(crate) fn state_dir_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = env("MUSEUM_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = env("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("museum");
    }
    if let Some(home) = env("HOME") {
        return PathBuf::from(home).join(".local/state/museum");
    }
    PathBuf::from(".museum")
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
