// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory settings store for tests that should not touch the filesystem.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use widgeon_core::config::{ConfigError, ConfigStore};

/// [`ConfigStore`] over a map of JSON documents.
///
/// Clones share storage, so a test can keep one handle for assertions while
/// the service under test owns another.
///
/// # Example
///
/// ```
/// use widgeon_core::config::ConfigService;
/// use widgeon_core::Settings;
/// use widgeon_dry_tests::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new().with_document("engine", &serde_json::json!({"mount": "w"}));
/// let settings: Settings = ConfigService::new(store.clone()).load_document().unwrap();
/// assert_eq!(settings.mount, "w");
/// assert_eq!(store.save_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    unavailable: bool,
}

impl InMemoryConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `document` as JSON under `key` without counting a save.
    ///
    /// Values that do not serialize are stored as an empty document.
    pub fn with_document<T: Serialize>(self, key: &str, document: &T) -> Self {
        let bytes = serde_json::to_vec(document).unwrap_or_default();
        self.lock().documents.insert(key.to_owned(), bytes);
        self
    }

    /// Store raw bytes under `key`, for documents that are not valid JSON.
    pub fn with_raw(self, key: &str, bytes: &[u8]) -> Self {
        self.lock().documents.insert(key.to_owned(), bytes.to_vec());
        self
    }

    /// Make every load and save fail with [`ConfigError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Number of `load_raw` attempts, failed ones included.
    pub fn load_count(&self) -> usize {
        self.lock().load_count
    }

    /// Number of `save_raw` attempts, failed ones included.
    pub fn save_count(&self) -> usize {
        self.lock().save_count
    }

    /// The document under `key`, parsed; `None` when absent or not JSON.
    pub fn document(&self, key: &str) -> Option<Value> {
        let inner = self.lock();
        let bytes = inner.documents.get(key)?;
        serde_json::from_slice(bytes).ok()
    }

    /// Whether anything is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().documents.contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut inner = self.lock();
        inner.load_count += 1;
        if inner.unavailable {
            return Err(ConfigError::Unavailable("simulated outage".into()));
        }
        inner
            .documents
            .get(key)
            .cloned()
            .ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.lock();
        inner.save_count += 1;
        if inner.unavailable {
            return Err(ConfigError::Unavailable("simulated outage".into()));
        }
        inner.documents.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}
