// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session store fake.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use widgeon_core::{OptionMap, SessionStore};

/// Session whose clones share one map; counts writes.
#[derive(Clone, Default)]
pub struct MemorySession {
    inner: Arc<Mutex<SessionInner>>,
}

#[derive(Default)]
struct SessionInner {
    data: HashMap<String, OptionMap>,
    store_count: usize,
}

impl MemorySession {
    /// Empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value under `key`.
    pub fn get(&self, key: &str) -> Option<OptionMap> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .data
            .get(key)
            .cloned()
    }

    /// Keys present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .data
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of `store` calls.
    pub fn store_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .store_count
    }
}

impl SessionStore for MemorySession {
    fn load(&self, key: &str) -> Option<OptionMap> {
        self.get(key)
    }

    fn store(&mut self, key: &str, value: OptionMap) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.store_count += 1;
        inner.data.insert(key.to_owned(), value);
    }

    fn remove(&mut self, key: &str) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .data
            .remove(key);
    }
}
