// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory widget source.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use widgeon_core::{AssetKind, SourceError, WidgetSource};

/// Widget directories held in memory.
///
/// Clones share state. Counts config loads so tests can observe caching, and
/// can be told to fail reads.
#[derive(Clone, Default)]
pub struct InMemoryWidgetSource {
    inner: Arc<Mutex<SourceInner>>,
}

#[derive(Default)]
struct SourceInner {
    widgets: BTreeMap<String, WidgetFiles>,
    config_loads: usize,
    fail_on_read: bool,
}

#[derive(Default, Clone)]
struct WidgetFiles {
    config: Option<Vec<u8>>,
    assets: BTreeMap<(AssetKind, String), Vec<u8>>,
    inline_style: Option<String>,
}

impl InMemoryWidgetSource {
    /// No widgets.
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(&self, name: &str, f: impl FnOnce(&mut WidgetFiles)) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(inner.widgets.entry(name.to_owned()).or_default());
    }

    /// Add an empty widget directory.
    pub fn with_widget(self, name: &str) -> Self {
        self.edit(name, |_| {});
        self
    }

    /// Add a widget with a YAML config document.
    pub fn with_config(self, name: &str, yaml: &str) -> Self {
        self.edit(name, |w| w.config = Some(yaml.as_bytes().to_vec()));
        self
    }

    /// Add an asset file (`file` without extension).
    pub fn with_asset(self, name: &str, kind: AssetKind, file: &str, body: &str) -> Self {
        self.edit(name, |w| {
            w.assets
                .insert((kind, file.to_owned()), body.as_bytes().to_vec());
        });
        self
    }

    /// Give a widget its own stylesheet.
    pub fn with_inline_style(self, name: &str, css: &str) -> Self {
        self.edit(name, |w| w.inline_style = Some(css.to_owned()));
        self
    }

    /// Make every read fail with an I/O-style error.
    pub fn set_fail_on_read(&self, fail: bool) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fail_on_read = fail;
    }

    /// Number of `load_config` calls.
    pub fn config_loads(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .config_loads
    }

    fn with_files<T>(
        &self,
        name: &str,
        f: impl FnOnce(&WidgetFiles) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.fail_on_read {
            return Err(SourceError::Other("simulated read failure".into()));
        }
        inner.widgets.get(name).ok_or(SourceError::NotFound).and_then(f)
    }
}

impl WidgetSource for InMemoryWidgetSource {
    fn exists(&self, name: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .widgets
            .contains_key(name)
    }

    fn list(&self) -> Result<Vec<String>, SourceError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .widgets
            .keys()
            .cloned()
            .collect())
    }

    fn load_config(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .config_loads += 1;
        self.with_files(name, |w| w.config.clone().ok_or(SourceError::NotFound))
    }

    fn list_assets(&self, name: &str, kind: AssetKind) -> Result<Vec<String>, SourceError> {
        self.with_files(name, |w| {
            // Reverse order so callers cannot rely on the source for sorting.
            Ok(w.assets
                .keys()
                .filter(|(k, _)| *k == kind)
                .rev()
                .map(|(_, file)| file.clone())
                .collect())
        })
    }

    fn read_asset(&self, name: &str, kind: AssetKind, file: &str) -> Result<Vec<u8>, SourceError> {
        self.with_files(name, |w| {
            w.assets
                .get(&(kind, file.to_owned()))
                .cloned()
                .ok_or(SourceError::NotFound)
        })
    }

    fn read_inline_style(&self, name: &str) -> Result<String, SourceError> {
        self.with_files(name, |w| w.inline_style.clone().ok_or(SourceError::NotFound))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_populates_widgets() {
        let source = InMemoryWidgetSource::new()
            .with_config("w", "a: 1")
            .with_asset("w", AssetKind::Stylesheet, "s1", "body{}")
            .with_asset("w", AssetKind::Script, "j1", "1;");
        assert!(source.exists("w"));
        assert_eq!(source.list_assets("w", AssetKind::Stylesheet).unwrap(), ["s1"]);
        assert_eq!(source.read_asset("w", AssetKind::Script, "j1").unwrap(), b"1;");
        assert_eq!(source.load_config("w").unwrap(), b"a: 1");
        assert_eq!(source.config_loads(), 1);
        assert!(matches!(
            source.read_inline_style("w"),
            Err(SourceError::NotFound)
        ));
    }

    #[test]
    fn read_failures_are_injected() {
        let source = InMemoryWidgetSource::new().with_widget("w");
        source.set_fail_on_read(true);
        assert!(matches!(source.load_config("w"), Err(SourceError::Other(_))));
    }
}
