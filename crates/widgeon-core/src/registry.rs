// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Widget registry: name → definition resolution, caching, enumeration and
//! per-widget asset lists.
//!
//! Definitions are pure functions of the widget source, so concurrent first
//! loads of the same name are allowed to race; the last writer wins and both
//! callers see equal values.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;
use widgeon_codec::PayloadCodec;

use crate::config::parse_widget_defaults;
use crate::definition::{WidgetDefinition, WidgetType};
use crate::error::WidgetError;
use crate::instance::{InstanceEnv, WidgetInstance};
use crate::naming::{is_safe_file_name, is_valid_widget_name, template_path};
use crate::request::RequestContext;
use crate::source::{AssetKind, SourceError, WidgetSource};
use crate::OptionMap;

/// Where asset links point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum AssetMode {
    /// Served by the widget engine under `/<mount>/<widget>/<dir>/<file>`.
    WidgetLocal,
    /// Served by the host under `<base>/<widget>/<dir>/<file>`.
    Static {
        /// URL prefix of the host's static files.
        base: String,
    },
}

/// Whether resolved definitions are reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Load once per process.
    Cache,
    /// Load again on every resolve (development).
    ReloadEachRequest,
}

/// Engine settings. Stored as the `engine` document; missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// URL segment the widget endpoints are mounted under.
    pub mount: String,
    /// Asset URL mode.
    pub asset_mode: AssetMode,
    /// Definition reuse policy.
    pub reload: ReloadPolicy,
    /// Initial value of the process-wide inline-styles toggle.
    pub inline_styles: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mount: "widgeon".into(),
            asset_mode: AssetMode::WidgetLocal,
            reload: ReloadPolicy::Cache,
            inline_styles: true,
        }
    }
}

/// Process-wide mutable registry state. Empty on startup.
#[derive(Debug, Default)]
struct RegistryState {
    definitions: RwLock<HashMap<String, Arc<WidgetDefinition>>>,
    listing: RwLock<Option<Arc<[String]>>>,
    inline_styles: AtomicBool,
}

/// Resolves widget names against a [`WidgetSource`] and creates instances.
pub struct Registry {
    source: Arc<dyn WidgetSource>,
    codec: Arc<PayloadCodec>,
    settings: Settings,
    state: RegistryState,
    types: HashMap<String, Arc<WidgetType>>,
    plain: Arc<WidgetType>,
}

impl Registry {
    /// Registry over `source`, signing with `codec`.
    pub fn new(source: Arc<dyn WidgetSource>, codec: PayloadCodec, settings: Settings) -> Self {
        let state = RegistryState::default();
        state
            .inline_styles
            .store(settings.inline_styles, Ordering::Relaxed);
        Self {
            source,
            codec: Arc::new(codec),
            settings,
            state,
            types: HashMap::new(),
            plain: Arc::new(WidgetType::new()),
        }
    }

    /// Attach behaviour to a widget name.
    pub fn register(&mut self, name: impl Into<String>, widget_type: WidgetType) -> &mut Self {
        let name = name.into();
        self.state
            .definitions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&name);
        self.types.insert(name, Arc::new(widget_type));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_type(mut self, name: impl Into<String>, widget_type: WidgetType) -> Self {
        self.register(name, widget_type);
        self
    }

    /// Engine settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Payload codec shared with instances.
    pub fn codec(&self) -> &PayloadCodec {
        &self.codec
    }

    /// Registered behaviour for `name`, or the plain type.
    pub fn widget_type(&self, name: &str) -> Arc<WidgetType> {
        self.types
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.plain))
    }

    /// Current value of the inline-styles toggle.
    pub fn inline_styles(&self) -> bool {
        self.state.inline_styles.load(Ordering::Relaxed)
    }

    /// Flip the inline-styles toggle for the whole process.
    pub fn set_inline_styles(&self, enabled: bool) {
        self.state.inline_styles.store(enabled, Ordering::Relaxed);
    }

    /// Resolve `name` to its definition, loading it on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<WidgetDefinition>, WidgetError> {
        if !is_valid_widget_name(name) {
            return Err(WidgetError::widget_not_found(name));
        }
        let cache = self.settings.reload == ReloadPolicy::Cache;
        if cache {
            let definitions = self
                .state
                .definitions
                .read()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(definition) = definitions.get(name) {
                return Ok(Arc::clone(definition));
            }
        }
        if !self.source.exists(name) {
            return Err(WidgetError::widget_not_found(name));
        }
        let definition = Arc::new(self.load(name, cache)?);
        if cache {
            self.state
                .definitions
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(name.to_owned(), Arc::clone(&definition));
        }
        Ok(definition)
    }

    /// Drop a cached definition so the next resolve reloads it.
    pub fn invalidate(&self, name: &str) {
        self.state
            .definitions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    fn load(&self, name: &str, cacheable: bool) -> Result<WidgetDefinition, WidgetError> {
        debug!(widget = name, "loading widget definition");
        let config_defaults = match self.source.load_config(name) {
            Ok(bytes) => parse_widget_defaults(&bytes)?,
            Err(SourceError::NotFound) => OptionMap::new(),
            Err(err) => return Err(err.into()),
        };
        let widget_type = self.widget_type(name);
        let stylesheets = match widget_type.explicit_stylesheets() {
            Some(names) => names.to_vec(),
            None => self.scan_assets(name, AssetKind::Stylesheet)?,
        };
        let scripts = match widget_type.explicit_scripts() {
            Some(names) => names.to_vec(),
            None => self.scan_assets(name, AssetKind::Script)?,
        };
        let inline_style = match self.source.read_inline_style(name) {
            Ok(css) => Some(css),
            Err(SourceError::NotFound) => None,
            Err(err) => return Err(err.into()),
        };
        Ok(WidgetDefinition {
            name: name.to_owned(),
            config_defaults,
            stylesheets,
            scripts,
            template_path: template_path(name, None),
            cacheable,
            inline_style,
        })
    }

    fn scan_assets(&self, name: &str, kind: AssetKind) -> Result<Vec<String>, WidgetError> {
        let mut files = match self.source.list_assets(name, kind) {
            Ok(files) => files,
            Err(SourceError::NotFound) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        files.sort();
        Ok(files)
    }

    /// All installed widget names, sorted. Scanned once.
    pub fn list_all(&self) -> Result<Arc<[String]>, WidgetError> {
        if let Some(listing) = self
            .state
            .listing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return Ok(Arc::clone(listing));
        }
        let mut names: Vec<String> = self
            .source
            .list()?
            .into_iter()
            .filter(|n| is_valid_widget_name(n))
            .collect();
        names.sort();
        names.dedup();
        let listing: Arc<[String]> = names.into();
        debug!(count = listing.len(), "scanned installed widgets");
        *self
            .state
            .listing
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&listing));
        Ok(listing)
    }

    /// Asset basenames of one kind for a widget, in link order.
    pub fn assets_for(&self, name: &str, kind: AssetKind) -> Result<Vec<String>, WidgetError> {
        let definition = self.resolve(name)?;
        Ok(match kind {
            AssetKind::Stylesheet => definition.stylesheets.clone(),
            AssetKind::Script => definition.scripts.clone(),
        })
    }

    /// Stylesheet basenames for a widget.
    pub fn stylesheets_for(&self, name: &str) -> Result<Vec<String>, WidgetError> {
        self.assets_for(name, AssetKind::Stylesheet)
    }

    /// Script basenames for a widget.
    pub fn scripts_for(&self, name: &str) -> Result<Vec<String>, WidgetError> {
        self.assets_for(name, AssetKind::Script)
    }

    /// Contents of `<file>.<ext>` from a widget's asset directory. `file` may
    /// carry the extension; anything that is not a plain basename is absent.
    pub fn read_asset(&self, name: &str, kind: AssetKind, file: &str) -> Result<Vec<u8>, WidgetError> {
        self.resolve(name)?;
        let stem = file
            .strip_suffix(kind.extension())
            .and_then(|s| s.strip_suffix('.'))
            .unwrap_or(file);
        let missing = || WidgetError::asset_not_found(format!("{name}/{}/{file}", kind.dir()));
        if !is_safe_file_name(stem) {
            return Err(missing());
        }
        match self.source.read_asset(name, kind, stem) {
            Ok(bytes) => Ok(bytes),
            Err(SourceError::NotFound) => Err(missing()),
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve `name` and construct an instance for `ctx`.
    pub fn create(
        &self,
        name: &str,
        ctx: &RequestContext<'_>,
        options: OptionMap,
    ) -> Result<WidgetInstance, WidgetError> {
        self.instantiate(name, ctx, options, false)
    }

    pub(crate) fn instantiate(
        &self,
        name: &str,
        ctx: &RequestContext<'_>,
        options: OptionMap,
        callback_active: bool,
    ) -> Result<WidgetInstance, WidgetError> {
        let definition = self.resolve(name)?;
        let env = InstanceEnv {
            codec: Arc::clone(&self.codec),
            mount: self.settings.mount.clone(),
            inline_styles: self.inline_styles(),
        };
        WidgetInstance::build(
            env,
            definition,
            self.widget_type(name),
            ctx,
            options,
            callback_active,
        )
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("settings", &self.settings)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Fixture {
        widgets: BTreeMap<&'static str, Option<&'static str>>,
        loads: AtomicUsize,
    }

    impl WidgetSource for Fixture {
        fn exists(&self, name: &str) -> bool {
            self.widgets.contains_key(name)
        }

        fn list(&self) -> Result<Vec<String>, SourceError> {
            Ok(self.widgets.keys().rev().map(|s| (*s).to_owned()).collect())
        }

        fn load_config(&self, name: &str) -> Result<Vec<u8>, SourceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match self.widgets.get(name) {
                Some(Some(yaml)) => Ok(yaml.as_bytes().to_vec()),
                _ => Err(SourceError::NotFound),
            }
        }

        fn list_assets(&self, _name: &str, kind: AssetKind) -> Result<Vec<String>, SourceError> {
            match kind {
                AssetKind::Stylesheet => Ok(vec!["b".into(), "a".into()]),
                AssetKind::Script => Err(SourceError::NotFound),
            }
        }

        fn read_asset(&self, _name: &str, _kind: AssetKind, file: &str) -> Result<Vec<u8>, SourceError> {
            if file == "a" {
                Ok(b"body{}".to_vec())
            } else {
                Err(SourceError::NotFound)
            }
        }

        fn read_inline_style(&self, _name: &str) -> Result<String, SourceError> {
            Err(SourceError::NotFound)
        }
    }

    fn registry(reload: ReloadPolicy) -> (Arc<Fixture>, Registry) {
        let mut fixture = Fixture::default();
        fixture.widgets.insert("hello_world", Some("greeting: Hello World!\n"));
        fixture.widgets.insert("bare", None);
        let fixture = Arc::new(fixture);
        let settings = Settings {
            reload,
            ..Settings::default()
        };
        let codec = PayloadCodec::from_secret("registry").unwrap();
        let registry = Registry::new(Arc::clone(&fixture) as Arc<dyn WidgetSource>, codec, settings);
        (fixture, registry)
    }

    #[test]
    fn resolve_caches_definitions() {
        let (fixture, registry) = registry(ReloadPolicy::Cache);
        let first = registry.resolve("hello_world").unwrap();
        let second = registry.resolve("hello_world").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fixture.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.config_defaults["greeting"], "Hello World!");
        assert_eq!(first.template_path, "widgets/hello_world/hello_world_widget");
        assert!(first.cacheable);
    }

    #[test]
    fn reload_policy_loads_every_time() {
        let (fixture, registry) = registry(ReloadPolicy::ReloadEachRequest);
        registry.resolve("hello_world").unwrap();
        registry.resolve("hello_world").unwrap();
        assert_eq!(fixture.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_config_means_no_defaults() {
        let (_, registry) = registry(ReloadPolicy::Cache);
        assert!(registry.resolve("bare").unwrap().config_defaults.is_empty());
    }

    #[test]
    fn unknown_and_invalid_names_are_not_found() {
        let (_, registry) = registry(ReloadPolicy::Cache);
        for name in ["hello_wor", "../hello_world", "Hello", ""] {
            assert!(registry.resolve(name).unwrap_err().is_not_found(), "{name}");
        }
    }

    #[test]
    fn scanned_assets_are_sorted_and_missing_dirs_are_empty() {
        let (_, registry) = registry(ReloadPolicy::Cache);
        assert_eq!(registry.stylesheets_for("bare").unwrap(), ["a", "b"]);
        assert!(registry.scripts_for("bare").unwrap().is_empty());
    }

    #[test]
    fn explicit_asset_subset_wins() {
        let (_, registry) = registry(ReloadPolicy::Cache);
        let registry = registry.with_type("bare", WidgetType::new().stylesheets(["b"]));
        assert_eq!(registry.stylesheets_for("bare").unwrap(), ["b"]);
    }

    #[test]
    fn listing_is_sorted() {
        let (_, registry) = registry(ReloadPolicy::Cache);
        assert_eq!(&*registry.list_all().unwrap(), ["bare", "hello_world"]);
    }

    #[test]
    fn read_asset_accepts_extension_and_rejects_traversal() {
        let (_, registry) = registry(ReloadPolicy::Cache);
        let kind = AssetKind::Stylesheet;
        assert_eq!(registry.read_asset("bare", kind, "a.css").unwrap(), b"body{}");
        assert_eq!(registry.read_asset("bare", kind, "a").unwrap(), b"body{}");
        assert!(registry.read_asset("bare", kind, "../a").unwrap_err().is_not_found());
        assert!(registry.read_asset("bare", kind, "zzz.css").unwrap_err().is_not_found());
        assert!(registry.read_asset("nope", kind, "a.css").unwrap_err().is_not_found());
    }

    #[test]
    fn inline_toggle_is_process_wide() {
        let (_, registry) = registry(ReloadPolicy::Cache);
        assert!(registry.inline_styles());
        registry.set_inline_styles(false);
        assert!(!registry.inline_styles());
    }
}
