// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Configuration: persisted settings documents and per-widget defaults.
//!
//! Two unrelated documents live here:
//!
//! * settings documents ([`Settings`], server prefs) are JSON stored under a
//!   fixed key through a [`ConfigStore`]. [`ConfigService`] fills in missing
//!   documents with their defaults and refuses ones that fail
//!   [`SettingsDocument::validate`];
//! * widget defaults are the YAML document shipped in a widget directory,
//!   parsed once by [`parse_widget_defaults`] into the option map whose keys
//!   become attribute names.
//!
//! [`Settings`]: crate::Settings

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::WidgetError;
use crate::registry::{AssetMode, Settings};
use crate::OptionMap;

/// Where settings documents are kept, as raw bytes per key.
pub trait ConfigStore {
    /// Bytes stored under `key`; [`ConfigError::NotFound`] when there are none.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Replace the bytes stored under `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Settings storage and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing stored under the key.
    #[error("not found")]
    NotFound,
    /// The store cannot be used at all (no config directory, injected failure).
    #[error("config store unavailable: {0}")]
    Unavailable(String),
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The stored bytes are not a JSON document of the expected shape.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The document parsed but holds a value the engine cannot run with.
    #[error("invalid `{key}` settings: {reason}")]
    Invalid {
        /// Document key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// A settings document with a fixed key and its own sanity checks.
pub trait SettingsDocument: Serialize + DeserializeOwned + Default {
    /// Key the document is stored under.
    const KEY: &'static str;

    /// Reject values the engine cannot run with.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl SettingsDocument for Settings {
    const KEY: &'static str = "engine";

    fn validate(&self) -> Result<(), String> {
        validate_mount(&self.mount)?;
        if let AssetMode::Static { base } = &self.asset_mode {
            if base.trim().is_empty() {
                return Err("static asset base must not be empty".into());
            }
        }
        Ok(())
    }
}

/// Mount points are a single URL segment of `[A-Za-z0-9_-]`.
pub fn validate_mount(mount: &str) -> Result<(), String> {
    if mount.is_empty()
        || !mount
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(format!("mount `{mount}` must be a single URL segment"));
    }
    Ok(())
}

/// Typed access to settings documents in a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Deserialize the value under `key`; `Ok(None)` if missing or empty.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize `value` as pretty JSON under `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Load and validate `T`, writing its defaults first when nothing is stored.
    pub fn load_document<T: SettingsDocument>(&self) -> Result<T, ConfigError> {
        let document = match self.load(T::KEY)? {
            Some(document) => document,
            None => {
                let document = T::default();
                self.save(T::KEY, &document)?;
                document
            }
        };
        check(&document)?;
        Ok(document)
    }

    /// Validate and store `document`.
    pub fn save_document<T: SettingsDocument>(&self, document: &T) -> Result<(), ConfigError> {
        check(document)?;
        self.save(T::KEY, document)
    }
}

fn check<T: SettingsDocument>(document: &T) -> Result<(), ConfigError> {
    document
        .validate()
        .map_err(|reason| ConfigError::Invalid { key: T::KEY, reason })
}

/// Parse a widget's YAML defaults document.
///
/// An empty (or all-comment) document means "no defaults". Anything but a
/// mapping with string keys at the top level is a [`WidgetError::Format`].
pub fn parse_widget_defaults(bytes: &[u8]) -> Result<OptionMap, WidgetError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(OptionMap::new());
    }
    let value: Value = serde_yaml::from_slice(bytes)
        .map_err(|err| WidgetError::Format(format!("widget config: {err}")))?;
    match value {
        Value::Null => Ok(OptionMap::new()),
        Value::Object(map) => Ok(map),
        _ => Err(WidgetError::Format(
            "widget config must be a mapping at the top level".into(),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_mapping_becomes_defaults() {
        let defaults =
            parse_widget_defaults(b"greeting: Hello World!\ncount: 3\ntags: [a, b]\n").unwrap();
        assert_eq!(defaults["greeting"], json!("Hello World!"));
        assert_eq!(defaults["count"], json!(3));
        assert_eq!(defaults["tags"], json!(["a", "b"]));
    }

    #[test]
    fn empty_or_comment_only_document_has_no_defaults() {
        assert!(parse_widget_defaults(b"").unwrap().is_empty());
        assert!(parse_widget_defaults(b"  \n").unwrap().is_empty());
        assert!(parse_widget_defaults(b"# nothing yet\n").unwrap().is_empty());
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let err = parse_widget_defaults(b"- one\n- two\n").unwrap_err();
        assert!(matches!(err, WidgetError::Format(_)));
    }

    #[test]
    fn mounts_are_single_segments() {
        assert!(validate_mount("widgeon").is_ok());
        assert!(validate_mount("my-widgets_2").is_ok());
        assert!(validate_mount("").is_err());
        assert!(validate_mount("a/b").is_err());
        assert!(validate_mount("a b").is_err());
    }

    #[test]
    fn engine_settings_validate_static_base() {
        assert!(Settings::default().validate().is_ok());
        let settings = Settings {
            asset_mode: AssetMode::Static { base: " ".into() },
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn broken_yaml_is_rejected() {
        let err = parse_widget_defaults(b"greeting: [unclosed\n").unwrap_err();
        assert!(matches!(err, WidgetError::Format(_)));
    }
}
