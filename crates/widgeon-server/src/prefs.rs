// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted server preferences and their command-line overrides.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use widgeon_core::config::{
    validate_mount, ConfigError, ConfigService, ConfigStore, SettingsDocument,
};
use widgeon_core::{AssetMode, ReloadPolicy, Settings};

use crate::app::SessionLimits;

/// Config key the preferences are stored under.
pub const PREFS_KEY: &str = "server_prefs";

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Widgeon widget server")]
pub struct Args {
    /// TCP listener (e.g. 127.0.0.1:8787)
    #[arg(long)]
    pub listen: Option<SocketAddr>,
    /// Directory holding one sub-directory per widget
    #[arg(long)]
    pub widgets_root: Option<PathBuf>,
    /// URL segment the widget endpoints are mounted under
    #[arg(long)]
    pub mount: Option<String>,
    /// Link assets under this URL prefix instead of serving them
    #[arg(long)]
    pub static_assets: Option<String>,
    /// Link widget stylesheets instead of inlining them
    #[arg(long)]
    pub no_inline_styles: bool,
    /// Reload widget definitions on every request
    #[arg(long)]
    pub reload_each_request: bool,
    /// Read and write preferences here instead of the platform config dir
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
}

/// Server preferences as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerPrefs {
    pub listen: SocketAddr,
    pub widgets_root: PathBuf,
    pub mount: String,
    pub asset_mode: AssetMode,
    pub inline_styles: bool,
    pub reload: ReloadPolicy,
    /// Upper bound on sessions held in memory.
    pub max_sessions: usize,
    /// Seconds a session may sit unused before it is dropped.
    pub session_idle_secs: u64,
}

impl Default for ServerPrefs {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            widgets_root: PathBuf::from("widgets"),
            mount: settings.mount,
            asset_mode: settings.asset_mode,
            inline_styles: settings.inline_styles,
            reload: settings.reload,
            max_sessions: 10_000,
            session_idle_secs: 30 * 60,
        }
    }
}

impl ServerPrefs {
    /// Stored preferences (written with defaults when absent), then flags.
    ///
    /// Flags are validated like the stored document but never saved.
    pub fn load<S: ConfigStore>(store: S, args: &Args) -> Result<Self, ConfigError> {
        let mut prefs: Self = ConfigService::new(store).load_document()?;
        prefs.apply(args);
        prefs.validate().map_err(|reason| ConfigError::Invalid {
            key: PREFS_KEY,
            reason,
        })?;
        Ok(prefs)
    }

    fn apply(&mut self, args: &Args) {
        if let Some(listen) = args.listen {
            self.listen = listen;
        }
        if let Some(root) = &args.widgets_root {
            self.widgets_root.clone_from(root);
        }
        if let Some(mount) = &args.mount {
            self.mount = mount.trim_matches('/').to_owned();
        }
        if let Some(base) = &args.static_assets {
            self.asset_mode = AssetMode::Static { base: base.clone() };
        }
        if args.no_inline_styles {
            self.inline_styles = false;
        }
        if args.reload_each_request {
            self.reload = ReloadPolicy::ReloadEachRequest;
        }
    }

    /// Engine settings derived from these preferences.
    pub fn settings(&self) -> Settings {
        Settings {
            mount: self.mount.clone(),
            asset_mode: self.asset_mode.clone(),
            reload: self.reload,
            inline_styles: self.inline_styles,
        }
    }

    /// Bounds for the in-memory session map.
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_sessions: self.max_sessions,
            idle_timeout: Duration::from_secs(self.session_idle_secs),
        }
    }
}

impl SettingsDocument for ServerPrefs {
    const KEY: &'static str = PREFS_KEY;

    fn validate(&self) -> Result<(), String> {
        validate_mount(&self.mount)?;
        if self.max_sessions == 0 {
            return Err("max_sessions must be at least 1".into());
        }
        self.settings().validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use widgeon_dry_tests::InMemoryConfigStore;

    #[test]
    fn defaults_are_persisted_on_first_load() {
        let store = InMemoryConfigStore::new();
        let prefs = ServerPrefs::load(store.clone(), &Args::default()).unwrap();
        assert_eq!(prefs, ServerPrefs::default());
        assert!(store.contains_key(PREFS_KEY));
    }

    #[test]
    fn flags_override_stored_values_without_saving() {
        let store = InMemoryConfigStore::new();
        let args = Args {
            mount: Some("/w/".into()),
            static_assets: Some("https://cdn.example".into()),
            no_inline_styles: true,
            ..Args::default()
        };
        let prefs = ServerPrefs::load(store.clone(), &args).unwrap();
        assert_eq!(prefs.mount, "w");
        assert!(!prefs.inline_styles);
        assert_eq!(
            prefs.settings().asset_mode,
            AssetMode::Static {
                base: "https://cdn.example".into()
            }
        );
        let stored = ServerPrefs::load(store, &Args::default()).unwrap();
        assert_eq!(stored, ServerPrefs::default());
    }

    #[test]
    fn older_documents_gain_session_limits() {
        let store = InMemoryConfigStore::new();
        ConfigService::new(store.clone())
            .save(PREFS_KEY, &serde_json::json!({"mount": "w"}))
            .unwrap();
        let prefs = ServerPrefs::load(store, &Args::default()).unwrap();
        assert_eq!(prefs.mount, "w");
        assert_eq!(
            prefs.session_limits(),
            SessionLimits {
                max_sessions: 10_000,
                idle_timeout: Duration::from_secs(1800),
            }
        );
    }

    #[test]
    fn invalid_flags_and_documents_are_rejected() {
        let args = Args {
            mount: Some("a/b".into()),
            ..Args::default()
        };
        assert!(matches!(
            ServerPrefs::load(InMemoryConfigStore::new(), &args),
            Err(ConfigError::Invalid { key: PREFS_KEY, .. })
        ));

        let store = InMemoryConfigStore::new()
            .with_document(PREFS_KEY, &serde_json::json!({"max_sessions": 0}));
        assert!(matches!(
            ServerPrefs::load(store, &Args::default()),
            Err(ConfigError::Invalid { key: PREFS_KEY, .. })
        ));
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = widgeon_fs::FsConfigStore::with_base(dir.path()).unwrap();
        ServerPrefs::load(store, &Args::default()).unwrap();
        assert!(dir.path().join("server_prefs.json").exists());
    }
}
