// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Widget directories on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use widgeon_core::naming::is_valid_widget_name;
use widgeon_core::{AssetKind, SourceError, WidgetSource};

use crate::source_error;

/// Widgets installed as `<root>/<name>/` directories.
#[derive(Debug, Clone)]
pub struct FsWidgetSource {
    root: PathBuf,
}

impl FsWidgetSource {
    /// Source over the widget directories under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The widgets root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn widget_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn asset_dir(&self, name: &str, kind: AssetKind) -> PathBuf {
        self.widget_dir(name).join("public").join(kind.dir())
    }
}

impl WidgetSource for FsWidgetSource {
    fn exists(&self, name: &str) -> bool {
        self.widget_dir(name).is_dir()
    }

    fn list(&self) -> Result<Vec<String>, SourceError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(source_error)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_widget_name(name) {
                    names.push(name.to_owned());
                }
            }
        }
        debug!(root = %self.root.display(), count = names.len(), "scanned widgets");
        Ok(names)
    }

    fn load_config(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        fs::read(self.widget_dir(name).join(format!("{name}.yml"))).map_err(source_error)
    }

    fn list_assets(&self, name: &str, kind: AssetKind) -> Result<Vec<String>, SourceError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(self.asset_dir(name, kind)).map_err(source_error)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(kind.extension())
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.push(stem.to_owned());
            }
        }
        Ok(files)
    }

    fn read_asset(&self, name: &str, kind: AssetKind, file: &str) -> Result<Vec<u8>, SourceError> {
        let path = self
            .asset_dir(name, kind)
            .join(format!("{file}.{}", kind.extension()));
        fs::read(path).map_err(source_error)
    }

    fn read_inline_style(&self, name: &str) -> Result<String, SourceError> {
        fs::read_to_string(self.widget_dir(name).join(format!("{name}.css"))).map_err(source_error)
    }
}
