// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port over wherever widget directories live (disk, memory, embedded).

use thiserror::Error;

/// Error type for widget source adapters.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Requested entry does not exist.
    #[error("not found")]
    NotFound,
    /// I/O error while reading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// The two asset families a widget may ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    /// `.css` files under `stylesheets/`.
    Stylesheet,
    /// `.js` files under `javascripts/`.
    Script,
}

impl AssetKind {
    /// Directory segment used in asset URLs and on disk.
    pub fn dir(self) -> &'static str {
        match self {
            AssetKind::Stylesheet => "stylesheets",
            AssetKind::Script => "javascripts",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Stylesheet => "css",
            AssetKind::Script => "js",
        }
    }

    /// HTTP content type served for this kind.
    pub fn content_type(self) -> &'static str {
        match self {
            AssetKind::Stylesheet => "text/css",
            AssetKind::Script => "application/javascript",
        }
    }

    /// Parse the URL directory segment back into a kind.
    pub fn from_dir(dir: &str) -> Option<Self> {
        match dir {
            "stylesheets" => Some(AssetKind::Stylesheet),
            "javascripts" => Some(AssetKind::Script),
            _ => None,
        }
    }
}

/// Read-only access to installed widgets.
///
/// Names passed in have already been validated by the registry
/// (`[a-z0-9_]+`); asset file names are plain basenames.
pub trait WidgetSource: Send + Sync {
    /// Whether a widget directory named `name` exists.
    fn exists(&self, name: &str) -> bool;

    /// Names of all installed widgets, in any order.
    fn list(&self) -> Result<Vec<String>, SourceError>;

    /// Raw bytes of the widget's defaults document; `NotFound` when absent.
    fn load_config(&self, name: &str) -> Result<Vec<u8>, SourceError>;

    /// Asset basenames (without extension) of one kind, in any order.
    fn list_assets(&self, name: &str, kind: AssetKind) -> Result<Vec<String>, SourceError>;

    /// Contents of one asset, `file` given without extension.
    fn read_asset(&self, name: &str, kind: AssetKind, file: &str) -> Result<Vec<u8>, SourceError>;

    /// The widget's own stylesheet for inline mode; `NotFound` when absent.
    fn read_inline_style(&self, name: &str) -> Result<String, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_segment_round_trips() {
        for kind in [AssetKind::Stylesheet, AssetKind::Script] {
            assert_eq!(AssetKind::from_dir(kind.dir()), Some(kind));
        }
        assert_eq!(AssetKind::from_dir("images"), None);
    }
}
