// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stylesheet and script link tags for widgets.

use crate::error::WidgetError;
use crate::registry::{AssetMode, Registry, Settings};
use crate::source::AssetKind;

/// Which widgets to emit links for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSelection {
    /// These widgets, in this order.
    Named(Vec<String>),
    /// Every installed widget.
    All,
    /// Widgets rendered so far in the current pass.
    Auto,
}

impl AssetSelection {
    /// Selection of the given names.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AssetSelection::Named(names.into_iter().map(Into::into).collect())
    }
}

/// URL of one asset under the configured mode.
pub fn asset_url(settings: &Settings, widget: &str, kind: AssetKind, file: &str) -> String {
    let prefix = match &settings.asset_mode {
        AssetMode::WidgetLocal => format!("/{}", settings.mount),
        AssetMode::Static { base } => base.trim_end_matches('/').to_owned(),
    };
    format!(
        "{prefix}/{widget}/{}/{file}.{}",
        kind.dir(),
        kind.extension()
    )
}

/// Tag for one asset URL, newline-terminated.
pub fn link_tag(kind: AssetKind, url: &str) -> String {
    let url = html_escape::encode_double_quoted_attribute(url);
    match kind {
        AssetKind::Stylesheet => format!(
            "<link href=\"{url}\" rel=\"stylesheet\" type=\"text/css\" media=\"screen\" />\n"
        ),
        AssetKind::Script => {
            format!("<script src=\"{url}\" type=\"text/javascript\"></script>\n")
        }
    }
}

/// Tags for every asset of `kind` of every widget in `widgets`.
pub fn asset_links(
    registry: &Registry,
    widgets: &[String],
    kind: AssetKind,
) -> Result<String, WidgetError> {
    let mut out = String::new();
    for widget in widgets {
        for file in registry.assets_for(widget, kind)? {
            out.push_str(&link_tag(
                kind,
                &asset_url(registry.settings(), widget, kind, &file),
            ));
        }
    }
    Ok(out)
}
