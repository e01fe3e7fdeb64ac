// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `{{ key }}` templates read from each widget's `views/` directory.

use std::fs;
use std::io;
use std::path::PathBuf;

use widgeon_core::naming::{is_safe_file_name, is_valid_widget_name};
use widgeon_core::template::interpolate;
use widgeon_core::{TemplateEngine, TemplateLocals, WidgetError};

/// Maps `widgets/<name>/<template>` to `<root>/<name>/views/<template>.html`.
///
/// Templates are read on every render; there is no cache.
#[derive(Debug, Clone)]
pub struct FsTemplateEngine {
    root: PathBuf,
}

impl FsTemplateEngine {
    /// Engine over the widget directories under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_for(&self, path: &str) -> Option<PathBuf> {
        let rest = path.strip_prefix("widgets/")?;
        let (name, template) = rest.split_once('/')?;
        if !is_valid_widget_name(name) || !is_safe_file_name(template) {
            return None;
        }
        Some(
            self.root
                .join(name)
                .join("views")
                .join(format!("{template}.html")),
        )
    }
}

impl TemplateEngine for FsTemplateEngine {
    fn render_template(
        &self,
        path: &str,
        locals: &TemplateLocals<'_>,
    ) -> Result<String, WidgetError> {
        let file = self
            .file_for(path)
            .ok_or_else(|| WidgetError::template_not_found(path))?;
        let source = match fs::read_to_string(&file) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(WidgetError::template_not_found(path))
            }
            Err(err) => return Err(WidgetError::Template(format!("{}: {err}", file.display()))),
        };
        Ok(interpolate(&source, |key| locals.lookup(key)))
    }
}
