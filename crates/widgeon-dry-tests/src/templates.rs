// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Template engine fake.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use widgeon_core::template::interpolate;
use widgeon_core::{TemplateEngine, TemplateLocals, WidgetError};

/// Templates keyed by engine path (`widgets/<name>/<template>`).
#[derive(Clone, Default)]
pub struct MemoryTemplates {
    inner: Arc<Mutex<TemplatesInner>>,
}

#[derive(Default)]
struct TemplatesInner {
    sources: HashMap<String, String>,
    rendered: Vec<String>,
}

impl MemoryTemplates {
    /// No templates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template.
    pub fn insert(&self, path: impl Into<String>, source: impl Into<String>) -> &Self {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sources
            .insert(path.into(), source.into());
        self
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    /// Paths rendered so far, in order.
    pub fn rendered(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rendered
            .clone()
    }
}

impl TemplateEngine for MemoryTemplates {
    fn render_template(
        &self,
        path: &str,
        locals: &TemplateLocals<'_>,
    ) -> Result<String, WidgetError> {
        let source = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.rendered.push(path.to_owned());
            inner
                .sources
                .get(path)
                .cloned()
                .ok_or_else(|| WidgetError::template_not_found(path))?
        };
        Ok(interpolate(&source, |key| locals.lookup(key)))
    }
}
