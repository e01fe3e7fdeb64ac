// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Template engine port and the locals handed to it.
//!
//! The engine is a host collaborator. What ships here is the contract plus a
//! minimal `{{ key }}` interpolator that the bundled adapters share: `{{ x }}`
//! is HTML-escaped, `{{& x }}` is emitted raw, unknown keys render as nothing.

use html_escape::encode_quoted_attribute;
use serde_json::Value;

use crate::error::WidgetError;
use crate::instance::WidgetInstance;
use crate::naming::template_local;
use crate::OptionMap;

/// Renders widget templates and partials.
pub trait TemplateEngine: Send + Sync {
    /// Render the template at `path` (see [`crate::naming::template_path`]).
    fn render_template(&self, path: &str, locals: &TemplateLocals<'_>)
        -> Result<String, WidgetError>;

    /// Render a partial. Engines without a partial concept render it as a template.
    fn render_partial(&self, path: &str, locals: &TemplateLocals<'_>) -> Result<String, WidgetError> {
        self.render_template(path, locals)
    }
}

/// Locals for one template render: the widget under `<name>_widget`, plus
/// free-form extras.
#[derive(Debug)]
pub struct TemplateLocals<'a> {
    widget_local: String,
    widget: &'a WidgetInstance,
    extra: OptionMap,
}

impl<'a> TemplateLocals<'a> {
    /// Locals exposing `widget` under its conventional name.
    pub fn new(widget: &'a WidgetInstance) -> Self {
        Self {
            widget_local: template_local(widget.name()),
            widget,
            extra: OptionMap::new(),
        }
    }

    /// Add extra locals (partial arguments and the like).
    pub fn with_extra(mut self, extra: OptionMap) -> Self {
        self.extra = extra;
        self
    }

    /// Name the widget is exposed under.
    pub fn widget_local(&self) -> &str {
        &self.widget_local
    }

    /// The primary data value.
    pub fn widget(&self) -> &WidgetInstance {
        self.widget
    }

    /// Extra locals.
    pub fn extra(&self) -> &OptionMap {
        &self.extra
    }

    /// Resolve a dotted key. `<name>_widget.` prefixes are optional; extras
    /// shadow widget attributes.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        let key = key
            .strip_prefix(self.widget_local.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(key);
        let mut segments = key.split('.');
        let head = segments.next()?;
        let root = match self.extra.get(head) {
            Some(value) => value.clone(),
            None => self.widget.lookup(head)?,
        };
        segments.try_fold(root, |value, segment| match value {
            Value::Object(mut map) => map.remove(segment),
            Value::Array(mut items) => {
                let idx: usize = segment.parse().ok()?;
                (idx < items.len()).then(|| items.swap_remove(idx))
            }
            _ => None,
        })
    }
}

/// Expand `{{ key }}` / `{{& key }}` tags using `lookup`.
pub fn interpolate<F>(source: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<Value>,
{
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let tag = after[..end].trim();
        let (raw, key) = match tag.strip_prefix('&') {
            Some(key) => (true, key.trim()),
            None => (false, tag),
        };
        if let Some(value) = lookup(key) {
            let text = display_value(&value);
            if raw {
                out.push_str(&text);
            } else {
                out.push_str(&encode_quoted_attribute(&text));
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Text form of a value inside markup: strings verbatim, null empty, others as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
