// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! View-helper capabilities a widget may call back into.

use html_escape::{encode_double_quoted_attribute, encode_text};
use serde_json::Value;
use url::form_urlencoded;

use crate::error::WidgetError;
use crate::template::display_value;
use crate::OptionMap;

/// The small set of render helpers widgets need from the host view layer.
pub trait ViewHelpers {
    /// Turn a route description into a URL.
    fn url_for(&self, route: &OptionMap) -> Result<String, WidgetError>;

    /// Anchor that the client enhances into an in-band request to `url`;
    /// `html_options["href"]` is the non-script fallback.
    fn link_to_remote(&self, text: &str, url: &str, html_options: &OptionMap) -> String;
}

/// Helpers with no host behind them: `url_for` takes a `path` key plus query
/// parameters, remote links carry their target in `data-remote`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHelpers;

impl ViewHelpers for DefaultHelpers {
    fn url_for(&self, route: &OptionMap) -> Result<String, WidgetError> {
        let path = route
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| WidgetError::Format("url_for needs a string `path`".into()))?;
        let query: Vec<(&str, String)> = route
            .iter()
            .filter(|(k, _)| k.as_str() != "path")
            .map(|(k, v)| (k.as_str(), display_value(v)))
            .collect();
        Ok(append_query(path, query))
    }

    fn link_to_remote(&self, text: &str, url: &str, html_options: &OptionMap) -> String {
        let mut attrs = html_options.clone();
        attrs
            .entry("href")
            .or_insert_with(|| Value::String("#".into()));
        attrs.insert("data-remote".into(), Value::String(url.to_owned()));
        format!("<a{}>{}</a>", html_attributes(&attrs), encode_text(text))
    }
}

/// ` key="value"` pairs, escaped, in key order. Null and `false` values are skipped.
pub fn html_attributes(attrs: &OptionMap) -> String {
    let mut out = String::new();
    for (key, value) in attrs {
        if matches!(value, Value::Null | Value::Bool(false)) {
            continue;
        }
        out.push(' ');
        out.push_str(&encode_double_quoted_attribute(key));
        out.push_str("=\"");
        out.push_str(&encode_double_quoted_attribute(&display_value(value)));
        out.push('"');
    }
    out
}

/// Append url-encoded pairs to `path`, respecting an existing query.
pub fn append_query<K, V, I>(path: &str, pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.extend_pairs(pairs);
    let query = serializer.finish();
    if query.is_empty() {
        path.to_owned()
    } else if path.contains('?') {
        format!("{path}&{query}")
    } else {
        format!("{path}?{query}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> OptionMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn url_for_needs_a_path() {
        let url = DefaultHelpers
            .url_for(&map(json!({"path": "/posts", "page": 2})))
            .unwrap();
        assert_eq!(url, "/posts?page=2");
        assert!(matches!(
            DefaultHelpers.url_for(&map(json!({"page": 2}))),
            Err(WidgetError::Format(_))
        ));
    }

    #[test]
    fn remote_links_keep_fallback_href() {
        let html = DefaultHelpers.link_to_remote(
            "more",
            "/widgeon/callback?x=1&y=2",
            &map(json!({"href": "/fallback"})),
        );
        assert_eq!(
            html,
            r#"<a data-remote="/widgeon/callback?x=1&amp;y=2" href="/fallback">more</a>"#
        );
    }

    #[test]
    fn attributes_skip_false_and_null() {
        let attrs = html_attributes(&map(json!({"a": false, "b": null, "c": "x\"y"})));
        assert_eq!(attrs, r#" c="x&quot;y""#);
    }

    #[test]
    fn query_is_appended() {
        assert_eq!(append_query("/p", [("a", "1 2")]), "/p?a=1+2");
        assert_eq!(append_query("/p?x=1", [("a", "b")]), "/p?x=1&a=b");
        assert_eq!(append_query("/p", Vec::<(&str, &str)>::new()), "/p");
    }
}
