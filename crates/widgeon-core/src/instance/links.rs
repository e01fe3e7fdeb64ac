// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Outbound links: remote links, backlinks and remote-call URLs.
//!
//! Every link carries a signed option map naming its widget (`widget_class`,
//! `widget_id`) and the page it was rendered on (`request_path`,
//! `request_params`), so widgets re-rendered by a callback keep linking back to
//! that page. Links that may fall back to a full page reload also carry
//! `fallback_enabled: true`; without that flag the dispatcher refuses to
//! redirect.

use html_escape::encode_double_quoted_attribute;
use serde_json::{json, Value};

use super::WidgetInstance;
use crate::error::WidgetError;
use crate::helpers::{append_query, ViewHelpers};
use crate::request::{CALLBACK_CLASS_PARAM, CALLBACK_ID_PARAM, CALLBACK_PARAM, CALL_OPTIONS_PARAM};
use crate::naming::DEFAULT_TEMPLATE;
use crate::OptionMap;

const RELOAD: &str = "reload";

impl WidgetInstance {
    /// `/<mount>/callback?call_options=<payload>`.
    pub fn callback_url(&self, payload: &str) -> String {
        append_query(
            &format!("/{}/callback", self.env.mount),
            [(CALL_OPTIONS_PARAM, payload)],
        )
    }

    /// Signed URL for an in-band call of the remote handler `handler`.
    pub fn remote_call_url(&self, handler: &str, options: OptionMap) -> Result<String, WidgetError> {
        let outbound = self.outbound(self.with_defaults(options));
        let payload = self.env.codec.encode_map(&outbound)?;
        Ok(append_query(
            &format!("/{}/remote_call/{}/{handler}", self.env.mount, self.name()),
            [(CALL_OPTIONS_PARAM, payload.as_str())],
        ))
    }

    /// Link that refreshes this widget (`refresh: "default" | <template>`) or
    /// calls one of its handlers (`javascript: <handler>`).
    ///
    /// `fallback` sets the href used without scripting: `"reload"` (default
    /// for refresh links) reloads the page with this widget in callback mode,
    /// `false` disables it (default for handler links), a string is used
    /// verbatim and a map goes through `url_for`.
    pub fn remote_link(
        &self,
        helpers: &dyn ViewHelpers,
        text: &str,
        options: OptionMap,
        mut html_options: OptionMap,
    ) -> Result<String, WidgetError> {
        let mut options = self.with_defaults(options);
        let refresh = is_set(options.get("refresh"));
        if !refresh && !is_set(options.get("javascript")) {
            return Err(WidgetError::Precondition(
                "remote links need `refresh` or `javascript`".into(),
            ));
        }
        let fallback = options
            .remove("fallback")
            .unwrap_or_else(|| if refresh { json!(RELOAD) } else { Value::Bool(false) });
        let outbound = self.outbound(options);
        let url = self.callback_url(&self.env.codec.encode_map(&outbound)?);
        let href = match fallback {
            Value::Bool(true) => self.reload_href(outbound)?,
            Value::String(s) if s == RELOAD => self.reload_href(outbound)?,
            Value::Null | Value::Bool(false) => "#".to_owned(),
            Value::String(s) => s,
            Value::Object(route) => helpers.url_for(&route)?,
            other => {
                return Err(WidgetError::Format(format!(
                    "unsupported link fallback {other}"
                )))
            }
        };
        html_options.insert("href".into(), Value::String(href));
        Ok(helpers.link_to_remote(text, &url, &html_options))
    }

    /// Form posting back to the callback endpoint; refreshes the widget's
    /// default template unless `options` says otherwise.
    pub fn backlink(&self, text: &str, options: OptionMap) -> Result<String, WidgetError> {
        let mut options = self.with_defaults(options);
        options
            .entry("refresh")
            .or_insert_with(|| json!(DEFAULT_TEMPLATE));
        options.remove("fallback");
        let outbound = Self::with_reload(self.outbound(options));
        let payload = self.env.codec.encode_map(&outbound)?;
        Ok(format!(
            concat!(
                "<div class=\"widget_backlink\">",
                "<form action=\"/{mount}/callback\" method=\"post\" data-remote=\"true\">",
                "<input type=\"hidden\" name=\"{param}\" value=\"{payload}\" />",
                "<input type=\"submit\" value=\"{text}\" />",
                "</form></div>"
            ),
            mount = encode_double_quoted_attribute(&self.env.mount),
            param = CALL_OPTIONS_PARAM,
            payload = encode_double_quoted_attribute(&payload),
            text = encode_double_quoted_attribute(text),
        ))
    }

    /// Merge the construction options in when `default_options: true`.
    fn with_defaults(&self, mut options: OptionMap) -> OptionMap {
        if options.remove("default_options") == Some(Value::Bool(true)) {
            for (key, value) in &self.call_options {
                options.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        options
    }

    fn outbound(&self, mut options: OptionMap) -> OptionMap {
        options.remove("id");
        options.insert("widget_class".into(), Value::String(self.name().to_owned()));
        options.insert("widget_id".into(), Value::String(self.widget_id.clone()));
        options.insert("request_path".into(), Value::String(self.request_path.clone()));
        options.insert("request_params".into(), Value::Object(self.page_params()));
        options
    }

    /// Request parameters minus the engine's own callback parameters.
    fn page_params(&self) -> OptionMap {
        self
            .request_params
            .iter()
            .filter(|(k, _)| {
                ![CALL_OPTIONS_PARAM, CALLBACK_PARAM, CALLBACK_CLASS_PARAM, CALLBACK_ID_PARAM]
                    .contains(&k.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn with_reload(mut outbound: OptionMap) -> OptionMap {
        outbound.insert("fallback_enabled".into(), Value::Bool(true));
        outbound
    }

    fn reload_href(&self, outbound: OptionMap) -> Result<String, WidgetError> {
        let payload = self.env.codec.encode_map(&Self::with_reload(outbound))?;
        Ok(self.callback_url(&payload))
    }
}

fn is_set(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null | Value::Bool(false)))
}
