// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Remote-call and callback dispatch.
//!
//! Both entrypoints authenticate the signed payload before touching anything
//! else. Remote handlers are only reachable through a widget type's explicit
//! allowlist, and full-page fallbacks only redirect when the payload itself
//! was signed with `fallback_enabled: true`.

use serde_json::Value;
use tracing::{debug, warn};

use crate::definition::HandlerContext;
use crate::error::WidgetError;
use crate::helpers::append_query;
use crate::instance::{is_reserved_name, FRAMEWORK_KEYS};
use crate::registry::Registry;
use crate::request::{
    RequestContext, CALLBACK_CLASS_PARAM, CALLBACK_ID_PARAM, CALLBACK_PARAM, CALL_OPTIONS_PARAM,
};
use crate::template::{display_value, TemplateEngine};
use crate::OptionMap;

/// An in-band call: `/<mount>/remote_call/{widget_name}/{handler}?call_options={payload}`.
#[derive(Debug, Clone, Copy)]
pub struct RemoteCall<'a> {
    /// Widget named in the route.
    pub widget_name: &'a str,
    /// Handler named in the route, without suffix.
    pub handler: &'a str,
    /// Signed option map.
    pub payload: &'a str,
}

/// Outcome of the callback endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResponse {
    /// Markup to send back with 200.
    Fragment(String),
    /// Local path to redirect to.
    Redirect(String),
}

/// Routes signed payloads back into widgets.
pub struct Dispatcher<'r> {
    registry: &'r Registry,
    templates: &'r dyn TemplateEngine,
}

impl<'r> Dispatcher<'r> {
    /// Dispatcher over a registry and template engine.
    pub fn new(registry: &'r Registry, templates: &'r dyn TemplateEngine) -> Self {
        Self {
            registry,
            templates,
        }
    }

    /// Invoke an allowlisted handler and return its body.
    pub fn remote_call(
        &self,
        call: &RemoteCall<'_>,
        ctx: &mut RequestContext<'_>,
    ) -> Result<String, WidgetError> {
        let decoded = self.decode(call.payload)?;
        let class = decoded.get("widget_class").and_then(Value::as_str);
        if class != Some(call.widget_name) {
            warn!(
                route = call.widget_name,
                signed = ?class,
                "remote call route disagrees with signed widget"
            );
            return Err(WidgetError::Integrity(
                "signed widget does not match the route".into(),
            ));
        }
        self.invoke(call.widget_name, call.handler, decoded, ctx)
    }

    /// Handle the callback endpoint. XHR requests refresh a template or run a
    /// handler; anything else takes the page-reload fallback.
    pub fn callback(
        &self,
        payload: &str,
        ctx: &mut RequestContext<'_>,
    ) -> Result<CallbackResponse, WidgetError> {
        let decoded = self.decode(payload)?;
        let class = decoded
            .get("widget_class")
            .and_then(Value::as_str)
            .ok_or_else(|| WidgetError::Format("callback payload names no widget".into()))?
            .to_owned();
        self.registry.resolve(&class)?;

        if !ctx.is_xhr() {
            return self.fallback(decoded).map(CallbackResponse::Redirect);
        }
        if let Some(handler) = decoded.get("javascript").and_then(Value::as_str) {
            let handler = handler.to_owned();
            return self
                .invoke(&class, &handler, decoded, ctx)
                .map(CallbackResponse::Fragment);
        }
        let Some(template) = decoded.get("refresh").and_then(Value::as_str) else {
            return Err(WidgetError::Format(
                "callback payload needs `refresh` or `javascript`".into(),
            ));
        };
        let template = template.to_owned();
        debug!(widget = %class, template = %template, "callback refresh");
        let origin = origin_of(&decoded);
        let options = widget_options(OptionMap::new(), decoded);
        let mut widget = self.registry.instantiate(&class, ctx, options, true)?;
        if let Some((path, params)) = origin {
            widget.restore_origin(path, params);
        }
        widget
            .render_fragment(ctx, self.templates, Some(&template))
            .map(CallbackResponse::Fragment)
    }

    fn decode(&self, payload: &str) -> Result<OptionMap, WidgetError> {
        self.registry.codec().decode(payload).map_err(|err| {
            if err.is_integrity() {
                warn!(error = %err, "rejected signed payload; possible tampering");
            }
            err.into()
        })
    }

    fn invoke(
        &self,
        name: &str,
        handler: &str,
        decoded: OptionMap,
        ctx: &mut RequestContext<'_>,
    ) -> Result<String, WidgetError> {
        self.registry.resolve(name)?;
        let widget_type = self.registry.widget_type(name);
        let Some(remote) = widget_type.remote_handler(handler).cloned() else {
            warn!(
                widget = name,
                handler,
                allowed = ?widget_type.remote_handler_names().collect::<Vec<_>>(),
                "remote call to a handler that is not allowlisted"
            );
            return Err(WidgetError::HandlerNotFound {
                widget: name.to_owned(),
                handler: handler.to_owned(),
            });
        };
        let origin = origin_of(&decoded);
        let options = widget_options(request_options(ctx.params()), decoded);
        let mut widget = self.registry.instantiate(name, ctx, options, true)?;
        if let Some((path, params)) = origin {
            widget.restore_origin(path, params);
        }
        let body = {
            let hctx = HandlerContext {
                params: ctx.params(),
                templates: self.templates,
            };
            remote(&mut widget, &hctx)?
        };
        if ctx.has_session() {
            widget.save_permanent_state(ctx)?;
        }
        Ok(body)
    }

    fn fallback(&self, mut decoded: OptionMap) -> Result<String, WidgetError> {
        if decoded.remove("fallback_enabled") != Some(Value::Bool(true)) {
            warn!("page-reload fallback requested without signed authorization");
            return Err(WidgetError::FallbackDisabled);
        }
        let path = match decoded.remove("request_path") {
            Some(Value::String(path)) => path,
            _ => return Err(WidgetError::Format("fallback payload has no request path".into())),
        };
        if !is_local_path(&path) {
            return Err(WidgetError::Format(format!(
                "refusing to redirect to non-local path {path:?}"
            )));
        }
        let params = match decoded.remove("request_params") {
            Some(Value::Object(params)) => params,
            None | Some(Value::Null) => OptionMap::new(),
            Some(_) => return Err(WidgetError::Format("request_params must be a map".into())),
        };
        let class = decoded
            .get("widget_class")
            .map(display_value)
            .unwrap_or_default();
        let id = decoded
            .get("widget_id")
            .map(display_value)
            .unwrap_or_default();
        let resigned = self.registry.codec().encode_map(&decoded)?;

        let mut pairs: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| {
                ![CALL_OPTIONS_PARAM, CALLBACK_PARAM, CALLBACK_CLASS_PARAM, CALLBACK_ID_PARAM]
                    .contains(&k.as_str())
            })
            .map(|(k, v)| (k.clone(), display_value(v)))
            .collect();
        pairs.push((CALLBACK_PARAM.into(), resigned));
        pairs.push((CALLBACK_CLASS_PARAM.into(), class));
        pairs.push((CALLBACK_ID_PARAM.into(), id));
        Ok(append_query(&path, pairs))
    }
}

impl std::fmt::Debug for Dispatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Request parameters that may become widget options: nothing the engine
/// itself reads and nothing that would collide with a reserved name.
fn request_options(params: &OptionMap) -> OptionMap {
    params
        .iter()
        .filter(|(k, _)| {
            let k = k.as_str();
            k != CALL_OPTIONS_PARAM
                && !k.starts_with("widgeon_")
                && k != "id"
                && !is_reserved_name(k)
                && !FRAMEWORK_KEYS.contains(&k)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Signed options override request parameters; the signed widget id wins.
fn widget_options(mut base: OptionMap, mut decoded: OptionMap) -> OptionMap {
    let id = decoded.remove("widget_id");
    for key in FRAMEWORK_KEYS {
        decoded.remove(*key);
    }
    base.extend(decoded);
    if let Some(id) = id {
        base.insert("widget_id".into(), id);
    }
    base
}

/// The page a payload was issued on, when it names a local one.
fn origin_of(decoded: &OptionMap) -> Option<(String, OptionMap)> {
    let path = decoded
        .get("request_path")
        .and_then(Value::as_str)
        .filter(|path| is_local_path(path))?;
    let params = match decoded.get("request_params") {
        Some(Value::Object(params)) => params.clone(),
        _ => OptionMap::new(),
    };
    Some((path.to_owned(), params))
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_paths_only() {
        assert!(is_local_path("/posts?x=1"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("https://evil.example"));
        assert!(!is_local_path("/\\evil"));
    }

    #[test]
    fn request_options_drop_engine_and_reserved_keys() {
        let params = json!({
            "call_options": "x",
            "widgeon_callback": "y",
            "render": "z",
            "controller": "c",
            "page": "3"
        });
        let options = request_options(params.as_object().unwrap_or(&OptionMap::new()));
        assert_eq!(options.keys().collect::<Vec<_>>(), ["page"]);
    }

    #[test]
    fn signed_options_win_over_params() {
        let base = json!({"page": "3", "q": "a"}).as_object().cloned().unwrap_or_default();
        let decoded = json!({"page": 4, "widget_id": "w", "widget_class": "c", "refresh": "default"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let merged = widget_options(base, decoded);
        assert_eq!(merged["page"], 4);
        assert_eq!(merged["q"], "a");
        assert_eq!(merged["widget_id"], "w");
        assert!(!merged.contains_key("widget_class"));
        assert!(!merged.contains_key("refresh"));
    }
}
