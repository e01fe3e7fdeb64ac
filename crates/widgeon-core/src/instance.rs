// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Widget instances: configuration merge, attribute binding, state tiers and
//! rendering.
//!
//! Construction order (later steps override earlier ones):
//!
//! 1. `id` / `widget_id` are pulled out of the options and become the widget id;
//! 2. system attributes (`widget_id`, `controller`, `request`, `call_options`)
//!    are bound from the request context;
//! 3. config defaults from the definition;
//! 4. the page state persisted by the previous render of the same widget;
//! 5. caller options;
//! 6. options from a static-callback payload targeting this instance;
//! 7. the `on_init` hook, after which fields it assigned become attributes.
//!
//! Built-in names can never be bound. System names may only be replaced by
//! the caller or a signed callback, never by config or replayed state.

mod links;

use std::fmt;
use std::sync::Arc;

use html_escape::encode_double_quoted_attribute;
use serde_json::{json, Value};
use tracing::warn;
use widgeon_codec::PayloadCodec;

use crate::definition::{WidgetDefinition, WidgetType};
use crate::error::WidgetError;
use crate::helpers::html_attributes;
use crate::naming::{template_path, DEFAULT_TEMPLATE, DEFAULT_WIDGET_ID};
use crate::request::{RequestContext, CALLBACK_CLASS_PARAM, CALLBACK_ID_PARAM, CALLBACK_PARAM};
use crate::session::{identification_key, session_key, StateTier};
use crate::template::{display_value, TemplateEngine, TemplateLocals};
use crate::OptionMap;

/// Names of instance operations; binding any of them is a collision.
pub const BUILTIN_NAMES: &[&str] = &[
    "assign",
    "attributes",
    "backlink",
    "before_render",
    "clear_permanent_state",
    "definition",
    "get",
    "global_id",
    "id",
    "identification_key",
    "is_callback",
    "is_callback_active",
    "is_callback_request",
    "on_init",
    "page_state",
    "partial",
    "permanent_state",
    "remote_link",
    "render",
    "render_template",
    "set",
];

/// Attributes bound from the request context.
pub const SYSTEM_NAMES: &[&str] = &["call_options", "controller", "request", "widget_id"];

/// Keys of a signed payload that drive the engine rather than the widget.
pub const FRAMEWORK_KEYS: &[&str] = &[
    "default_options",
    "fallback",
    "fallback_enabled",
    "id",
    "javascript",
    "refresh",
    "request_params",
    "request_path",
    "widget_class",
    "widget_id",
];

/// Whether `name` can never be set from request parameters.
pub fn is_reserved_name(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name) || SYSTEM_NAMES.contains(&name)
}

/// Registry-provided environment an instance needs for links and inline styles.
#[derive(Debug, Clone)]
pub(crate) struct InstanceEnv {
    pub(crate) codec: Arc<PayloadCodec>,
    pub(crate) mount: String,
    pub(crate) inline_styles: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Config,
    State,
    Caller,
    Callback,
    Assign,
}

impl Origin {
    fn may_replace_system(self) -> bool {
        matches!(self, Origin::Caller | Origin::Callback)
    }
}

/// One widget, constructed per render or per remote call.
pub struct WidgetInstance {
    definition: Arc<WidgetDefinition>,
    widget_type: Arc<WidgetType>,
    widget_id: String,
    global_id: String,
    system: OptionMap,
    attributes: OptionMap,
    pending: OptionMap,
    call_options: OptionMap,
    request_path: String,
    request_params: OptionMap,
    callback_request: bool,
    callback_active: bool,
    page_state: OptionMap,
    permanent_state: OptionMap,
    permanent_stored: bool,
    permanent_dirty: bool,
    env: InstanceEnv,
}

impl WidgetInstance {
    pub(crate) fn build(
        env: InstanceEnv,
        definition: Arc<WidgetDefinition>,
        widget_type: Arc<WidgetType>,
        ctx: &RequestContext<'_>,
        mut options: OptionMap,
        callback_active: bool,
    ) -> Result<Self, WidgetError> {
        let call_options = options.clone();
        let id = options.remove("id");
        let alias = options.remove("widget_id");
        let widget_id = widget_id_from(id.or(alias))?;
        let global_id = format!("{}-{widget_id}", definition.name);

        let mut system = OptionMap::new();
        system.insert("widget_id".into(), Value::String(widget_id.clone()));
        system.insert("controller".into(), Value::String(ctx.controller().to_owned()));
        system.insert(
            "request".into(),
            json!({ "path": ctx.path(), "params": ctx.params() }),
        );
        system.insert("call_options".into(), Value::Object(call_options.clone()));

        let mut instance = Self {
            definition: Arc::clone(&definition),
            widget_type,
            widget_id,
            global_id,
            system,
            attributes: OptionMap::new(),
            pending: OptionMap::new(),
            call_options,
            request_path: ctx.path().to_owned(),
            request_params: ctx.params().clone(),
            callback_request: ctx.has_callback(),
            callback_active,
            page_state: OptionMap::new(),
            permanent_state: OptionMap::new(),
            permanent_stored: false,
            permanent_dirty: false,
            env,
        };

        for (name, value) in &definition.config_defaults {
            instance.bind(name, value.clone(), Origin::Config)?;
        }
        instance.load_state(ctx)?;
        for (name, value) in options {
            instance.bind(&name, value, Origin::Caller)?;
        }
        instance.apply_static_callback(ctx)?;
        if let Some(hook) = instance.widget_type.on_init_hook().cloned() {
            hook(&mut instance)?;
        }
        instance.promote_pending()?;
        Ok(instance)
    }

    fn load_state(&mut self, ctx: &RequestContext<'_>) -> Result<(), WidgetError> {
        let Some(session) = ctx.session() else {
            return Ok(());
        };
        if let Some(page) = session.load(&self.session_key(StateTier::Page)) {
            for (name, value) in &page {
                self.bind(name, value.clone(), Origin::State)?;
            }
            self.page_state = page;
        }
        if let Some(permanent) = session.load(&self.session_key(StateTier::Permanent)) {
            self.permanent_state = permanent;
            self.permanent_stored = true;
        }
        Ok(())
    }

    fn apply_static_callback(&mut self, ctx: &RequestContext<'_>) -> Result<(), WidgetError> {
        let Some(payload) = ctx.param(CALLBACK_PARAM) else {
            return Ok(());
        };
        // The plain-text params let non-targets skip decoding.
        if ctx.param(CALLBACK_CLASS_PARAM) != Some(self.name())
            || ctx.param(CALLBACK_ID_PARAM) != Some(self.widget_id.as_str())
        {
            return Ok(());
        }
        let mut decoded = self.env.codec.decode(payload).map_err(|err| {
            if err.is_integrity() {
                warn!(widget = %self.global_id, error = %err, "rejected static callback payload; possible tampering");
            }
            WidgetError::from(err)
        })?;
        let targets_us = decoded.get("widget_class").and_then(Value::as_str) == Some(self.name())
            && decoded
                .get("widget_id")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_WIDGET_ID)
                == self.widget_id;
        if !targets_us {
            warn!(widget = %self.global_id, "static callback parameters disagree with signed payload");
            return Err(WidgetError::Integrity(
                "callback payload does not target the named widget".into(),
            ));
        }
        for key in FRAMEWORK_KEYS {
            decoded.remove(*key);
        }
        for (name, value) in decoded {
            self.bind(&name, value, Origin::Callback)?;
        }
        self.callback_active = true;
        Ok(())
    }

    fn bind(&mut self, name: &str, value: Value, origin: Origin) -> Result<(), WidgetError> {
        if BUILTIN_NAMES.contains(&name) {
            return Err(WidgetError::AttributeCollision { name: name.into() });
        }
        if name == "html_options" && !matches!(value, Value::Object(_) | Value::Null) {
            return Err(WidgetError::Format("html_options must be a map".into()));
        }
        if SYSTEM_NAMES.contains(&name) {
            if !origin.may_replace_system() {
                return Err(WidgetError::AttributeCollision { name: name.into() });
            }
            self.system.insert(name.to_owned(), value);
            return Ok(());
        }
        self.attributes.insert(name.to_owned(), value);
        Ok(())
    }

    fn promote_pending(&mut self) -> Result<(), WidgetError> {
        for (name, value) in std::mem::take(&mut self.pending) {
            self.bind(&name, value, Origin::Assign)?;
        }
        Ok(())
    }

    /// Widget name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Widget id within the page (`default` when none was given).
    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    /// `<name>-<id>`, also the container's DOM id.
    pub fn global_id(&self) -> &str {
        &self.global_id
    }

    /// `widget_<name>_<id>`.
    pub fn identification_key(&self) -> String {
        identification_key(self.name(), Some(&self.widget_id))
    }

    /// Session key of one state tier.
    pub fn session_key(&self, tier: StateTier) -> String {
        session_key(self.name(), Some(&self.widget_id), tier)
    }

    /// The resolved definition.
    pub fn definition(&self) -> &WidgetDefinition {
        &self.definition
    }

    /// Dynamic attributes (system attributes excluded).
    pub fn attributes(&self) -> &OptionMap {
        &self.attributes
    }

    /// Dynamic attribute, falling back to system attributes.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).or_else(|| self.system.get(name))
    }

    /// String-valued attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Rebind a dynamic attribute. Built-in and system names are rejected.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), WidgetError> {
        self.bind(name, value.into(), Origin::Assign)
    }

    /// Field write from hook code; becomes an attribute once the hook returns.
    pub fn assign(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.pending.insert(name.into(), value.into());
    }

    /// Value visible to templates under `name`.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.widget_id.clone())),
            "global_id" => Some(Value::String(self.global_id.clone())),
            "identification_key" => Some(Value::String(self.identification_key())),
            "name" if !self.attributes.contains_key("name") => {
                Some(Value::String(self.name().to_owned()))
            }
            "is_callback_active" => Some(Value::Bool(self.callback_active)),
            "is_callback_request" => Some(Value::Bool(self.callback_request)),
            "page_state" => Some(Value::Object(self.page_state.clone())),
            "permanent_state" => Some(Value::Object(self.permanent_state.clone())),
            _ => self.get(name).cloned(),
        }
    }

    /// Options the instance was constructed with.
    pub fn call_options(&self) -> &OptionMap {
        &self.call_options
    }

    /// Issuing controller name.
    pub fn controller(&self) -> &str {
        self.system
            .get("controller")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Path of the request that constructed the instance.
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    /// Parameters of the request that constructed the instance.
    pub fn request_params(&self) -> &OptionMap {
        &self.request_params
    }

    /// Point the instance back at the page a signed payload was issued on, so
    /// links rendered during a callback do not target the callback route.
    pub(crate) fn restore_origin(&mut self, path: String, params: OptionMap) {
        self.system.insert(
            "request".into(),
            json!({ "path": &path, "params": &params }),
        );
        self.request_path = path;
        self.request_params = params;
    }

    /// Whether the request carries a callback for any widget.
    pub fn is_callback_request(&self) -> bool {
        self.callback_request
    }

    /// Whether the request carries a verified callback targeting this instance.
    pub fn is_callback_active(&self) -> bool {
        self.callback_active
    }

    /// The `html_options` attribute, if set.
    pub fn html_options(&self) -> Option<&OptionMap> {
        self.attributes.get("html_options").and_then(Value::as_object)
    }

    /// Page state as persisted by the last render.
    pub fn page_state(&self) -> &OptionMap {
        &self.page_state
    }

    /// Permanent state.
    pub fn permanent_state(&self) -> &OptionMap {
        &self.permanent_state
    }

    /// Mutable permanent state; written back on the next persist.
    pub fn permanent_state_mut(&mut self) -> &mut OptionMap {
        self.permanent_dirty = true;
        &mut self.permanent_state
    }

    /// Reset permanent state to empty.
    pub fn clear_permanent_state(&mut self) {
        self.permanent_state.clear();
        self.permanent_dirty = true;
    }

    /// Render the widget: `before_render` hook, template, container markup,
    /// then persist both state tiers.
    pub fn render(
        &mut self,
        ctx: &mut RequestContext<'_>,
        templates: &dyn TemplateEngine,
    ) -> Result<String, WidgetError> {
        let content = self.render_content(ctx, templates, None)?;
        let html = self.container(&content);
        self.persist_state(ctx)?;
        Ok(html)
    }

    /// Render one template of the widget without the container (callback
    /// refresh). `None` or `"default"` is the main template. Persists state.
    pub fn render_fragment(
        &mut self,
        ctx: &mut RequestContext<'_>,
        templates: &dyn TemplateEngine,
        template: Option<&str>,
    ) -> Result<String, WidgetError> {
        let template = template.filter(|t| *t != DEFAULT_TEMPLATE);
        let content = self.render_content(ctx, templates, template)?;
        self.persist_state(ctx)?;
        Ok(content)
    }

    fn render_content(
        &mut self,
        ctx: &RequestContext<'_>,
        templates: &dyn TemplateEngine,
        template: Option<&str>,
    ) -> Result<String, WidgetError> {
        if !ctx.has_session() {
            return Err(WidgetError::Precondition(format!(
                "widget `{}` rendered without a session",
                self.global_id
            )));
        }
        if let Some(hook) = self.widget_type.before_render_hook().cloned() {
            hook(self)?;
        }
        self.promote_pending()?;
        let path = match template {
            Some(t) => template_path(self.name(), Some(t)),
            None => self.definition.template_path.clone(),
        };
        templates.render_template(&path, &TemplateLocals::new(self))
    }

    /// Render another template of this widget with the instance as primary local.
    pub fn render_template(
        &self,
        templates: &dyn TemplateEngine,
        template: &str,
    ) -> Result<String, WidgetError> {
        templates.render_template(
            &template_path(self.name(), Some(template)),
            &TemplateLocals::new(self),
        )
    }

    /// Render a partial of this widget with extra locals.
    pub fn partial(
        &self,
        templates: &dyn TemplateEngine,
        template: &str,
        locals: OptionMap,
    ) -> Result<String, WidgetError> {
        templates.render_partial(
            &template_path(self.name(), Some(template)),
            &TemplateLocals::new(self).with_extra(locals),
        )
    }

    fn container(&self, content: &str) -> String {
        let mut html = String::new();
        if self.env.inline_styles {
            if let Some(css) = &self.definition.inline_style {
                html.push_str("<style type=\"text/css\">\n");
                html.push_str(css);
                html.push_str("\n</style>\n");
            }
        }
        let mut attrs = self.html_options().cloned().unwrap_or_default();
        attrs.remove("id");
        let mut class = format!("{}_widget", self.name());
        if let Some(extra) = attrs.remove("class") {
            let extra = display_value(&extra);
            if !extra.is_empty() {
                class.push(' ');
                class.push_str(&extra);
            }
        }
        html.push_str(&format!(
            "<div id=\"{}\" class=\"{}\"{}>{content}</div>",
            encode_double_quoted_attribute(&self.global_id),
            encode_double_quoted_attribute(&class),
            html_attributes(&attrs)
        ));
        html
    }

    /// Write page state (replacing any previous content) and permanent state
    /// (created on first persist, afterwards only when changed).
    pub fn persist_state(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), WidgetError> {
        let page_key = self.session_key(StateTier::Page);
        let session = ctx.session_mut().ok_or_else(|| {
            WidgetError::Precondition("persisting widget state needs a session".into())
        })?;
        self.page_state = self.attributes.clone();
        session.store(&page_key, self.page_state.clone());
        self.save_permanent_state(ctx)
    }

    /// Write permanent state only, if it changed or was never stored. Remote
    /// handlers that do not render persist through this.
    pub fn save_permanent_state(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), WidgetError> {
        let key = self.session_key(StateTier::Permanent);
        let session = ctx.session_mut().ok_or_else(|| {
            WidgetError::Precondition("persisting widget state needs a session".into())
        })?;
        if !self.permanent_stored || self.permanent_dirty {
            session.store(&key, self.permanent_state.clone());
            self.permanent_stored = true;
            self.permanent_dirty = false;
        }
        Ok(())
    }
}

fn widget_id_from(value: Option<Value>) -> Result<String, WidgetError> {
    match value {
        None | Some(Value::Null) => Ok(DEFAULT_WIDGET_ID.to_owned()),
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        Some(Value::String(_)) => Ok(DEFAULT_WIDGET_ID.to_owned()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(WidgetError::Format(format!(
            "widget id must be a string, got {other}"
        ))),
    }
}

impl fmt::Debug for WidgetInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetInstance")
            .field("global_id", &self.global_id)
            .field("attributes", &self.attributes)
            .field("callback_active", &self.callback_active)
            .finish_non_exhaustive()
    }
}
