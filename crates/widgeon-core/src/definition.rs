// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Widget definitions (discovered) and widget types (registered in code).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::WidgetError;
use crate::instance::WidgetInstance;
use crate::template::TemplateEngine;
use crate::OptionMap;

/// Suffix appended to remote-call handler names in the allowlist.
pub const REMOTE_CALL_SUFFIX: &str = "_remotecall";

/// Static metadata of one widget, loaded from its source directory.
///
/// Immutable once built; the registry shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetDefinition {
    /// Unique widget name (`[a-z0-9_]+`).
    pub name: String,
    /// Defaults loaded from the widget's config document.
    pub config_defaults: OptionMap,
    /// Stylesheet basenames, in link order.
    pub stylesheets: Vec<String>,
    /// Script basenames, in link order.
    pub scripts: Vec<String>,
    /// Main template path.
    pub template_path: String,
    /// Whether the registry may reuse this definition across requests.
    pub cacheable: bool,
    /// The widget's own stylesheet, when it ships one, for inline mode.
    pub inline_style: Option<String>,
}

/// Lifecycle hook run against an instance.
pub type Hook = Arc<dyn Fn(&mut WidgetInstance) -> Result<(), WidgetError> + Send + Sync>;

/// Remote-call handler: returns the response body.
pub type RemoteHandler = Arc<
    dyn Fn(&mut WidgetInstance, &HandlerContext<'_>) -> Result<String, WidgetError> + Send + Sync,
>;

/// What a remote handler gets besides the instance.
pub struct HandlerContext<'a> {
    /// Parameters of the in-band request.
    pub params: &'a OptionMap,
    /// Template engine, for handlers that answer with a fragment.
    pub templates: &'a dyn TemplateEngine,
}

impl fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Behaviour attached to a widget name: hooks, remote handlers, and optional
/// explicit asset subsets.
#[derive(Clone, Default)]
pub struct WidgetType {
    on_init: Option<Hook>,
    before_render: Option<Hook>,
    remote_calls: BTreeMap<String, RemoteHandler>,
    stylesheets: Option<Vec<String>>,
    scripts: Option<Vec<String>>,
}

impl WidgetType {
    /// Type with no behaviour (plain template widget).
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook run once after configuration is merged.
    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut WidgetInstance) -> Result<(), WidgetError> + Send + Sync + 'static,
    {
        self.on_init = Some(Arc::new(hook));
        self
    }

    /// Hook run at the start of every render.
    pub fn before_render<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut WidgetInstance) -> Result<(), WidgetError> + Send + Sync + 'static,
    {
        self.before_render = Some(Arc::new(hook));
        self
    }

    /// Register a handler reachable through remote calls as `name`.
    pub fn remote_call<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut WidgetInstance, &HandlerContext<'_>) -> Result<String, WidgetError>
            + Send
            + Sync
            + 'static,
    {
        self.remote_calls
            .insert(format!("{name}{REMOTE_CALL_SUFFIX}"), Arc::new(handler));
        self
    }

    /// Link only these stylesheets, in this order.
    pub fn stylesheets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stylesheets = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Link only these scripts, in this order.
    pub fn scripts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub(crate) fn on_init_hook(&self) -> Option<&Hook> {
        self.on_init.as_ref()
    }

    pub(crate) fn before_render_hook(&self) -> Option<&Hook> {
        self.before_render.as_ref()
    }

    /// Allowlisted handler for `name` (given without suffix).
    pub fn remote_handler(&self, name: &str) -> Option<&RemoteHandler> {
        self.remote_calls.get(&format!("{name}{REMOTE_CALL_SUFFIX}"))
    }

    /// Registered handler names, without suffix.
    pub fn remote_handler_names(&self) -> impl Iterator<Item = &str> {
        self.remote_calls
            .keys()
            .filter_map(|k| k.strip_suffix(REMOTE_CALL_SUFFIX))
    }

    /// Explicit stylesheet subset, if declared.
    pub fn explicit_stylesheets(&self) -> Option<&[String]> {
        self.stylesheets.as_deref()
    }

    /// Explicit script subset, if declared.
    pub fn explicit_scripts(&self) -> Option<&[String]> {
        self.scripts.as_deref()
    }
}

impl fmt::Debug for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetType")
            .field("on_init", &self.on_init.is_some())
            .field("before_render", &self.before_render.is_some())
            .field("remote_calls", &self.remote_calls.keys().collect::<Vec<_>>())
            .field("stylesheets", &self.stylesheets)
            .field("scripts", &self.scripts)
            .finish()
    }
}
