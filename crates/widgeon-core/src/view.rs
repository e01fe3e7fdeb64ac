// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One page render: the view-level `widget(...)` entrypoint plus asset links.

use std::collections::HashMap;

use crate::assets::{asset_links, AssetSelection};
use crate::error::WidgetError;
use crate::helpers::ViewHelpers;
use crate::instance::WidgetInstance;
use crate::registry::Registry;
use crate::request::RequestContext;
use crate::source::AssetKind;
use crate::template::TemplateEngine;
use crate::OptionMap;

/// State of a single page render.
///
/// Tracks which widgets were rendered (for [`AssetSelection::Auto`]) and
/// caches link markup per resolved widget set for the lifetime of the pass.
pub struct RenderPass<'r, 's> {
    registry: &'r Registry,
    templates: &'r dyn TemplateEngine,
    helpers: &'r dyn ViewHelpers,
    ctx: RequestContext<'s>,
    touched: Vec<String>,
    current: Option<WidgetInstance>,
    link_cache: HashMap<(AssetKind, Vec<String>), String>,
}

impl<'r, 's> RenderPass<'r, 's> {
    /// Start a pass for one request.
    pub fn new(
        registry: &'r Registry,
        templates: &'r dyn TemplateEngine,
        helpers: &'r dyn ViewHelpers,
        ctx: RequestContext<'s>,
    ) -> Self {
        Self {
            registry,
            templates,
            helpers,
            ctx,
            touched: Vec::new(),
            current: None,
            link_cache: HashMap::new(),
        }
    }

    /// Create and render `name` with `options`.
    pub fn widget(&mut self, name: &str, options: OptionMap) -> Result<String, WidgetError> {
        let mut widget = self.registry.create(name, &self.ctx, options)?;
        let html = widget.render(&mut self.ctx, self.templates)?;
        if !self.touched.iter().any(|t| t == name) {
            self.touched.push(name.to_owned());
        }
        self.current = Some(widget);
        Ok(html)
    }

    /// Render a partial of the most recently rendered widget.
    pub fn widget_partial(&self, partial: &str, locals: OptionMap) -> Result<String, WidgetError> {
        let widget = self.current.as_ref().ok_or_else(|| {
            WidgetError::Precondition("widget_partial called before any widget was rendered".into())
        })?;
        widget.partial(self.templates, partial, locals)
    }

    /// Remote link for the most recently rendered widget.
    pub fn widget_remote_link(
        &self,
        text: &str,
        options: OptionMap,
        html_options: OptionMap,
    ) -> Result<String, WidgetError> {
        let widget = self.current.as_ref().ok_or_else(|| {
            WidgetError::Precondition("remote link requested before any widget was rendered".into())
        })?;
        widget.remote_link(self.helpers, text, options, html_options)
    }

    /// Backlink for the most recently rendered widget.
    pub fn widget_backlink(&self, text: &str, options: OptionMap) -> Result<String, WidgetError> {
        let widget = self.current.as_ref().ok_or_else(|| {
            WidgetError::Precondition("backlink requested before any widget was rendered".into())
        })?;
        widget.backlink(text, options)
    }

    /// `<link>` tags for the selected widgets.
    pub fn stylesheet_links(&mut self, selection: &AssetSelection) -> Result<String, WidgetError> {
        self.links(AssetKind::Stylesheet, selection)
    }

    /// `<script>` tags for the selected widgets.
    pub fn script_links(&mut self, selection: &AssetSelection) -> Result<String, WidgetError> {
        self.links(AssetKind::Script, selection)
    }

    fn links(&mut self, kind: AssetKind, selection: &AssetSelection) -> Result<String, WidgetError> {
        let widgets = match selection {
            AssetSelection::Named(names) => names.clone(),
            AssetSelection::All => self.registry.list_all()?.to_vec(),
            AssetSelection::Auto => self.touched.clone(),
        };
        let key = (kind, widgets);
        if let Some(html) = self.link_cache.get(&key) {
            return Ok(html.clone());
        }
        let html = asset_links(self.registry, &key.1, kind)?;
        self.link_cache.insert(key, html.clone());
        Ok(html)
    }

    /// Widgets rendered so far, in first-render order.
    pub fn touched(&self) -> &[String] {
        &self.touched
    }

    /// The most recently rendered widget.
    pub fn current(&self) -> Option<&WidgetInstance> {
        self.current.as_ref()
    }

    /// View helpers of this pass.
    pub fn helpers(&self) -> &dyn ViewHelpers {
        self.helpers
    }

    /// Request context.
    pub fn context(&self) -> &RequestContext<'s> {
        &self.ctx
    }

    /// Mutable request context.
    pub fn context_mut(&mut self) -> &mut RequestContext<'s> {
        &mut self.ctx
    }

    /// End the pass and hand the context back.
    pub fn into_context(self) -> RequestContext<'s> {
        self.ctx
    }
}

impl std::fmt::Debug for RenderPass<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("ctx", &self.ctx)
            .field("touched", &self.touched)
            .finish_non_exhaustive()
    }
}
