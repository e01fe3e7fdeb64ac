// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fixture widgets shared by the widgeon test suites.
//!
//! - `hello_world`: config `greeting: Hello World!`, main template
//!   `<p>{{ greeting }}</p>`, a `list` template, and one remote handler
//!   `test_callback`.
//! - `asset_test`: three stylesheets, three scripts and an inline style.
//! - `counter`: keeps `count` in permanent state, seeded once by `on_init`;
//!   `increment` bumps it, `reset` clears it.
//! - `pager`: `total_pages: 5` in config; `before_render` renders page links
//!   for the current `page` into `pages`.

use std::sync::Arc;

use serde_json::{json, Value};
use widgeon_codec::PayloadCodec;
use widgeon_core::{
    paginate, AssetKind, DefaultHelpers, OptionMap, Pagination, Registry, Settings, WidgetError,
    WidgetSource, WidgetType,
};

use crate::source::InMemoryWidgetSource;
use crate::templates::MemoryTemplates;

/// Signing secret used by fixture registries.
pub const TEST_SECRET: &str = "widgeon-test-secret";

/// Option map from a JSON object literal; anything else becomes empty.
pub fn map(value: Value) -> OptionMap {
    match value {
        Value::Object(map) => map,
        _ => OptionMap::new(),
    }
}

/// Source holding the fixture widgets.
pub fn fixture_source() -> InMemoryWidgetSource {
    let mut source = InMemoryWidgetSource::new()
        .with_config("hello_world", "greeting: Hello World!\n")
        .with_config("counter", "# counts clicks\n")
        .with_config("asset_test", "")
        .with_config("pager", "total_pages: 5\n")
        .with_inline_style("asset_test", ".asset_test_widget { color: red; }");
    for n in 1..=3 {
        source = source
            .with_asset(
                "asset_test",
                AssetKind::Stylesheet,
                &format!("style{n}"),
                &format!(".style{n} {{}}"),
            )
            .with_asset(
                "asset_test",
                AssetKind::Script,
                &format!("script{n}"),
                &format!("var script{n};"),
            );
    }
    source
}

/// Templates of the fixture widgets.
pub fn fixture_templates() -> MemoryTemplates {
    MemoryTemplates::new()
        .with("widgets/hello_world/hello_world_widget", "<p>{{ greeting }}</p>")
        .with(
            "widgets/hello_world/list",
            "<ul><li>{{ hello_world_widget.greeting }}</li></ul>",
        )
        .with("widgets/hello_world/item", "<li>{{ item }} by {{ id }}</li>")
        .with("widgets/asset_test/asset_test_widget", "<p>assets</p>")
        .with(
            "widgets/counter/counter_widget",
            "<span class=\"count\">{{ count }}</span>",
        )
        .with("widgets/pager/pager_widget", "<p>page {{ page }}</p>{{& pages }}")
}

/// Behaviour registered for the fixture widgets.
pub fn fixture_types() -> Vec<(&'static str, WidgetType)> {
    vec![
        (
            "hello_world",
            WidgetType::new().remote_call("test_callback", |widget, _| {
                Ok(format!(
                    "callback for {} says {}",
                    widget.global_id(),
                    widget.get_str("greeting").unwrap_or_default()
                ))
            }),
        ),
        ("counter", counter_type()),
        ("pager", pager_type()),
    ]
}

fn counter_type() -> WidgetType {
    WidgetType::new()
        .on_init(|widget| {
            if !widget.permanent_state().contains_key("count") {
                widget.permanent_state_mut().insert("count".into(), json!(0));
            }
            Ok(())
        })
        .before_render(|widget| {
            let count = current_count(widget.permanent_state());
            widget.assign("count", count);
            Ok(())
        })
        .remote_call("increment", |widget, _| {
            let count = current_count(widget.permanent_state()) + 1;
            widget
                .permanent_state_mut()
                .insert("count".into(), json!(count));
            Ok(count.to_string())
        })
        .remote_call("reset", |widget, _| {
            widget.clear_permanent_state();
            Ok(String::new())
        })
        .remote_call("fragment", |widget, hctx| {
            let count = current_count(widget.permanent_state());
            widget.set("count", count)?;
            widget.render_template(hctx.templates, "counter_widget")
        })
}

fn pager_type() -> WidgetType {
    WidgetType::new().before_render(|widget| {
        let current = widget.get("page").and_then(page_number).unwrap_or(1);
        let total = widget
            .get("total_pages")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        let links = paginate(
            widget,
            &DefaultHelpers,
            &Pagination::new(current, total),
            &OptionMap::new(),
        )?;
        widget.assign("page", current);
        widget.assign("pages", links.unwrap_or_default());
        Ok(())
    })
}

fn page_number(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn current_count(state: &OptionMap) -> u64 {
    state.get("count").and_then(Value::as_u64).unwrap_or(0)
}

/// Registry over `source` with the fixture types and [`TEST_SECRET`].
pub fn fixture_registry_with(
    source: Arc<dyn WidgetSource>,
    settings: Settings,
) -> Result<Registry, WidgetError> {
    let codec = PayloadCodec::from_secret(TEST_SECRET)?;
    let mut registry = Registry::new(source, codec, settings);
    for (name, widget_type) in fixture_types() {
        registry.register(name, widget_type);
    }
    Ok(registry)
}

/// Registry over [`fixture_source`] with default settings.
pub fn fixture_registry() -> Result<(InMemoryWidgetSource, Registry), WidgetError> {
    let source = fixture_source();
    let registry = fixture_registry_with(Arc::new(source.clone()), Settings::default())?;
    Ok((source, registry))
}
