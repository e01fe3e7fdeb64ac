// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use serde_json::{json, Value};
use url::Url;
use widgeon_core::{
    CallbackResponse, DefaultHelpers, Dispatcher, OptionMap, PayloadCodec, Registry, RemoteCall,
    RequestContext, WidgetError, WidgetInstance,
};
use widgeon_dry_tests::{
    fixture_registry, fixture_templates, map, MemorySession, MemoryTemplates, TEST_SECRET,
};

fn setup() -> (Registry, MemoryTemplates) {
    let (_, registry) = fixture_registry().unwrap();
    (registry, fixture_templates())
}

fn signed(options: Value) -> String {
    PayloadCodec::from_secret(TEST_SECRET)
        .unwrap()
        .encode(&options)
        .unwrap()
}

/// Query parameters of a local URL as an option map.
fn query(url: &str) -> OptionMap {
    Url::parse(&format!("http://localhost{url}"))
        .unwrap()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

fn attr(html: &str, name: &str) -> String {
    let start = html.find(&format!("{name}=\"")).unwrap() + name.len() + 2;
    let end = start + html[start..].find('"').unwrap();
    html[start..end].replace("&amp;", "&")
}

fn page_widget(registry: &Registry, ctx: &RequestContext<'_>) -> WidgetInstance {
    registry.create("hello_world", ctx, OptionMap::new()).unwrap()
}

#[test]
fn remote_call_invokes_allowlisted_handler() {
    let (registry, templates) = setup();
    let mut session = MemorySession::new();
    let mut ctx = RequestContext::new("/widgeon/remote_call", OptionMap::new())
        .with_session(&mut session)
        .with_xhr(true);
    let payload = signed(json!({"widget_class": "hello_world", "widget_id": "side"}));
    let body = Dispatcher::new(&registry, &templates)
        .remote_call(
            &RemoteCall {
                widget_name: "hello_world",
                handler: "test_callback",
                payload: &payload,
            },
            &mut ctx,
        )
        .unwrap();
    assert_eq!(body, "callback for hello_world-side says Hello World!");
}

#[test]
fn handler_outside_the_allowlist_is_rejected_despite_valid_signature() {
    let (registry, templates) = setup();
    let mut ctx = RequestContext::new("/", OptionMap::new());
    let payload = signed(json!({"widget_class": "hello_world", "widget_id": "default"}));
    let dispatcher = Dispatcher::new(&registry, &templates);
    for handler in ["render", "on_init", "test_callback_remotecall", "permanent_state"] {
        let err = dispatcher
            .remote_call(
                &RemoteCall {
                    widget_name: "hello_world",
                    handler,
                    payload: &payload,
                },
                &mut ctx,
            )
            .unwrap_err();
        assert!(
            matches!(err, WidgetError::HandlerNotFound { handler: ref h, .. } if h == handler),
            "{handler}: {err:?}"
        );
    }
}

#[test]
fn route_must_match_signed_widget() {
    let (registry, templates) = setup();
    let mut ctx = RequestContext::new("/", OptionMap::new());
    let payload = signed(json!({"widget_class": "counter", "widget_id": "default"}));
    let err = Dispatcher::new(&registry, &templates)
        .remote_call(
            &RemoteCall {
                widget_name: "hello_world",
                handler: "test_callback",
                payload: &payload,
            },
            &mut ctx,
        )
        .unwrap_err();
    assert!(matches!(err, WidgetError::Integrity(_)));
}

#[test]
fn changed_secret_is_an_integrity_error() {
    let (registry, templates) = setup();
    let mut ctx = RequestContext::new("/", OptionMap::new());
    let payload = PayloadCodec::from_secret("12345")
        .unwrap()
        .encode(&json!({"widget_class": "hello_world", "widget_id": "default"}))
        .unwrap();
    let err = Dispatcher::new(&registry, &templates)
        .remote_call(
            &RemoteCall {
                widget_name: "hello_world",
                handler: "test_callback",
                payload: &payload,
            },
            &mut ctx,
        )
        .unwrap_err();
    assert!(matches!(err, WidgetError::Integrity(_)));
}

#[test]
fn unknown_widget_in_remote_call_is_not_found() {
    let (registry, templates) = setup();
    let mut ctx = RequestContext::new("/", OptionMap::new());
    let payload = signed(json!({"widget_class": "nope", "widget_id": "default"}));
    let err = Dispatcher::new(&registry, &templates)
        .remote_call(
            &RemoteCall {
                widget_name: "nope",
                handler: "test_callback",
                payload: &payload,
            },
            &mut ctx,
        )
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn signed_options_override_request_params() {
    let (registry, templates) = setup();
    let dispatcher = Dispatcher::new(&registry, &templates);
    let call = |payload: &str, params: Value| {
        let mut ctx = RequestContext::new("/", map(params));
        dispatcher
            .remote_call(
                &RemoteCall {
                    widget_name: "hello_world",
                    handler: "test_callback",
                    payload,
                },
                &mut ctx,
            )
            .unwrap()
    };
    let with_greeting = signed(json!({"widget_class": "hello_world", "greeting": "Signed"}));
    assert!(call(&with_greeting, json!({"greeting": "Param"})).ends_with("says Signed"));
    let bare = signed(json!({"widget_class": "hello_world"}));
    assert!(call(&bare, json!({"greeting": "Param", "render": "ignored"})).ends_with("says Param"));
}

#[test]
fn remote_calls_persist_permanent_state() {
    let (registry, templates) = setup();
    let session = MemorySession::new();
    let mut handle = session.clone();
    let mut ctx = RequestContext::new("/", OptionMap::new()).with_session(&mut handle);
    let dispatcher = Dispatcher::new(&registry, &templates);
    let payload = signed(json!({"widget_class": "counter", "widget_id": "default"}));
    let mut call = |handler: &str| {
        dispatcher
            .remote_call(
                &RemoteCall {
                    widget_name: "counter",
                    handler,
                    payload: &payload,
                },
                &mut ctx,
            )
            .unwrap()
    };
    assert_eq!(call("increment"), "1");
    assert_eq!(call("increment"), "2");
    assert_eq!(call("fragment"), "<span class=\"count\">2</span>");
    call("reset");
    drop(ctx);
    assert!(session
        .get("widget_counter_default_permanent")
        .unwrap()
        .is_empty());
}

#[test]
fn xhr_callback_refreshes_a_template() {
    let (registry, templates) = setup();
    let mut page_session = MemorySession::new();
    let page = RequestContext::new("/posts", OptionMap::new()).with_session(&mut page_session);
    let link = page_widget(&registry, &page)
        .remote_link(
            &DefaultHelpers,
            "more",
            map(json!({"refresh": "default", "greeting": "Clicked"})),
            OptionMap::new(),
        )
        .unwrap();
    let payload = query(&attr(&link, "data-remote"))["call_options"]
        .as_str()
        .unwrap()
        .to_owned();

    let mut session = MemorySession::new();
    let mut ctx = RequestContext::new("/widgeon/callback", OptionMap::new())
        .with_session(&mut session)
        .with_xhr(true);
    let response = Dispatcher::new(&registry, &templates)
        .callback(&payload, &mut ctx)
        .unwrap();
    assert_eq!(response, CallbackResponse::Fragment("<p>Clicked</p>".into()));

    // Page state from the previous refresh carries the clicked greeting.
    let list = signed(json!({"widget_class": "hello_world", "refresh": "list"}));
    let response = Dispatcher::new(&registry, &templates)
        .callback(&list, &mut ctx)
        .unwrap();
    assert_eq!(
        response,
        CallbackResponse::Fragment("<ul><li>Clicked</li></ul>".into())
    );

    let mut fresh = MemorySession::new();
    let mut ctx = RequestContext::new("/widgeon/callback", OptionMap::new())
        .with_session(&mut fresh)
        .with_xhr(true);
    let response = Dispatcher::new(&registry, &templates)
        .callback(&list, &mut ctx)
        .unwrap();
    assert_eq!(
        response,
        CallbackResponse::Fragment("<ul><li>Hello World!</li></ul>".into())
    );
}

#[test]
fn xhr_callback_runs_javascript_handler() {
    let (registry, templates) = setup();
    let page = RequestContext::new("/", OptionMap::new());
    let link = page_widget(&registry, &page)
        .remote_link(
            &DefaultHelpers,
            "go",
            map(json!({"javascript": "test_callback"})),
            OptionMap::new(),
        )
        .unwrap();
    assert_eq!(attr(&link, "href"), "#");
    let payload = query(&attr(&link, "data-remote"))["call_options"]
        .as_str()
        .unwrap()
        .to_owned();
    let mut ctx = RequestContext::new("/widgeon/callback", OptionMap::new()).with_xhr(true);
    let response = Dispatcher::new(&registry, &templates)
        .callback(&payload, &mut ctx)
        .unwrap();
    assert_eq!(
        response,
        CallbackResponse::Fragment("callback for hello_world-default says Hello World!".into())
    );
}

#[test]
fn page_reload_fallback_redirects_into_a_static_callback() {
    let (registry, templates) = setup();
    let page = RequestContext::new("/posts", map(json!({"page": "2"})));
    let link = page_widget(&registry, &page)
        .remote_link(
            &DefaultHelpers,
            "more",
            map(json!({"refresh": "default", "greeting": "Clicked"})),
            OptionMap::new(),
        )
        .unwrap();
    let href = attr(&link, "href");
    assert!(href.starts_with("/widgeon/callback?call_options="));
    let payload = query(&href)["call_options"].as_str().unwrap().to_owned();

    let mut ctx = RequestContext::new("/widgeon/callback", OptionMap::new());
    let CallbackResponse::Redirect(location) = Dispatcher::new(&registry, &templates)
        .callback(&payload, &mut ctx)
        .unwrap()
    else {
        panic!("expected a redirect");
    };
    assert!(location.starts_with("/posts?"));
    let params = query(&location);
    assert_eq!(params["page"], "2");
    assert_eq!(params["widgeon_class"], "hello_world");
    assert_eq!(params["widgeon_id"], "default");

    let mut session = MemorySession::new();
    let mut reload = RequestContext::new("/posts", params).with_session(&mut session);
    let mut target = registry.create("hello_world", &reload, OptionMap::new()).unwrap();
    assert!(target.is_callback_active());
    assert!(target.render(&mut reload, &templates).unwrap().contains("<p>Clicked</p>"));

    let bystander = registry.create("counter", &reload, OptionMap::new()).unwrap();
    assert!(bystander.is_callback_request());
    assert!(!bystander.is_callback_active());
}

#[test]
fn fallback_without_signed_authorization_is_refused() {
    let (registry, templates) = setup();
    let payload = signed(json!({
        "widget_class": "hello_world",
        "widget_id": "default",
        "refresh": "default",
        "request_path": "/posts"
    }));
    let mut ctx = RequestContext::new("/widgeon/callback", OptionMap::new());
    let err = Dispatcher::new(&registry, &templates)
        .callback(&payload, &mut ctx)
        .unwrap_err();
    assert!(matches!(err, WidgetError::FallbackDisabled));
}

#[test]
fn fallback_only_redirects_to_local_paths() {
    let (registry, templates) = setup();
    for path in ["//evil.example/", "https://evil.example/", "posts"] {
        let payload = signed(json!({
            "widget_class": "hello_world",
            "refresh": "default",
            "fallback_enabled": true,
            "request_path": path
        }));
        let mut ctx = RequestContext::new("/widgeon/callback", OptionMap::new());
        let err = Dispatcher::new(&registry, &templates)
            .callback(&payload, &mut ctx)
            .unwrap_err();
        assert!(matches!(err, WidgetError::Format(_)), "{path}");
    }
}

#[test]
fn callback_without_mode_is_a_format_error() {
    let (registry, templates) = setup();
    let payload = signed(json!({"widget_class": "hello_world"}));
    let mut ctx = RequestContext::new("/widgeon/callback", OptionMap::new()).with_xhr(true);
    let err = Dispatcher::new(&registry, &templates)
        .callback(&payload, &mut ctx)
        .unwrap_err();
    assert!(matches!(err, WidgetError::Format(_)));
}

#[test]
fn backlink_round_trip() {
    let (registry, templates) = setup();
    let page = RequestContext::new("/posts", OptionMap::new());
    let html = page_widget(&registry, &page)
        .backlink("back", map(json!({"greeting": "Back again"})))
        .unwrap();
    let payload = attr(&html, "value");

    let mut session = MemorySession::new();
    let mut xhr = RequestContext::new("/widgeon/callback", OptionMap::new())
        .with_session(&mut session)
        .with_xhr(true);
    let response = Dispatcher::new(&registry, &templates)
        .callback(&payload, &mut xhr)
        .unwrap();
    assert_eq!(response, CallbackResponse::Fragment("<p>Back again</p>".into()));

    let mut post = RequestContext::new("/widgeon/callback", OptionMap::new());
    let response = Dispatcher::new(&registry, &templates)
        .callback(&payload, &mut post)
        .unwrap();
    assert!(matches!(response, CallbackResponse::Redirect(ref to) if to.starts_with("/posts?")));
}

#[test]
fn reload_links_in_refreshed_fragments_return_to_the_page() {
    let (registry, templates) = setup();
    let dispatcher = Dispatcher::new(&registry, &templates);
    let mut session = MemorySession::new();

    let mut page = RequestContext::new("/posts", map(json!({"sort": "new"})))
        .with_session(&mut session);
    let html = registry
        .create("pager", &page, OptionMap::new())
        .unwrap()
        .render(&mut page, &templates)
        .unwrap();
    drop(page);
    let next = query(&attr(&html, "data-remote"))["call_options"]
        .as_str()
        .unwrap()
        .to_owned();

    let mut xhr = RequestContext::new("/widgeon/callback", map(json!({"call_options": next})))
        .with_session(&mut session)
        .with_xhr(true);
    let CallbackResponse::Fragment(fragment) = dispatcher.callback(&next, &mut xhr).unwrap() else {
        panic!("expected a fragment");
    };
    drop(xhr);
    assert!(fragment.starts_with("<p>page 2</p>"));

    // The "1" link of the refreshed fragment, followed without scripting.
    let href = attr(&fragment, "href");
    assert!(href.starts_with("/widgeon/callback?call_options="));
    let previous = query(&href)["call_options"].as_str().unwrap().to_owned();
    let mut plain = RequestContext::new("/widgeon/callback", query(&href));
    let CallbackResponse::Redirect(location) = dispatcher.callback(&previous, &mut plain).unwrap()
    else {
        panic!("expected a redirect");
    };
    assert!(
        location.starts_with("/posts?sort=new&widgeon_callback="),
        "{location}"
    );

    let mut reload = RequestContext::new("/posts", query(&location)).with_session(&mut session);
    let mut widget = registry.create("pager", &reload, OptionMap::new()).unwrap();
    assert!(widget.is_callback_active());
    let html = widget.render(&mut reload, &templates).unwrap();
    assert!(html.contains("<p>page 1</p>"));
}

#[test]
fn remote_handlers_leave_page_state_alone() {
    let (registry, templates) = setup();
    let session = MemorySession::new();
    let mut handle = session.clone();
    let mut ctx = RequestContext::new("/", OptionMap::new()).with_session(&mut handle);
    let payload = signed(json!({"widget_class": "counter", "widget_id": "default"}));
    let body = Dispatcher::new(&registry, &templates)
        .remote_call(
            &RemoteCall {
                widget_name: "counter",
                handler: "fragment",
                payload: &payload,
            },
            &mut ctx,
        )
        .unwrap();
    drop(ctx);
    assert_eq!(body, "<span class=\"count\">0</span>");
    assert!(session.get("widget_counter_default_page").is_none());
    assert_eq!(
        session.get("widget_counter_default_permanent").unwrap(),
        map(json!({"count": 0}))
    );
}
