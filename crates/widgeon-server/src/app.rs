// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Router, shared state and request handlers.
//!
//! The widget engine is synchronous; handlers take the session lock, run the
//! engine to completion and release it before building the response.
//!
//! A session is only kept (and its cookie only issued) once a request leaves
//! state in it. Sessions idle for longer than the configured timeout are
//! dropped on their next lookup, and the least recently used ones are evicted
//! when the map grows past its limit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use widgeon_core::request::CALL_OPTIONS_PARAM;
use widgeon_core::{
    AssetKind, AssetSelection, CallbackResponse, DefaultHelpers, Dispatcher, OptionMap, Registry,
    RemoteCall, RenderPass, RequestContext, TemplateEngine, WidgetError,
};

use crate::error::ApiError;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "widgeon_session";

type Session = HashMap<String, OptionMap>;
type Params = HashMap<String, String>;

/// Bounds on the in-memory session map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
}

struct SessionEntry {
    data: Session,
    last_seen: Instant,
}

pub struct AppState {
    registry: Registry,
    templates: Arc<dyn TemplateEngine>,
    limits: SessionLimits,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl AppState {
    pub fn new(
        registry: Registry,
        templates: Arc<dyn TemplateEngine>,
        limits: SessionLimits,
    ) -> Self {
        Self {
            registry,
            templates,
            limits,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn mount(&self) -> &str {
        &self.registry.settings().mount
    }

    fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(&self.registry, self.templates.as_ref())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let mount = state.mount().to_owned();
    Router::new()
        .route(
            &format!("/{mount}/callback"),
            get(callback_get).post(callback_post),
        )
        .route(
            &format!("/{mount}/remote_call/{{widget}}/{{handler}}"),
            get(remote_call),
        )
        .route(&format!("/{mount}/{{widget}}/{{dir}}/{{file}}"), get(asset))
        .route("/preview/{widget}", get(preview))
        .with_state(state)
}

struct SessionId {
    id: String,
    fresh: bool,
}

impl SessionId {
    fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE && is_session_id(value))
            .map(|(_, value)| value.to_owned());
        match existing {
            Some(id) => Self { id, fresh: false },
            None => Self {
                id: hex::encode(rand::random::<[u8; 16]>()),
                fresh: true,
            },
        }
    }

    fn attach(&self, mut response: Response) -> Response {
        if self.fresh {
            let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
        response
    }
}

fn is_session_id(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

fn option_map(params: Params) -> OptionMap {
    params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

fn payload_of(params: &OptionMap) -> Result<String, WidgetError> {
    params
        .get(CALL_OPTIONS_PARAM)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| WidgetError::Format(format!("missing `{CALL_OPTIONS_PARAM}`")))
}

/// Run `f` against the caller's session. The session is stored, and a fresh
/// cookie issued, only when `f` leaves something in it.
async fn with_session<F>(state: &AppState, headers: &HeaderMap, f: F) -> Response
where
    F: FnOnce(&mut Session) -> Result<Response, WidgetError>,
{
    let sid = SessionId::from_headers(headers);
    let (result, kept) = {
        let mut sessions = state.sessions.lock().await;
        let now = Instant::now();
        let mut session = sessions
            .remove(&sid.id)
            .filter(|entry| now.duration_since(entry.last_seen) <= state.limits.idle_timeout)
            .map(|entry| entry.data)
            .unwrap_or_default();
        let result = f(&mut session);
        let kept = !session.is_empty();
        if kept {
            sessions.insert(
                sid.id.clone(),
                SessionEntry {
                    data: session,
                    last_seen: now,
                },
            );
            prune(&mut sessions, &state.limits, now);
        }
        (result, kept)
    };
    let response = result.unwrap_or_else(|err| ApiError(err).into_response());
    if kept {
        sid.attach(response)
    } else {
        response
    }
}

/// Drop idle sessions, then the least recently used ones, until the map fits.
fn prune(sessions: &mut HashMap<String, SessionEntry>, limits: &SessionLimits, now: Instant) {
    let max = limits.max_sessions.max(1);
    if sessions.len() <= max {
        return;
    }
    sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= limits.idle_timeout);
    while sessions.len() > max {
        let Some(oldest) = sessions
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(id, _)| id.clone())
        else {
            break;
        };
        sessions.remove(&oldest);
    }
    debug!(sessions = sessions.len(), "pruned session map");
}

pub async fn callback_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Params>,
) -> Response {
    callback(&state, &headers, query).await
}

pub async fn callback_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(mut query): Query<Params>,
    Form(form): Form<Params>,
) -> Response {
    query.extend(form);
    callback(&state, &headers, query).await
}

async fn callback(state: &AppState, headers: &HeaderMap, params: Params) -> Response {
    let xhr = is_xhr(headers);
    let params = option_map(params);
    with_session(state, headers, |session| {
        let payload = payload_of(&params)?;
        let mut ctx = RequestContext::new(format!("/{}/callback", state.mount()), params)
            .with_session(session)
            .with_controller("widgeon")
            .with_xhr(xhr);
        Ok(match state.dispatcher().callback(&payload, &mut ctx)? {
            CallbackResponse::Fragment(html) => Html(html).into_response(),
            CallbackResponse::Redirect(to) => Redirect::to(&to).into_response(),
        })
    })
    .await
}

pub async fn remote_call(
    State(state): State<Arc<AppState>>,
    Path((widget, handler)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<Params>,
) -> Response {
    let xhr = is_xhr(&headers);
    let params = option_map(query);
    with_session(&state, &headers, |session| {
        let payload = payload_of(&params)?;
        let path = format!("/{}/remote_call/{widget}/{handler}", state.mount());
        let mut ctx = RequestContext::new(path, params)
            .with_session(session)
            .with_controller("widgeon")
            .with_xhr(xhr);
        let call = RemoteCall {
            widget_name: &widget,
            handler: &handler,
            payload: &payload,
        };
        let body = state.dispatcher().remote_call(&call, &mut ctx)?;
        Ok(Html(body).into_response())
    })
    .await
}

pub async fn asset(
    State(state): State<Arc<AppState>>,
    Path((widget, dir, file)): Path<(String, String, String)>,
) -> Response {
    let Some(kind) = AssetKind::from_dir(&dir) else {
        return ApiError(WidgetError::asset_not_found(format!("{widget}/{dir}/{file}")))
            .into_response();
    };
    match state.registry.read_asset(&widget, kind, &file) {
        Ok(bytes) => {
            debug!(widget = %widget, file = %file, "serving widget asset");
            ([(CONTENT_TYPE, kind.content_type())], bytes).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

/// One widget on a bare page, with links for the assets it used. An `id`
/// query parameter names the instance.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path(widget): Path<String>,
    headers: HeaderMap,
    Query(query): Query<Params>,
) -> Response {
    let mut options = OptionMap::new();
    if let Some(id) = query.get("id") {
        options.insert("id".into(), Value::String(id.clone()));
    }
    let params = option_map(query);
    with_session(&state, &headers, |session| {
        let ctx = RequestContext::new(format!("/preview/{widget}"), params)
            .with_session(session)
            .with_controller("preview");
        let mut pass = RenderPass::new(
            &state.registry,
            state.templates.as_ref(),
            &DefaultHelpers,
            ctx,
        );
        let body = pass.widget(&widget, options)?;
        let styles = pass.stylesheet_links(&AssetSelection::Auto)?;
        let scripts = pass.script_links(&AssetSelection::Auto)?;
        Ok(Html(format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<title>{}</title>\n{styles}{scripts}</head>\n<body>\n{body}\n</body>\n</html>\n",
            html_escape::encode_text(&widget)
        ))
        .into_response())
    })
    .await
}
