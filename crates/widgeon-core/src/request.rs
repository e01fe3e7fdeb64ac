// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-request context supplied by the host.

use std::fmt;

use crate::session::SessionStore;
use crate::OptionMap;

/// Query/form parameter carrying the signed payload of a callback or remote call.
pub const CALL_OPTIONS_PARAM: &str = "call_options";
/// Query parameter carrying a static-callback payload on a full page load.
pub const CALLBACK_PARAM: &str = "widgeon_callback";
/// Query parameter naming the widget a static callback targets.
pub const CALLBACK_CLASS_PARAM: &str = "widgeon_class";
/// Query parameter naming the widget id a static callback targets.
pub const CALLBACK_ID_PARAM: &str = "widgeon_id";

/// The current request as seen by widgets: path, parameters, the issuing
/// controller, whether it arrived via XHR, and the session it may persist to.
///
/// Never owned by a widget; instances copy what they need at construction and
/// borrow the context again for rendering.
pub struct RequestContext<'s> {
    path: String,
    params: OptionMap,
    controller: String,
    xhr: bool,
    session: Option<&'s mut dyn SessionStore>,
}

impl<'s> RequestContext<'s> {
    /// Context without a session; rendering it fails with `Precondition`.
    pub fn new(path: impl Into<String>, params: OptionMap) -> Self {
        Self {
            path: path.into(),
            params,
            controller: String::new(),
            xhr: false,
            session: None,
        }
    }

    /// Attach the session store.
    pub fn with_session(mut self, session: &'s mut dyn SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    /// Name the controller/handler that issued the render.
    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = controller.into();
        self
    }

    /// Mark the request as XHR.
    pub fn with_xhr(mut self, xhr: bool) -> Self {
        self.xhr = xhr;
        self
    }

    /// Request path (without query).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request parameters.
    pub fn params(&self) -> &OptionMap {
        &self.params
    }

    /// String-valued parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Issuing controller name (may be empty).
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Whether the request arrived via XHR.
    pub fn is_xhr(&self) -> bool {
        self.xhr
    }

    /// Whether a session is bound.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Read access to the session.
    pub fn session(&self) -> Option<&(dyn SessionStore + 's)> {
        self.session.as_deref()
    }

    /// Write access to the session.
    pub fn session_mut(&mut self) -> Option<&mut (dyn SessionStore + 's)> {
        self.session.as_deref_mut()
    }

    /// Whether this page load carries a static callback for any widget.
    pub fn has_callback(&self) -> bool {
        self.param(CALLBACK_PARAM).is_some()
    }
}

impl fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("path", &self.path)
            .field("params", &self.params)
            .field("controller", &self.controller)
            .field("xhr", &self.xhr)
            .field("session", &self.session.is_some())
            .finish()
    }
}
