// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stateful server-rendered widgets.
//!
//! A widget type is identified by a directory name (`hello_world`) and made of
//! two halves:
//!
//! * a [`WidgetDefinition`] discovered through a [`WidgetSource`]: config
//!   defaults, asset lists, template path;
//! * an optional [`WidgetType`] registered in code: `on_init`/`before_render`
//!   hooks and the allowlist of remote-call handlers.
//!
//! The [`Registry`] resolves and caches definitions and creates
//! [`WidgetInstance`]s for a [`RequestContext`]. Instances merge configuration
//! (defaults < page state < caller options < signed callback options), keep
//! page and permanent state in the host [`SessionStore`], and render through a
//! [`TemplateEngine`]. Signed round-trips go through
//! [`widgeon_codec::PayloadCodec`] and come back via the [`Dispatcher`].
//!
//! The host framework stays outside: sessions, templates, URL helpers and the
//! widget files are all ports.
#![forbid(unsafe_code)]

pub mod assets;
pub mod config;
pub mod definition;
pub mod dispatch;
pub mod error;
pub mod helpers;
pub mod instance;
pub mod naming;
pub mod pagination;
pub mod registry;
pub mod request;
pub mod session;
pub mod source;
pub mod template;
pub mod view;

pub use assets::AssetSelection;
pub use definition::{HandlerContext, WidgetDefinition, WidgetType, REMOTE_CALL_SUFFIX};
pub use dispatch::{CallbackResponse, Dispatcher, RemoteCall};
pub use error::{ResourceKind, WidgetError};
pub use helpers::{DefaultHelpers, ViewHelpers};
pub use instance::WidgetInstance;
pub use pagination::{paginate, Pagination};
pub use registry::{AssetMode, Registry, ReloadPolicy, Settings};
pub use request::RequestContext;
pub use session::{SessionStore, StateTier};
pub use source::{AssetKind, SourceError, WidgetSource};
pub use template::{TemplateEngine, TemplateLocals};
pub use view::RenderPass;
pub use widgeon_codec::{CodecError, OptionMap, PayloadCodec};
