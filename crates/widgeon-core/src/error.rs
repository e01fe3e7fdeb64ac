// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy for widget resolution, construction, rendering and dispatch.

use std::fmt;

use thiserror::Error;
use widgeon_codec::CodecError;

use crate::config::ConfigError;
use crate::source::SourceError;

/// What kind of thing was missing in a [`WidgetError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Widget directory / definition.
    Widget,
    /// Template or partial.
    Template,
    /// Stylesheet or script file.
    Asset,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Widget => "widget",
            ResourceKind::Template => "template",
            ResourceKind::Asset => "asset",
        })
    }
}

/// Errors raised by the widget engine. None of these are recovered internally;
/// they surface to the render or dispatch entrypoint.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// Widget, template or asset absent.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of the missing resource.
        kind: ResourceKind,
        /// Name or path that was looked up.
        name: String,
    },
    /// A signed payload failed authentication, or its signed target disagrees
    /// with the request that carried it.
    #[error("integrity check failed: {0}")]
    Integrity(String),
    /// Malformed option map, config document or link options.
    #[error("malformed input: {0}")]
    Format(String),
    /// An option tried to rebind a reserved or system name.
    #[error("an option tried to overwrite `{name}`")]
    AttributeCollision {
        /// Offending attribute name.
        name: String,
    },
    /// The requested handler is not on the widget's remote-call allowlist.
    #[error("widget `{widget}` has no remote-call handler `{handler}`")]
    HandlerNotFound {
        /// Widget name.
        widget: String,
        /// Requested handler name (without suffix).
        handler: String,
    },
    /// A page-reload fallback was requested without the signed authorization.
    #[error("fallback redirect was not enabled by the signed payload")]
    FallbackDisabled,
    /// Operation attempted without the context it needs.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// Template engine failure other than a missing template.
    #[error("template error: {0}")]
    Template(String),
    /// Widget source I/O failure.
    #[error("widget source error: {0}")]
    Source(#[from] SourceError),
    /// Config store failure.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Signing failed on our side (unusable key, unserializable options).
    #[error("payload codec error: {0}")]
    Codec(CodecError),
}

impl WidgetError {
    /// Shorthand for a missing widget.
    pub fn widget_not_found(name: impl Into<String>) -> Self {
        WidgetError::NotFound {
            kind: ResourceKind::Widget,
            name: name.into(),
        }
    }

    /// Shorthand for a missing template.
    pub fn template_not_found(path: impl Into<String>) -> Self {
        WidgetError::NotFound {
            kind: ResourceKind::Template,
            name: path.into(),
        }
    }

    /// Shorthand for a missing asset.
    pub fn asset_not_found(path: impl Into<String>) -> Self {
        WidgetError::NotFound {
            kind: ResourceKind::Asset,
            name: path.into(),
        }
    }

    /// Returns `true` for any `NotFound` or `HandlerNotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WidgetError::NotFound { .. } | WidgetError::HandlerNotFound { .. }
        )
    }
}

impl From<CodecError> for WidgetError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Integrity(reason) => WidgetError::Integrity(reason.to_string()),
            CodecError::Format(reason) => WidgetError::Format(reason),
            other @ (CodecError::Encode(_) | CodecError::InvalidKey) => WidgetError::Codec(other),
        }
    }
}
