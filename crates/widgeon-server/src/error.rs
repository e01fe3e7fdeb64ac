// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HTTP mapping of widget errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};
use widgeon_core::WidgetError;

/// A [`WidgetError`] on its way out as a response.
#[derive(Debug)]
pub struct ApiError(pub WidgetError);

impl From<WidgetError> for ApiError {
    fn from(err: WidgetError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            WidgetError::NotFound { .. } | WidgetError::HandlerNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            WidgetError::Integrity(_) | WidgetError::FallbackDisabled => StatusCode::FORBIDDEN,
            WidgetError::Format(_) | WidgetError::AttributeCollision { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
            return (status, "internal error").into_response();
        }
        if status == StatusCode::FORBIDDEN {
            warn!(error = %self.0, "request refused");
        }
        (status, self.0.to_string()).into_response()
    }
}
