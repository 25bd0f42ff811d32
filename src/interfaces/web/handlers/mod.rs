pub mod productions;
pub mod providers;
pub mod stream;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::core::production::FlowError;

/// JSON error body with a stable `code` and a status derived from it.
pub(crate) struct ApiError(FlowError);

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        Self(e)
    }
}

fn status_for(e: &FlowError) -> StatusCode {
    match e {
        FlowError::InvalidTransition { .. } | FlowError::ConcurrencyConflict { .. } => {
            StatusCode::CONFLICT
        }
        FlowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlowError::NotFound(_) => StatusCode::NOT_FOUND,
        FlowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": self.0.to_string(),
                "code": self.0.code(),
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    /// Run generation before responding instead of in the background.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AfterQuery {
    #[serde(default)]
    pub after: i64,
}
