use crate::utils::error::{ErrorCategory, SplitError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

impl SplitError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SplitError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            SplitError::SessionConfirmed | SplitError::SessionNotConfirmed => StatusCode::CONFLICT,
            SplitError::NoSourceImages => StatusCode::BAD_REQUEST,
            SplitError::FormatError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => match self.category() {
                ErrorCategory::Intake => StatusCode::BAD_REQUEST,
                ErrorCategory::Parsing => StatusCode::BAD_GATEWAY,
                ErrorCategory::Calculation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCategory::Session => StatusCode::BAD_REQUEST,
                ErrorCategory::Configuration | ErrorCategory::System => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            SplitError::SessionNotFound { .. } => "NOT_FOUND",
            SplitError::SessionConfirmed | SplitError::SessionNotConfirmed => "CONFLICT",
            SplitError::FormatError { .. } => "FORMAT_ERROR",
            _ => match self.category() {
                ErrorCategory::Intake => "INTAKE_ERROR",
                ErrorCategory::Parsing => "PARSER_ERROR",
                ErrorCategory::Calculation => "CALCULATION_ERROR",
                ErrorCategory::Session => "BAD_REQUEST",
                ErrorCategory::Configuration | ErrorCategory::System => "INTERNAL_ERROR",
            },
        }
    }
}

impl IntoResponse for SplitError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "suggestion": self.recovery_suggestion(),
                "item": self.item_index(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, SplitError>;
