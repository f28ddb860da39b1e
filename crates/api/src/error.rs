//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use consolidation::EngineError;
use projections::ProjectionError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
///
/// Every response body has the shape
/// `{"error": {"code": "<CODE>", "message": "..."}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Malformed path or query parameter.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A read model could not catch up with the store.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Engine(err) => err.code(),
            ApiError::BadRequest(_) => "INVALID_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Projection(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "TABLE_UNAVAILABLE" | "CONFLICT" => StatusCode::CONFLICT,
            "INVALID_REQUEST" => StatusCode::BAD_REQUEST,
            "FEATURE_RESTRICTED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        } else {
            tracing::debug!(code, error = %message, "request rejected");
        }

        let body = serde_json::json!({ "error": { "code": code, "message": message } });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consolidation::Feature;

    #[test]
    fn statuses_follow_codes() {
        let restricted = ApiError::from(EngineError::FeatureRestricted {
            feature: Feature::TableGrouping,
            restaurant_id: 7,
        });
        assert_eq!(restricted.status(), StatusCode::FORBIDDEN);

        let busy = ApiError::from(EngineError::TableUnavailable("table #5 is RESERVED".into()));
        assert_eq!(busy.status(), StatusCode::CONFLICT);

        let conflict = ApiError::from(EngineError::Conflict {
            operation: "submit_items",
            retries: 3,
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let broken = ApiError::from(EngineError::ConsistencyViolation("free with total".into()));
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::BadRequest("bad id".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }
}
