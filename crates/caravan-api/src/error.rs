use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl From<caravan_core::Error> for AppError {
    fn from(error: caravan_core::Error) -> Self {
        match error {
            caravan_core::Error::NotFound(message) => Self::NotFound(message),
            caravan_core::Error::InvalidInput(message) => Self::BadRequest(message),
            caravan_core::Error::Integrity(message) => Self::Conflict(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_matching_statuses() {
        let not_found: AppError = caravan_core::Error::NotFound("client x".to_string()).into();
        assert!(matches!(not_found, AppError::NotFound(_)));

        let conflict: AppError =
            caravan_core::Error::Integrity("duplicate booking".to_string()).into();
        assert!(matches!(conflict, AppError::Conflict(_)));

        let bad_request: AppError =
            caravan_core::Error::InvalidInput("empty name".to_string()).into();
        assert!(matches!(bad_request, AppError::BadRequest(_)));

        let internal: AppError = caravan_core::Error::Database("locked".to_string()).into();
        assert!(matches!(internal, AppError::Internal(_)));
    }

    #[test]
    fn responses_carry_json_error_bodies() {
        let response = AppError::Conflict("duplicate booking".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
