use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Upstream provider error")]
    UpstreamError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg)
            | AppError::NoDocuments(msg)
            | AppError::NoExtractableText(msg) => Self::ValidationError(msg),
            AppError::EmbeddingProvider(_) | AppError::CompletionProvider(_) => {
                tracing::error!("Provider error: {:?}", err);
                Self::UpstreamError("Upstream provider error".to_string())
            }
            AppError::Storage(_)
            | AppError::Io(_)
            | AppError::Serde(_)
            | AppError::Decode(_)
            | AppError::Join(_)
            | AppError::InternalError(_) => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::InternalError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: message,
                    status: "error".to_string(),
                },
            ),
            Self::UpstreamError(message) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse {
                    error: message,
                    status: "error".to_string(),
                },
            ),
            Self::ValidationError(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: message,
                    status: "error".to_string(),
                },
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: message,
                    status: "error".to_string(),
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::error::AppError;
    use std::fmt::Debug;

    // Helper to check status code
    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn test_app_error_to_api_error_conversion() {
        let not_found = AppError::NotFound("session not found".to_string());
        let api_error = ApiError::from(not_found);
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "session not found"));

        let validation = AppError::Validation("user_id is required".to_string());
        let api_error = ApiError::from(validation);
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "user_id is required"));

        // Expected empty states are user-actionable 400s, not 500s.
        let no_docs = AppError::NoDocuments("upload first".to_string());
        let api_error = ApiError::from(no_docs);
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "upload first"));

        let no_text = AppError::NoExtractableText("nothing readable".to_string());
        let api_error = ApiError::from(no_text);
        assert!(matches!(api_error, ApiError::ValidationError(_)));

        let provider = AppError::CompletionProvider("socket reset".to_string());
        let api_error = ApiError::from(provider);
        assert!(matches!(api_error, ApiError::UpstreamError(_)));

        let internal = AppError::Io(std::io::Error::other("io error"));
        let api_error = ApiError::from(internal);
        assert!(matches!(api_error, ApiError::InternalError(_)));
    }

    #[test]
    fn test_api_error_response_status_codes() {
        let error = ApiError::InternalError("server error".to_string());
        assert_status_code(error, StatusCode::INTERNAL_SERVER_ERROR);

        let error = ApiError::UpstreamError("provider down".to_string());
        assert_status_code(error, StatusCode::BAD_GATEWAY);

        let error = ApiError::NotFound("not found".to_string());
        assert_status_code(error, StatusCode::NOT_FOUND);

        let error = ApiError::ValidationError("invalid input".to_string());
        assert_status_code(error, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let provider = AppError::EmbeddingProvider("api key sk-12345 rejected".to_string());
        let api_error = ApiError::from(provider);
        assert!(matches!(
            api_error,
            ApiError::UpstreamError(msg) if !msg.contains("sk-12345")
        ));

        let storage = AppError::Decode("corrupt blob at /var/data".to_string());
        let api_error = ApiError::from(storage);
        assert!(matches!(
            api_error,
            ApiError::InternalError(msg) if !msg.contains("/var/data")
        ));
    }
}
