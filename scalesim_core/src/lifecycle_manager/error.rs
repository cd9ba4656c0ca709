use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use runtime::shared::error::RuntimeError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Domain errors, translated to HTTP statuses at the response boundary.
/// Stack traces and store internals never reach the client.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotAuthorized(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    DriverUnavailable(String),

    #[error("{0}")]
    DriverFailure(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("{0}")]
    Internal(String),
}

impl From<RuntimeError> for CoreError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Unavailable(message) => CoreError::DriverUnavailable(message),
            RuntimeError::Engine(message) => CoreError::DriverFailure(message),
            RuntimeError::Store(message) | RuntimeError::Request(message) => {
                CoreError::Internal(message)
            }
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CoreError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::DriverUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::DriverFailure(_) => StatusCode::BAD_REQUEST,
            CoreError::Database(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let detail = match &self {
            CoreError::Database(_) | CoreError::Internal(_) => {
                error!("internal error: {self}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoreError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (CoreError::NotAuthorized("x".into()), StatusCode::FORBIDDEN),
            (CoreError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (CoreError::DriverUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::DriverFailure("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::Internal("secret".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_runtime_error_translation() {
        let unavailable: CoreError = RuntimeError::Unavailable("daemon down".into()).into();
        assert!(matches!(unavailable, CoreError::DriverUnavailable(_)));

        let failure: CoreError = RuntimeError::Engine("no such image".into()).into();
        assert!(matches!(failure, CoreError::DriverFailure(_)));

        let store: CoreError = RuntimeError::Store("broken".into()).into();
        assert!(matches!(store, CoreError::Internal(_)));
    }
}
