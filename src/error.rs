use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// RegistryError
///
/// Configuration errors raised while building the permission registry. These are
/// boot-time failures: `main` refuses to start when any of them occurs, and the
/// evaluation path never produces one.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("path already registered: {0}")]
    DuplicatePath(String),

    #[error("no roles given for path: {0}")]
    EmptyRoleSet(String),

    #[error("the fallback role may not be granted any path: {0}")]
    FallbackRoleAdmitted(String),

    #[error("path must be non-empty and start with '/': {0:?}")]
    InvalidPath(String),

    #[error("failed to read registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse registry file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// ProviderError
///
/// Failures reported by the identity and profile collaborators. The session layer
/// recovers from both locally and never surfaces them to a guard.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("identity provider error: {0}")]
    Identity(String),

    #[error("profile provider error: {0}")]
    Profile(String),

    #[error("provider timed out after {0} ms")]
    Timeout(u64),
}

/// ApiError
///
/// Errors returned by the HTTP surface. Authorization denials on `/authz/check` are not
/// errors; they are a 200 response carrying `allowed: false`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Registry(RegistryError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Registry(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
