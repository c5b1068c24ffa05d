use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use cloak_engine::CloakError;
use cloak_types::api::ErrorBody;

/// Engine errors rendered as `{error, message, retryable}` JSON.
#[derive(Debug)]
pub struct ApiError(pub CloakError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            CloakError::Validation(_) => StatusCode::BAD_REQUEST,
            CloakError::Unauthenticated | CloakError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            CloakError::Forbidden | CloakError::AccountSuspended => StatusCode::FORBIDDEN,
            CloakError::NotFound(_) => StatusCode::NOT_FOUND,
            CloakError::DuplicateReport
            | CloakError::AlreadyMember
            | CloakError::HandleTaken
            | CloakError::AppealAlreadyReviewed => StatusCode::CONFLICT,
            CloakError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<CloakError> for ApiError {
    fn from(err: CloakError) -> Self {
        Self(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run a synchronous engine call on the blocking pool.
pub async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> cloak_engine::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
