use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pulsefs_core::StoreError;

use crate::replication::SubmitError;

pub type ApiResult<T> = Result<T, ApiError>;

/// A client-facing error: a status code plus the exact reason string the
/// protocol promises. The reason travels as the plain-text body (hyper does
/// not allow custom reason phrases on the status line).
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub reason: String,
}

impl ApiError {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, reason)
    }

    pub fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "service unavailable")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.reason).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::VersionConflict { .. } => StatusCode::CONFLICT,
            StoreError::Forbidden => StatusCode::FORBIDDEN,
            // already-exists answers 400 on the wire, not 409
            StoreError::AlreadyExists(_)
            | StoreError::NotADirectory(_)
            | StoreError::IsADirectory(_)
            | StoreError::NotEmpty(_)
            | StoreError::BadQuery => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Store(err) => err.into(),
            SubmitError::Unavailable => Self::unavailable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ApiError::from(StoreError::AlreadyExists("/d".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.reason, "/d already exists");

        let err = ApiError::from(StoreError::VersionConflict {
            expected: 0,
            actual: 1,
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.reason, "Version 0 doesn't match node version 1");

        let err = ApiError::from(StoreError::Forbidden);
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.reason, "Forbidden");

        let err = ApiError::from(SubmitError::Unavailable);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
