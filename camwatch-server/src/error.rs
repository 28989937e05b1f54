//! HTTP 层错误

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 管理器已关闭 (正在退出)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<camwatch::Error> for ApiError {
    fn from(err: camwatch::Error) -> Self {
        use camwatch::Error;

        let message = err.to_string();
        match err {
            Error::NotFound(_) | Error::Removed(_) | Error::NotRunning(_) => Self::NotFound(message),
            Error::Conflict { .. } => Self::Conflict(message),
            Error::ManagerClosed => Self::Unavailable(message),
            _ => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
            ),
            Self::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(error_code, %message, "request failed");

        let body = Json(json!({
            "error_code": error_code,
            "message": message,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_core::source::CameraIdentity;

    #[test]
    fn maps_manager_errors_to_status_codes() {
        let id = CameraIdentity::from("0");
        let cases = [
            (camwatch::Error::NotFound(id.clone()), StatusCode::NOT_FOUND),
            (camwatch::Error::Removed(id.clone()), StatusCode::NOT_FOUND),
            (
                camwatch::Error::Conflict {
                    id: id.clone(),
                    reason: "busy".into(),
                },
                StatusCode::CONFLICT,
            ),
            (camwatch::Error::ManagerClosed, StatusCode::SERVICE_UNAVAILABLE),
            (
                camwatch::Error::Codec("bad frame".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
