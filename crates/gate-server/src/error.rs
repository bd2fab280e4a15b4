use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gate_core::error::GateError;

// ---------------------------------------------------------------------------
// Internal sentinels for statuses GateError does not carry
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP status through the `anyhow::Error` chain without
/// touching the `GateError` enum.
#[derive(Debug)]
struct StatusError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StatusError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(
            StatusError {
                status,
                message: msg.into(),
            }
            .into(),
        )
    }

    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    /// Construct a 401 Unauthorized error.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, msg)
    }

    /// Construct a 404 Not Found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(s) = self.0.downcast_ref::<StatusError>() {
            let body = serde_json::json!({ "error": s.message.clone() });
            return (s.status, axum::Json(body)).into_response();
        }

        let status = if let Some(e) = self.0.downcast_ref::<GateError>() {
            match e {
                GateError::Validation(_) => StatusCode::BAD_REQUEST,
                GateError::DuplicateAction(_) => StatusCode::CONFLICT,
                GateError::PolicyNotFound(_) => StatusCode::NOT_FOUND,
                GateError::Storage(_)
                | GateError::InvalidTransition { .. }
                | GateError::EmptyPanel
                | GateError::Config(_)
                | GateError::Io(_)
                | GateError::Yaml(_)
                | GateError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!("request failed: {:#}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_core::error::ValidationError;

    #[test]
    fn validation_error_maps_to_400() {
        let err = AppError(GateError::Validation(ValidationError::EmptyActionId).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_maps_to_409() {
        let err = AppError(GateError::DuplicateAction("a-1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_maps_to_500() {
        let err = AppError(GateError::Storage("disk full".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn policy_not_found_maps_to_404() {
        let err = AppError(GateError::PolicyNotFound("SCAN_SITE".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_sentinel_maps_to_401() {
        let err = AppError::unauthorized("bad signature");
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unknown_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("boom"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
