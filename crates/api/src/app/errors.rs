//! Uniform error envelope: `{"success": false, "messages": [...]}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use assurance_core::DomainError;

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "messages": [message.into()],
        })),
    )
        .into_response()
}

/// Error returned by handlers; every [`DomainError`] converts into it.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.code(), "request failed with an internal error");
        }
        json_error(status, self.0.message())
    }
}

pub type ApiResult<T = Response> = Result<T, ApiError>;

pub fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(DomainError::bad_request(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_status() {
        let cases = [
            (DomainError::not_found("answer not found"), StatusCode::NOT_FOUND),
            (DomainError::forbidden("no"), StatusCode::FORBIDDEN),
            (DomainError::conflict("already started"), StatusCode::CONFLICT),
            (DomainError::bad_request("bad"), StatusCode::BAD_REQUEST),
            (DomainError::internal(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
