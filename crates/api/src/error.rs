//! API error type with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{AppError, ErrorCode, Layer, TransportStatus};
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

/// Wraps an [`AppError`] so it can be returned from handlers.
///
/// The response body is `{"error": {"code", "message"}}`; the wrapped source
/// is only logged.
#[derive(Debug)]
pub struct ApiError(pub AppError);

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: ErrorCode,
    message: &'a str,
}

/// Maps a transport category onto an HTTP status.
pub fn http_status(status: TransportStatus) -> StatusCode {
    match status {
        TransportStatus::NotFound => StatusCode::NOT_FOUND,
        TransportStatus::Conflict => StatusCode::CONFLICT,
        TransportStatus::BadRequest => StatusCode::BAD_REQUEST,
        TransportStatus::Unauthorized => StatusCode::UNAUTHORIZED,
        TransportStatus::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = http_status(err.status());

        if status.is_server_error() {
            let source = std::error::Error::source(&err).map(ToString::to_string);
            tracing::error!(
                code = %err.code(),
                layer = %err.layer(),
                source = source.as_deref().unwrap_or("none"),
                error = %err.message(),
                "internal server error"
            );
        } else {
            tracing::debug!(code = %err.code(), error = %err.message(), "request rejected");
        }
        metrics::counter!("rpc_errors_total", "code" => err.code().as_str()).increment(1);

        let body = ErrorBody {
            error: ErrorDetail {
                code: err.code(),
                message: err.message(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AppError::new(
            ErrorCode::ValidationInvalidInput,
            rejection.body_text(),
            Layer::Api,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ErrorCode::OrderNotFound, StatusCode::NOT_FOUND),
            (ErrorCode::ProductInsufficientInventory, StatusCode::CONFLICT),
            (ErrorCode::CustomerEmailExists, StatusCode::CONFLICT),
            (ErrorCode::ProductInvalidPrice, StatusCode::BAD_REQUEST),
            (ErrorCode::ValidationRequiredField, StatusCode::BAD_REQUEST),
            (ErrorCode::AuthForbidden, StatusCode::UNAUTHORIZED),
            (ErrorCode::DatabaseQueryError, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, expected) in cases {
            assert_eq!(http_status(code.status()), expected, "{code}");
        }
    }

    #[test]
    fn test_response_status() {
        let response =
            ApiError::from(AppError::service(ErrorCode::OrderCannotModify, "cancelled"))
                .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
