use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Stable error codes surfaced to callers (§6/§7). Internal detail never crosses this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidOrder,
    ValidationError,
    OrderExpired,
    InvalidSignature,
    InvalidNonce,
    Unauthorized,
    ServiceUnavailable,
    NotFound,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidOrder => "INVALID_ORDER",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::OrderExpired => "ORDER_EXPIRED",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::InvalidNonce => "INVALID_NONCE",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorCode::InvalidOrder
            | ErrorCode::ValidationError
            | ErrorCode::OrderExpired
            | ErrorCode::InvalidSignature
            | ErrorCode::InvalidNonce => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: &'static str,
}

/// The safe-error layer: maps an internal error category to a stable code and a generic
/// message. Internal detail is logged by the caller before constructing this, never echoed.
pub struct ApiError(pub ErrorCode);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0;
        let message = match code {
            ErrorCode::InvalidOrder => "the order failed structural validation",
            ErrorCode::ValidationError => "request validation failed",
            ErrorCode::OrderExpired => "the order has expired",
            ErrorCode::InvalidSignature => "signature verification failed",
            ErrorCode::InvalidNonce => "nonce is stale",
            ErrorCode::Unauthorized => "not authorized for this resource",
            ErrorCode::ServiceUnavailable => "service temporarily unavailable",
            ErrorCode::NotFound => "resource not found",
        };
        (code.status(), Json(ErrorBody { code: code.as_str(), message })).into_response()
    }
}
