// Unified Anthropic-compatible error response formatting
// All error responses follow: {"type": "error", "error": {"type": "<type>", "message": "<msg>"}}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::GatewayError;

/// Anthropic API compatible error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnthropicErrorType {
    InvalidRequestError,
    AuthenticationError,
    RateLimitError,
    ApiError,
    OverloadedError,
}

impl AnthropicErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequestError => "invalid_request_error",
            Self::AuthenticationError => "authentication_error",
            Self::RateLimitError => "rate_limit_error",
            Self::ApiError => "api_error",
            Self::OverloadedError => "overloaded_error",
        }
    }
}

/// Build an Anthropic-format error response with the given HTTP status, error type, and message.
pub fn error_response(
    status: StatusCode,
    error_type: AnthropicErrorType,
    message: &str,
) -> Response {
    let body = json!({
        "type": "error",
        "error": {
            "type": error_type.as_str(),
            "message": message
        }
    });
    (status, Json(body)).into_response()
}

/// Map a propagated gateway error to its user-visible HTTP shape.
pub fn gateway_error_response(err: &GatewayError) -> Response {
    match err {
        GatewayError::UpstreamTimeout => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            AnthropicErrorType::ApiError,
            &err.to_string(),
        ),
        GatewayError::UpstreamAuthFailure { .. } => error_response(
            StatusCode::UNAUTHORIZED,
            AnthropicErrorType::AuthenticationError,
            &err.to_string(),
        ),
        GatewayError::UpstreamProtocolError { status, .. } if *status == 429 => error_response(
            StatusCode::TOO_MANY_REQUESTS,
            AnthropicErrorType::RateLimitError,
            &err.to_string(),
        ),
        GatewayError::UpstreamProtocolError { .. } | GatewayError::UpstreamUnreachable(_) => {
            error_response(
                StatusCode::BAD_GATEWAY,
                AnthropicErrorType::ApiError,
                &err.to_string(),
            )
        }
    }
}
