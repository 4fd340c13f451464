// Gateway error kinds
// Parsing-level problems (malformed frames, malformed tool arguments) are
// absorbed where they occur and never surface here; these variants cover
// the failures that propagate to the HTTP layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway call exceeded its 120s bound; retryable by the caller.
    #[error("Kiro gateway request timed out")]
    UpstreamTimeout,

    /// 401/403 from the gateway after the refresh-and-retry attempt.
    #[error("Kiro gateway rejected credentials ({status}): {body}")]
    UpstreamAuthFailure { status: u16, body: String },

    /// Any other non-2xx from the gateway.
    #[error("Kiro gateway returned {status}: {body}")]
    UpstreamProtocolError { status: u16, body: String },

    /// The request never produced an HTTP response (connect/transport).
    #[error("Kiro gateway unreachable: {0}")]
    UpstreamUnreachable(String),
}

impl GatewayError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout
        } else {
            GatewayError::UpstreamUnreachable(err.to_string())
        }
    }
}
