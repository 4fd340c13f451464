// Kiro gateway orchestration
// Translates the request, executes the authenticated call with one
// refresh-and-retry, decodes the event stream, and assembles the response.
// Streaming replays the assembled response as synthetic SSE frames.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::KiroConfig;
use crate::error::GatewayError;
use crate::proxy::mappers::claude::models::{ChatRequest, ClaudeResponse};
use crate::proxy::token_manager::TokenManager;
use crate::proxy::upstream::assembler::assemble_response;
use crate::proxy::upstream::event_stream::decode_event_stream;
use crate::proxy::upstream::payload::build_kiro_payload;
use crate::proxy::upstream::stream_events::build_stream_events;

/// Upper bound on the whole gateway exchange.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(120);

/// Single entry point for the HTTP layer. Owns the outbound client and the
/// token manager; holds no per-request state.
pub struct KiroGateway {
    config: Arc<KiroConfig>,
    client: reqwest::Client,
    token_manager: Arc<TokenManager>,
}

impl KiroGateway {
    pub fn new(
        config: Arc<KiroConfig>,
        client: reqwest::Client,
        token_manager: Arc<TokenManager>,
    ) -> Self {
        Self {
            config,
            client,
            token_manager,
        }
    }

    /// Execute one completion and assemble the Anthropic response.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ClaudeResponse, GatewayError> {
        let events = self.call_kiro_events(request).await?;
        Ok(assemble_response(&events, request))
    }

    /// Same computation, replayed as an ordered SSE frame sequence.
    pub async fn stream(&self, request: &ChatRequest) -> Result<Vec<String>, GatewayError> {
        let response = self.complete(request).await?;
        Ok(build_stream_events(&response))
    }

    /// POST the translated payload and decode the binary event stream.
    /// On any failure the token is refreshed (throttled) and the identical
    /// request is retried exactly once; the second failure propagates.
    async fn call_kiro_events(&self, request: &ChatRequest) -> Result<Vec<Value>, GatewayError> {
        let payload = build_kiro_payload(request, &self.config);

        let mut token = self.token_manager.ensure_token().await;
        let mut last_error: Option<GatewayError> = None;

        for attempt in 0..2 {
            if attempt > 0 {
                warn!("Kiro call failed, refreshing token and retrying once");
                token = self.token_manager.refresh_if_needed().await;
            }

            match self.send_once(&payload, &token).await {
                Ok(bytes) => {
                    let events = decode_event_stream(&bytes);
                    debug!(
                        bytes = bytes.len(),
                        events = events.len(),
                        "Decoded Kiro event stream"
                    );
                    return Ok(events);
                }
                Err(err) => {
                    error!(attempt, "Kiro gateway call failed: {}", err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::UpstreamUnreachable(
            "no attempt executed".to_string(),
        )))
    }

    async fn send_once(&self, payload: &Value, token: &str) -> Result<Bytes, GatewayError> {
        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .json(payload)
            .timeout(GATEWAY_TIMEOUT)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => GatewayError::UpstreamAuthFailure {
                    status: status.as_u16(),
                    body,
                },
                _ => GatewayError::UpstreamProtocolError {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        response.bytes().await.map_err(GatewayError::from_reqwest)
    }
}
