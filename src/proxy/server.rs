// HTTP surface
// Anthropic-compatible routes, header/request validation, and dispatch into
// the Kiro gateway. Streaming responses replay the assembled answer as SSE
// and end with the [DONE] marker.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::proxy::common::errors::{error_response, gateway_error_response, AnthropicErrorType};
use crate::proxy::common::model_mapping::list_models;
use crate::proxy::handlers::kiro::KiroGateway;
use crate::proxy::mappers::claude::models::{ChatRequest, Tool, ToolChoice};
use crate::proxy::tokenizer::{validate_context_window, MAX_CONTEXT_TOKENS};

/// Streaming requests get max_tokens soft-capped instead of rejected, for
/// compatibility with clients that send large budgets.
const STREAMING_MAX_TOKENS_CAP: u32 = 64000;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<KiroGateway>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(create_message))
        .route("/v1/messages/stream", post(stream_message))
        .route("/v1/messages/count_tokens", post(count_tokens))
        .route("/v1/models", get(models))
        .route("/health", get(health))
        .with_state(state)
}

async fn create_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<ChatRequest>,
) -> Response {
    if let Err(response) = validate(&state, &headers, &mut request) {
        return response;
    }

    let version = resolve_version(&state, &headers);

    if request.stream {
        info!(model = %request.model, "Processing streaming request");
        stream_response(&state, &request, &version).await
    } else {
        info!(model = %request.model, "Processing non-streaming request");
        match state.gateway.complete(&request).await {
            Ok(response) => (
                [
                    (header::CONTENT_TYPE.as_str(), "application/json"),
                    ("anthropic-version", version.as_str()),
                ],
                Json(response),
            )
                .into_response(),
            Err(err) => gateway_error_response(&err),
        }
    }
}

/// Legacy endpoint: always streams, regardless of the request's flag.
async fn stream_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<ChatRequest>,
) -> Response {
    request.stream = true;
    if let Err(response) = validate(&state, &headers, &mut request) {
        return response;
    }
    let version = resolve_version(&state, &headers);
    stream_response(&state, &request, &version).await
}

async fn stream_response(state: &AppState, request: &ChatRequest, version: &str) -> Response {
    let frames = match state.gateway.stream(request).await {
        Ok(frames) => frames,
        Err(err) => return gateway_error_response(&err),
    };
    debug!(frames = frames.len(), "Built stream events");

    let sse_stream = async_stream::stream! {
        for frame in frames {
            yield Ok::<Bytes, std::io::Error>(Bytes::from(frame));
        }
        yield Ok::<Bytes, std::io::Error>(Bytes::from("data: [DONE]\n\n"));
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("anthropic-version", version)
        .body(Body::from_stream(sse_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Stub estimate for client compatibility; this service does not tokenize.
async fn count_tokens(headers: HeaderMap) -> Json<serde_json::Value> {
    use rand::Rng;
    let tokens: u32 = rand::rng().random_range(20..=500);
    let version = headers
        .get("anthropic-version")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unset");
    info!(version, tokens, "count_tokens request");
    Json(json!({ "type": "token_count", "input_tokens": tokens }))
}

async fn models() -> Json<serde_json::Value> {
    let created = chrono::Utc::now().timestamp();
    let data: Vec<serde_json::Value> = list_models()
        .into_iter()
        .map(|m| {
            json!({
                "id": m.id,
                "object": "model",
                "created": created,
                "owned_by": m.owned_by,
                "name": m.name,
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "kiro-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "kiroProfile": if state.config.kiro.profile_arn.is_empty() { "missing" } else { "configured" },
    }))
}

// ===== Validation =====

fn validate(
    state: &AppState,
    headers: &HeaderMap,
    request: &mut ChatRequest,
) -> Result<(), Response> {
    validate_headers(state, headers)?;
    validate_request(request).map_err(|message| {
        warn!("Request validation failed: {}", message);
        error_response(
            StatusCode::BAD_REQUEST,
            AnthropicErrorType::InvalidRequestError,
            &message,
        )
    })?;
    validate_context_window(request, MAX_CONTEXT_TOKENS).map_err(|message| {
        error_response(
            StatusCode::BAD_REQUEST,
            AnthropicErrorType::InvalidRequestError,
            &message,
        )
    })?;
    Ok(())
}

/// Accept the key from x-api-key or Authorization ("Bearer sk-..." or raw).
fn resolve_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if !key.trim().is_empty() {
            return Some(key.trim().to_string());
        }
    }
    let authorization = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = authorization.strip_prefix("Bearer ").unwrap_or(authorization);
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn validate_headers(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let api_key = resolve_api_key(headers);
    if api_key.as_deref() != Some(state.config.api_key.as_str()) {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            AnthropicErrorType::AuthenticationError,
            "invalid api key",
        ));
    }
    if headers
        .get("anthropic-version")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().is_empty())
        .unwrap_or(true)
    {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            AnthropicErrorType::InvalidRequestError,
            "anthropic-version header is required",
        ));
    }
    Ok(())
}

fn resolve_version(state: &AppState, headers: &HeaderMap) -> String {
    headers
        .get("anthropic-version")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| state.config.anthropic_version.clone())
}

fn validate_request(request: &mut ChatRequest) -> Result<(), String> {
    if request.model.trim().is_empty() {
        return Err("model is required".into());
    }
    match request.max_tokens {
        Some(max_tokens) if max_tokens > 0 => {}
        _ => return Err("max_tokens must be a positive integer".into()),
    }
    if request.messages.is_empty() {
        return Err("messages must contain at least one entry".into());
    }
    for message in &request.messages {
        if message.role.trim().is_empty() {
            return Err("message role is required".into());
        }
        if message.content.blocks().is_empty() {
            return Err("message content cannot be empty".into());
        }
    }

    if request.stream {
        if let Some(max_tokens) = request.max_tokens {
            if max_tokens > STREAMING_MAX_TOKENS_CAP {
                // Cap instead of rejecting so large-budget clients keep working.
                warn!(
                    max_tokens,
                    cap = STREAMING_MAX_TOKENS_CAP,
                    "max_tokens exceeds streaming limit; capping"
                );
                request.max_tokens = Some(STREAMING_MAX_TOKENS_CAP);
            }
        }
    }

    if let Some(choice) = &request.tool_choice {
        validate_tool_choice(choice, request.tools.as_deref())?;
    }

    Ok(())
}

fn validate_tool_choice(choice: &ToolChoice, tools: Option<&[Tool]>) -> Result<(), String> {
    let choice_type = choice
        .choice_type
        .as_deref()
        .ok_or("tool_choice.type is required when tool_choice is provided")?;

    match choice_type {
        "auto" | "any" => Ok(()),
        "none" => {
            if choice.name.is_some() {
                return Err("tool_choice.name should not be provided when type is 'none'".into());
            }
            Ok(())
        }
        "required" => {
            if tools.map(|t| t.is_empty()).unwrap_or(true) {
                return Err("tools must be provided when tool_choice.type is 'required'".into());
            }
            Ok(())
        }
        "tool" => {
            let name = choice
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or("tool_choice.name must be a non-empty string")?;

            if let Some(tools) = tools {
                if !tools.is_empty()
                    && !tools
                        .iter()
                        .any(|tool| tool.effective_name().as_deref() == Some(name))
                {
                    return Err(format!(
                        "tool_choice.name '{}' must be present in the tools list",
                        name
                    ));
                }
            }
            Ok(())
        }
        _ => Err("tool_choice.type must be one of: auto, any, tool, none, required".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mappers::claude::models::{Message, MessageContent};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "claude-sonnet-4-5-20250929".into(),
            messages: vec![Message {
                role: "user".into(),
                content: MessageContent::String("hello".into()),
            }],
            system: None,
            max_tokens: Some(1024),
            stream: false,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            metadata: None,
            thinking: None,
        }
    }

    fn tool(name: &str) -> Tool {
        Tool {
            name: Some(name.into()),
            description: None,
            input_schema: None,
            type_: None,
            function: None,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(validate_request(&mut request()).is_ok());
    }

    #[test]
    fn test_missing_model_rejected() {
        let mut req = request();
        req.model = "  ".into();
        assert_eq!(validate_request(&mut req).unwrap_err(), "model is required");
    }

    #[test]
    fn test_nonpositive_max_tokens_rejected() {
        let mut req = request();
        req.max_tokens = Some(0);
        assert!(validate_request(&mut req).is_err());
        req.max_tokens = None;
        assert!(validate_request(&mut req).is_err());
    }

    #[test]
    fn test_empty_messages_rejected() {
        let mut req = request();
        req.messages.clear();
        assert!(validate_request(&mut req).is_err());
    }

    #[test]
    fn test_blank_content_rejected() {
        let mut req = request();
        req.messages[0].content = MessageContent::String("   ".into());
        assert_eq!(
            validate_request(&mut req).unwrap_err(),
            "message content cannot be empty"
        );
    }

    #[test]
    fn test_streaming_max_tokens_capped() {
        let mut req = request();
        req.stream = true;
        req.max_tokens = Some(100_000);
        validate_request(&mut req).unwrap();
        assert_eq!(req.max_tokens, Some(STREAMING_MAX_TOKENS_CAP));
    }

    #[test]
    fn test_non_streaming_max_tokens_uncapped() {
        let mut req = request();
        req.max_tokens = Some(100_000);
        validate_request(&mut req).unwrap();
        assert_eq!(req.max_tokens, Some(100_000));
    }

    #[test]
    fn test_tool_choice_requires_type() {
        let choice = ToolChoice {
            choice_type: None,
            name: None,
        };
        assert!(validate_tool_choice(&choice, None).is_err());
    }

    #[test]
    fn test_tool_choice_none_rejects_name() {
        let choice = ToolChoice {
            choice_type: Some("none".into()),
            name: Some("x".into()),
        };
        assert!(validate_tool_choice(&choice, None).is_err());
    }

    #[test]
    fn test_tool_choice_required_needs_tools() {
        let choice = ToolChoice {
            choice_type: Some("required".into()),
            name: None,
        };
        assert!(validate_tool_choice(&choice, None).is_err());
        assert!(validate_tool_choice(&choice, Some(&[tool("t")])).is_ok());
    }

    #[test]
    fn test_tool_choice_specific_needs_listed_name() {
        let choice = ToolChoice {
            choice_type: Some("tool".into()),
            name: Some("get_weather".into()),
        };
        assert!(validate_tool_choice(&choice, Some(&[tool("other")])).is_err());
        assert!(validate_tool_choice(&choice, Some(&[tool("get_weather")])).is_ok());
    }

    #[test]
    fn test_tool_choice_unknown_type_rejected() {
        let choice = ToolChoice {
            choice_type: Some("sometimes".into()),
            name: None,
        };
        assert!(validate_tool_choice(&choice, None).is_err());
    }

    #[test]
    fn test_resolve_api_key_prefers_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "sk-key".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer other".parse().unwrap());
        assert_eq!(resolve_api_key(&headers).as_deref(), Some("sk-key"));
    }

    #[test]
    fn test_resolve_api_key_strips_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer sk-abc".parse().unwrap());
        assert_eq!(resolve_api_key(&headers).as_deref(), Some("sk-abc"));
    }

    #[test]
    fn test_resolve_api_key_accepts_raw_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "sk-raw".parse().unwrap());
        assert_eq!(resolve_api_key(&headers).as_deref(), Some("sk-raw"));
    }

    #[test]
    fn test_resolve_api_key_missing() {
        assert!(resolve_api_key(&HeaderMap::new()).is_none());
    }
}
