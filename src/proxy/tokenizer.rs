// Character-based token estimation
// A char/4 heuristic, not a tokenizer. Callers treating these numbers as
// exact will be disappointed; they exist for usage reporting and the
// max_tokens stop heuristic only.

use crate::proxy::mappers::claude::models::{ChatRequest, ContentBlock};

/// Context window ceiling applied to incoming requests (API mode).
pub const MAX_CONTEXT_TOKENS: u64 = 1_000_000;

/// JSON structure overhead applied when validating the context window.
const JSON_OVERHEAD_FACTOR: f64 = 1.15;

/// Estimate tokens for a text: characters / 4, minimum 1.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.len() / 4) as u32).max(1)
}

/// Estimate input tokens for a request by summing its text blocks.
pub fn estimate_request_tokens(request: &ChatRequest) -> u32 {
    let mut total = 0u32;
    for message in &request.messages {
        for block in message.content.blocks() {
            if let ContentBlock::Text { text } = block {
                total += estimate_tokens(&text);
            }
        }
    }
    total
}

/// Rough character volume of the whole request, for context-window checks.
fn request_chars(request: &ChatRequest) -> u64 {
    let mut chars = 0u64;

    if let Some(system) = &request.system {
        for block in system.blocks() {
            chars += block.text.len() as u64;
        }
    }

    for message in &request.messages {
        chars += message.role.len() as u64;
        for block in message.content.blocks() {
            chars += match block {
                ContentBlock::Text { text } => text.len() as u64,
                ContentBlock::ToolUse { name, input, .. } => {
                    (name.len() + input.to_string().len()) as u64
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => (tool_use_id.len() + content.to_string().len()) as u64,
                ContentBlock::Image { source } => {
                    source.data.as_ref().map(|d| d.len()).unwrap_or(0) as u64
                }
            };
        }
    }

    if let Some(tools) = &request.tools {
        for tool in tools {
            chars += tool.effective_name().map(|n| n.len()).unwrap_or(0) as u64;
            chars += tool.effective_description().map(|d| d.len()).unwrap_or(0) as u64;
            chars += tool
                .effective_input_schema()
                .map(|s| s.to_string().len())
                .unwrap_or(0) as u64;
        }
    }

    chars
}

/// Estimate total context usage: request characters with JSON overhead,
/// plus the declared output budget.
pub fn estimate_context_tokens(request: &ChatRequest) -> u64 {
    let chars = request_chars(request) as f64;
    let mut tokens = (chars * JSON_OVERHEAD_FACTOR / 4.0).ceil() as u64;
    if let Some(max_tokens) = request.max_tokens {
        tokens += max_tokens as u64;
    }
    tokens
}

/// Reject requests whose estimated context usage exceeds `limit`.
pub fn validate_context_window(request: &ChatRequest, limit: u64) -> Result<(), String> {
    let estimated = estimate_context_tokens(request);
    if estimated > limit {
        return Err(format!(
            "Request exceeds maximum context window: estimated {} tokens > limit {} tokens. \
             Consider reducing message history, system prompts, or max_tokens parameter.",
            estimated, limit
        ));
    }
    Ok(())
}
