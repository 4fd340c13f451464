// Assembled response -> Anthropic SSE frame sequence
// The gateway's answer is always buffered and assembled first; streaming
// clients get the finished response replayed as a synthetic event stream.

use serde_json::{json, Value};

use crate::proxy::mappers::claude::models::{ClaudeResponse, ContentBlock};

/// partial_json chunk size for tool_use input deltas.
const INPUT_JSON_CHUNK_CHARS: usize = 50;

/// Serialize one SSE frame in the two-line `event:`/`data:` form.
pub fn format_sse(event: &str, data: &Value) -> String {
    format!(
        "event: {}\ndata: {}\n\n",
        event,
        serde_json::to_string(data).unwrap_or_default()
    )
}

/// Produce the full ordered frame sequence for a response:
/// message_start, per-block start/delta/stop, message_delta, message_stop.
/// tool_use start frames carry id and name only; the input travels
/// exclusively through input_json_delta chunks.
pub fn build_stream_events(response: &ClaudeResponse) -> Vec<String> {
    let mut events = Vec::new();

    events.push(format_sse(
        "message_start",
        &json!({
            "type": "message_start",
            "message": {
                "id": response.id,
                "type": "message",
                "role": response.role,
                "model": response.model,
                "content": [],
                "stop_reason": null,
                "stop_sequence": null,
                "usage": {
                    "input_tokens": response.usage.input_tokens,
                    "output_tokens": 0,
                },
                "created_at": response.created_at,
            }
        }),
    ));

    for (index, block) in response.content.iter().enumerate() {
        match block {
            ContentBlock::Text { text } => {
                events.push(format_sse(
                    "content_block_start",
                    &json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": { "type": "text", "text": "" },
                    }),
                ));
                events.push(format_sse(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": index,
                        "delta": { "type": "text_delta", "text": text },
                    }),
                ));
            }
            ContentBlock::ToolUse { id, name, input } => {
                events.push(format_sse(
                    "content_block_start",
                    &json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": { "type": "tool_use", "id": id, "name": name },
                    }),
                ));
                let input_json = serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string());
                for chunk in chunk_json_string(&input_json) {
                    events.push(format_sse(
                        "content_block_delta",
                        &json!({
                            "type": "content_block_delta",
                            "index": index,
                            "delta": { "type": "input_json_delta", "partial_json": chunk },
                        }),
                    ));
                }
            }
            // Assembled responses only carry text and tool_use blocks, but
            // the enum is wider; emit a bare start so indices stay aligned.
            other => {
                events.push(format_sse(
                    "content_block_start",
                    &json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": { "type": block_type_name(other) },
                    }),
                ));
            }
        }

        events.push(format_sse(
            "content_block_stop",
            &json!({ "type": "content_block_stop", "index": index }),
        ));
    }

    events.push(format_sse(
        "message_delta",
        &json!({
            "type": "message_delta",
            "delta": {
                "stop_reason": response.stop_reason,
                "stop_sequence": response.stop_sequence,
            },
            "usage": {
                "input_tokens": response.usage.input_tokens,
                "output_tokens": response.usage.output_tokens,
            },
        }),
    ));

    events.push(format_sse("message_stop", &json!({ "type": "message_stop" })));

    events
}

fn block_type_name(block: &ContentBlock) -> &'static str {
    match block {
        ContentBlock::Text { .. } => "text",
        ContentBlock::ToolUse { .. } => "tool_use",
        ContentBlock::ToolResult { .. } => "tool_result",
        ContentBlock::Image { .. } => "image",
    }
}

/// Split serialized input into fragments for input_json_delta. Splitting by
/// character keeps multi-byte sequences intact.
fn chunk_json_string(input: &str) -> Vec<String> {
    if input.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = input.chars().collect();
    chars
        .chunks(INPUT_JSON_CHUNK_CHARS)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
