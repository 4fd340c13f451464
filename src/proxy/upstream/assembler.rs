// Decoded events -> one Anthropic response
// Folds the gateway's event sequence into accumulated text and tool
// invocations, then derives stop reason, content blocks, and usage.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::proxy::mappers::claude::models::{ChatRequest, ClaudeResponse, ContentBlock, Usage};
use crate::proxy::tokenizer::{estimate_request_tokens, estimate_tokens};
use crate::proxy::upstream::parsers::{
    deduplicate_tool_calls, generate_tool_id, parse_bracket_tool_calls, ToolInvocation,
};

pub const STOP_END_TURN: &str = "end_turn";
pub const STOP_TOOL_USE: &str = "tool_use";
pub const STOP_SEQUENCE: &str = "stop_sequence";
pub const STOP_MAX_TOKENS: &str = "max_tokens";

/// Margin absorbing the char/4 estimator's error when deciding whether the
/// output ran into the declared max_tokens budget.
const MAX_TOKENS_MARGIN: u32 = 10;

/// Incremental tool call assembled from streamed name/input/stop fields.
struct ToolCallBuilder {
    id: String,
    name: String,
    input: String,
}

impl ToolCallBuilder {
    fn build(self) -> ToolInvocation {
        ToolInvocation {
            id: self.id,
            name: self.name,
            arguments: self.input,
        }
    }
}

/// Fold a decoded event sequence plus the originating request into one
/// assembled response. Never fails: malformed pieces degrade locally.
pub fn assemble_response(events: &[Value], request: &ChatRequest) -> ClaudeResponse {
    let mut text = String::new();
    let mut tool_calls: Vec<ToolInvocation> = Vec::new();
    let mut builders: Vec<ToolCallBuilder> = Vec::new();

    for event in events {
        if let Some(content) = event.get("content").and_then(Value::as_str) {
            text.push_str(content);
        }

        // Streaming tool events carry name + toolUseId, input chunks, and a
        // final stop marker.
        if let (Some(name), Some(tool_use_id)) = (
            event.get("name").and_then(Value::as_str),
            event.get("toolUseId").and_then(Value::as_str),
        ) {
            let index = match builders.iter().position(|b| b.id == tool_use_id) {
                Some(index) => index,
                None => {
                    builders.push(ToolCallBuilder {
                        id: tool_use_id.to_string(),
                        name: name.to_string(),
                        input: String::new(),
                    });
                    builders.len() - 1
                }
            };

            if let Some(input) = event.get("input").and_then(Value::as_str) {
                builders[index].input.push_str(input);
            }

            if event.get("stop").and_then(Value::as_bool).unwrap_or(false) {
                let builder = builders.remove(index);
                debug!(name = %builder.name, "Completed streamed tool call");
                tool_calls.push(builder.build());
            }
        }

        // Legacy shape: a complete toolCalls array in one event.
        if let Some(calls) = event.get("toolCalls").and_then(Value::as_array) {
            for call in calls {
                let name = call
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str);
                if let Some(name) = name {
                    let arguments = call
                        .get("function")
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str)
                        .unwrap_or("{}")
                        .to_string();
                    let id = call
                        .get("id")
                        .and_then(Value::as_str)
                        .map(|s| s.to_string())
                        .unwrap_or_else(generate_tool_id);
                    tool_calls.push(ToolInvocation {
                        id,
                        name: name.to_string(),
                        arguments,
                    });
                }
            }
        }

        // Fallback: bracket markers embedded in raw text.
        if let Some(raw_text) = event.get("rawText").and_then(Value::as_str) {
            let bracket_calls = parse_bracket_tool_calls(raw_text);
            if !bracket_calls.is_empty() {
                debug!(count = bracket_calls.len(), "Parsed bracket tool calls from rawText");
            }
            tool_calls.extend(bracket_calls);
        }
    }

    // Streams that end without a stop marker still surface their tool call.
    for builder in builders.drain(..) {
        tool_calls.push(builder.build());
    }

    let unique_calls = deduplicate_tool_calls(tool_calls);

    let (stop_reason, stop_sequence) = determine_stop_reason(&unique_calls, &text, request);

    let mut content = Vec::new();
    if unique_calls.is_empty() {
        let mut final_text = text.clone();
        if request.thinking.is_some() {
            // Kiro has no extended-thinking mode; say so instead of
            // silently answering in standard mode.
            final_text = format!(
                "[Note: Extended thinking mode is not supported by Kiro Gateway. \
                 Response generated in standard mode.]\n\n{}",
                final_text
            );
        }
        content.push(ContentBlock::Text { text: final_text });
    } else {
        for call in &unique_calls {
            content.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: parse_arguments(&call.arguments),
            });
        }
    }

    ClaudeResponse {
        id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
        type_: "message".to_string(),
        role: "assistant".to_string(),
        model: request.model.clone(),
        created_at: Some(chrono::Utc::now().timestamp()),
        content,
        stop_reason: stop_reason.to_string(),
        stop_sequence,
        usage: Usage {
            input_tokens: estimate_request_tokens(request),
            output_tokens: estimate_tokens(&text),
        },
    }
}

/// Stop-reason precedence, first match wins:
/// tool_use, stop_sequence (leftmost match in the text, untruncated),
/// max_tokens (estimate within the margin of the budget), end_turn.
fn determine_stop_reason(
    tool_calls: &[ToolInvocation],
    text: &str,
    request: &ChatRequest,
) -> (&'static str, Option<String>) {
    if !tool_calls.is_empty() {
        return (STOP_TOOL_USE, None);
    }

    if let Some(sequences) = &request.stop_sequences {
        let mut leftmost: Option<(usize, &String)> = None;
        for sequence in sequences {
            if sequence.is_empty() {
                continue;
            }
            if let Some(position) = text.find(sequence.as_str()) {
                match leftmost {
                    Some((best, _)) if best <= position => {}
                    _ => leftmost = Some((position, sequence)),
                }
            }
        }
        if let Some((_, sequence)) = leftmost {
            return (STOP_SEQUENCE, Some(sequence.clone()));
        }
    }

    if let Some(max_tokens) = request.max_tokens {
        if estimate_tokens(text) >= max_tokens.saturating_sub(MAX_TOKENS_MARGIN) {
            return (STOP_MAX_TOKENS, None);
        }
    }

    (STOP_END_TURN, None)
}

/// Malformed argument JSON degrades to an empty object; the request as a
/// whole never fails on bad tool arguments.
fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!("Tool arguments parsed to non-object JSON, substituting empty object: {}", other);
            json!({})
        }
        Err(err) => {
            warn!("Failed to parse tool arguments, substituting empty object: {}", err);
            json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mappers::claude::models::{Message, MessageContent};

    fn request(max_tokens: u32) -> ChatRequest {
        ChatRequest {
            model: "claude-sonnet-4-5-20250929".into(),
            messages: vec![Message {
                role: "user".into(),
                content: MessageContent::String("hello there".into()),
            }],
            system: None,
            max_tokens: Some(max_tokens),
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

    #[test]
    fn test_text_events_concatenate() {
        let events = vec![
            json!({"content": "Hello"}),
            json!({"content": ", "}),
            json!({"content": "world"}),
        ];
        let response = assemble_response(&events, &request(1024));

        assert_eq!(response.type_, "message");
        assert_eq!(response.role, "assistant");
        assert!(response.id.starts_with("msg_"));
        assert_eq!(response.content.len(), 1);
        match &response.content[0] {
            ContentBlock::Text { text } => assert_eq!(text, "Hello, world"),
            other => panic!("unexpected block: {:?}", other),
        }
        assert_eq!(response.stop_reason, STOP_END_TURN);
    }

    #[test]
    fn test_empty_event_stream_still_yields_text_block() {
        let response = assemble_response(&[], &request(1024));
        assert_eq!(response.content.len(), 1);
        assert_eq!(response.usage.output_tokens, 1);
    }

    #[test]
    fn test_streamed_tool_call_assembly() {
        let events = vec![
            json!({"name": "get_weather", "toolUseId": "tooluse_1"}),
            json!({"name": "get_weather", "toolUseId": "tooluse_1", "input": "{\"loca"}),
            json!({"name": "get_weather", "toolUseId": "tooluse_1", "input": "tion\":\"NYC\"}"}),
            json!({"name": "get_weather", "toolUseId": "tooluse_1", "stop": true}),
        ];
        let response = assemble_response(&events, &request(1024));

        assert_eq!(response.stop_reason, STOP_TOOL_USE);
        assert_eq!(response.content.len(), 1);
        match &response.content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "tooluse_1");
                assert_eq!(name, "get_weather");
                assert_eq!(input["location"], "NYC");
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_tool_call_still_surfaces() {
        let events = vec![
            json!({"name": "lookup", "toolUseId": "tooluse_2", "input": "{\"q\":\"x\"}"}),
        ];
        let response = assemble_response(&events, &request(1024));
        assert_eq!(response.stop_reason, STOP_TOOL_USE);
        assert_eq!(response.content.len(), 1);
    }

    #[test]
    fn test_legacy_tool_calls_array() {
        let events = vec![json!({
            "toolCalls": [
                {"id": "call_1", "function": {"name": "f", "arguments": "{\"a\":1}"}}
            ]
        })];
        let response = assemble_response(&events, &request(1024));
        assert_eq!(response.stop_reason, STOP_TOOL_USE);
        match &response.content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "f");
                assert_eq!(input["a"], 1);
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_raw_text_bracket_fallback() {
        let events = vec![json!({
            "rawText": "[Called get_weather with args: {\"location\":\"NYC\"}]"
        })];
        let response = assemble_response(&events, &request(1024));
        assert_eq!(response.stop_reason, STOP_TOOL_USE);
        match &response.content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert!(id.starts_with("toolu_"));
                assert_eq!(name, "get_weather");
                assert_eq!(input["location"], "NYC");
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_invocations_collapse() {
        let events = vec![
            json!({"rawText": "[Called f with args: {\"a\":1}]"}),
            json!({"rawText": "[Called f with args: {\"a\":1}]"}),
            json!({"rawText": "[Called g with args: {\"b\":2}]"}),
        ];
        let response = assemble_response(&events, &request(1024));
        assert_eq!(response.content.len(), 2);
    }

    #[test]
    fn test_malformed_streamed_arguments_degrade_to_empty_object() {
        let events = vec![
            json!({"name": "broken", "toolUseId": "tooluse_3", "input": "{oops"}),
            json!({"name": "broken", "toolUseId": "tooluse_3", "stop": true}),
        ];
        let response = assemble_response(&events, &request(1024));
        match &response.content[0] {
            ContentBlock::ToolUse { input, .. } => assert_eq!(input, &json!({})),
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_tool_use_outranks_stop_sequence() {
        let mut req = request(1024);
        req.stop_sequences = Some(vec!["STOP".into()]);
        let events = vec![
            json!({"content": "text with STOP inside"}),
            json!({"rawText": "[Called f with args: {}]"}),
        ];
        let response = assemble_response(&events, &req);
        assert_eq!(response.stop_reason, STOP_TOOL_USE);
        assert!(response.stop_sequence.is_none());
    }

    #[test]
    fn test_stop_sequence_detected_with_literal() {
        let mut req = request(1024);
        req.stop_sequences = Some(vec!["STOP".into()]);
        let events = vec![json!({"content": "before STOP after"})];
        let response = assemble_response(&events, &req);

        assert_eq!(response.stop_reason, STOP_SEQUENCE);
        assert_eq!(response.stop_sequence.as_deref(), Some("STOP"));
        // Text is kept untruncated.
        match &response.content[0] {
            ContentBlock::Text { text } => assert_eq!(text, "before STOP after"),
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_leftmost_stop_sequence_wins() {
        let mut req = request(1024);
        req.stop_sequences = Some(vec!["LATER".into(), "EARLY".into()]);
        let events = vec![json!({"content": "x EARLY y LATER z"})];
        let response = assemble_response(&events, &req);
        assert_eq!(response.stop_sequence.as_deref(), Some("EARLY"));
    }

    #[test]
    fn test_max_tokens_stop_reason() {
        // max_tokens=10: any output estimate reaches the margin-adjusted
        // budget, so the response reports max_tokens.
        let events = vec![json!({"content": "a".repeat(400)})];
        let response = assemble_response(&events, &request(10));
        assert_eq!(response.stop_reason, STOP_MAX_TOKENS);
    }

    #[test]
    fn test_end_turn_when_budget_is_comfortable() {
        let events = vec![json!({"content": "short answer"})];
        let response = assemble_response(&events, &request(4096));
        assert_eq!(response.stop_reason, STOP_END_TURN);
    }

    #[test]
    fn test_usage_estimates() {
        let events = vec![json!({"content": "a".repeat(80)})];
        let response = assemble_response(&events, &request(1024));
        // "hello there" = 11 chars -> 2 tokens; output 80 chars -> 20.
        assert_eq!(response.usage.input_tokens, 2);
        assert_eq!(response.usage.output_tokens, 20);
    }

    #[test]
    fn test_thinking_request_gets_warning_note() {
        let mut req = request(1024);
        req.thinking = Some(json!({"type": "enabled", "budget_tokens": 1000}));
        let events = vec![json!({"content": "answer"})];
        let response = assemble_response(&events, &req);
        match &response.content[0] {
            ContentBlock::Text { text } => {
                assert!(text.starts_with("[Note: Extended thinking mode"));
                assert!(text.ends_with("answer"));
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }
}
