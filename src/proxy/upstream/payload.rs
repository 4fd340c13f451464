// Anthropic -> Kiro payload conversion
// Builds the generateAssistantResponse conversationState document: the last
// message becomes currentMessage, everything before it becomes alternating
// history entries, tools become toolSpecification records.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::KiroConfig;
use crate::proxy::common::model_mapping::map_model;
use crate::proxy::mappers::claude::models::{
    ChatRequest, ContentBlock, Message, Tool, ToolChoice,
};

/// Build the complete Kiro request payload. Pure over the request and
/// config; the only non-determinism is the generated conversation id.
pub fn build_kiro_payload(request: &ChatRequest, config: &KiroConfig) -> Value {
    let conversation_id = uuid::Uuid::new_v4().to_string();
    let model_id = map_model(&request.model);

    let mut user_input = Map::new();
    user_input.insert("content".into(), json!(build_current_message_content(request)));
    user_input.insert("modelId".into(), json!(model_id));
    user_input.insert("origin".into(), json!("AI_EDITOR"));

    if !config.disable_tools {
        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                let mut context = Map::new();
                context.insert("tools".into(), json!(build_tool_specifications(tools)));
                if let Some(choice) = &request.tool_choice {
                    context.insert("toolChoice".into(), convert_tool_choice(choice));
                }
                user_input.insert("userInputMessageContext".into(), Value::Object(context));
            }
        }
    }

    if let Some(stop_sequences) = &request.stop_sequences {
        if !stop_sequences.is_empty() {
            user_input.insert("stopSequences".into(), json!(stop_sequences));
        }
    }

    if let Some(thinking) = &request.thinking {
        user_input.insert("thinking".into(), thinking.clone());
    }

    let history = build_history(request, config, model_id);
    debug!(
        history_entries = history.len(),
        model_id, "Built Kiro payload"
    );

    json!({
        "profileArn": config.profile_arn,
        "conversationState": {
            "chatTriggerType": "MANUAL",
            "conversationId": conversation_id,
            "currentMessage": { "userInputMessage": Value::Object(user_input) },
            "history": history,
        }
    })
}

/// Current-turn content: each system block as "[System] ...", then each
/// content block of the last message as "[<role>] ...". Only text blocks
/// contribute text; images leave a short marker.
fn build_current_message_content(request: &ChatRequest) -> String {
    let mut segments = Vec::new();

    if let Some(system) = &request.system {
        for block in system.blocks() {
            if block.block_type.eq_ignore_ascii_case("text") {
                segments.push(format!("[System] {}", block.text));
            }
        }
    }

    if let Some(last) = request.messages.last() {
        for block in last.content.blocks() {
            match block {
                ContentBlock::Text { text } => {
                    segments.push(format!("[{}] {}", last.role, text));
                }
                ContentBlock::Image { source } => {
                    let media = source.media_type.as_deref().unwrap_or("unknown");
                    segments.push(format!(
                        "[{}] <image media={}, type={}>",
                        last.role, media, source.source_type
                    ));
                }
                _ => {}
            }
        }
    }

    segments.join("\n")
}

/// Render one historical message to the flat text channel. Tool uses
/// round-trip through the same bracket form the extractor parses.
fn build_message_content(message: &Message) -> String {
    let mut out = String::new();
    for block in message.content.blocks() {
        match block {
            ContentBlock::Text { text } => {
                if message.role.eq_ignore_ascii_case("user") {
                    out.push_str("[user] ");
                }
                out.push_str(&text);
            }
            ContentBlock::ToolUse { name, input, .. } => {
                out.push_str(&format!("[Called {} with args: {}]", name, input));
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                let rendered = match &content {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!("[Tool {} returned: {}]", tool_use_id, rendered));
            }
            ContentBlock::Image { .. } => {}
        }
    }
    out
}

/// History = all messages except the last, rendered as strictly alternating
/// userInputMessage / assistantResponseMessage pairs. Missing halves get
/// placeholder entries so the gateway always sees a complete pair.
fn build_history(request: &ChatRequest, config: &KiroConfig, model_id: &str) -> Vec<Value> {
    let mut history = Vec::new();
    if config.disable_history || request.messages.len() <= 1 {
        return history;
    }

    let mut historical: &[Message] = &request.messages[..request.messages.len() - 1];
    if historical.len() > config.max_history_messages {
        let skip = historical.len() - config.max_history_messages;
        debug!(skipped = skip, "Limiting history to most recent messages");
        historical = &historical[skip..];
    }

    // Flatten to (role, content), capped by total character volume.
    let mut processed: Vec<(&str, String)> = Vec::new();
    let mut total_size = 0usize;
    for message in historical {
        let content = build_message_content(message);
        if total_size + content.len() > config.max_history_size {
            debug!(
                current = total_size,
                message_size = content.len(),
                limit = config.max_history_size,
                "History size limit reached, dropping remainder"
            );
            break;
        }
        total_size += content.len();

        if message.role.eq_ignore_ascii_case("user") {
            processed.push(("user", content));
        } else if message.role.eq_ignore_ascii_case("assistant") {
            processed.push(("assistant", content));
        }
    }

    let mut i = 0;
    while i < processed.len() {
        let (role, content) = &processed[i];
        if *role == "user" {
            history.push(user_entry(content, model_id));

            if i + 1 < processed.len() && processed[i + 1].0 == "assistant" {
                history.push(assistant_entry(&processed[i + 1].1));
                i += 2;
            } else {
                history.push(assistant_entry("I understand."));
                i += 1;
            }
        } else {
            // Orphaned assistant message: synthesize the user half.
            history.push(user_entry("Continue", model_id));
            history.push(assistant_entry(content));
            i += 1;
        }
    }

    history
}

fn user_entry(content: &str, model_id: &str) -> Value {
    json!({
        "userInputMessage": {
            "content": content,
            "modelId": model_id,
            "origin": "AI_EDITOR",
        }
    })
}

fn assistant_entry(content: &str) -> Value {
    json!({ "assistantResponseMessage": { "content": content } })
}

/// Convert tool definitions into Kiro toolSpecification records, resolving
/// the effective name/description/schema across both accepted shapes.
fn build_tool_specifications(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            let name = tool.effective_name().unwrap_or_else(|| {
                debug!("Tool definition missing name, using default");
                "general_tool".to_string()
            });

            let description = match tool.effective_description() {
                Some(desc) if !desc.is_empty() => desc,
                _ => name.clone(),
            };

            let schema = normalize_input_schema(tool.effective_input_schema());

            json!({
                "toolSpecification": {
                    "name": name,
                    "description": description,
                    "inputSchema": { "json": schema },
                }
            })
        })
        .collect()
}

/// Kiro requires a schema with at least `"type": "object"`.
fn normalize_input_schema(schema: Option<Value>) -> Value {
    match schema {
        Some(Value::Object(mut map)) if !map.is_empty() => {
            map.entry("type").or_insert_with(|| json!("object"));
            Value::Object(map)
        }
        _ => json!({ "type": "object", "properties": {} }),
    }
}

/// auto/any -> AUTO, none -> NONE, required -> REQUIRED, anything else is a
/// specific tool name -> SPECIFIC. A `name` field always propagates.
fn convert_tool_choice(choice: &ToolChoice) -> Value {
    let mut node = Map::new();
    match choice.choice_type.as_deref() {
        Some("auto") | Some("any") | None => {
            node.insert("type".into(), json!("AUTO"));
        }
        Some("none") => {
            node.insert("type".into(), json!("NONE"));
        }
        Some("required") => {
            node.insert("type".into(), json!("REQUIRED"));
        }
        Some(other) => {
            node.insert("type".into(), json!("SPECIFIC"));
            if choice.name.is_none() {
                node.insert("name".into(), json!(other));
            }
        }
    }
    if let Some(name) = &choice.name {
        node.insert("name".into(), json!(name));
    }
    Value::Object(node)
}
