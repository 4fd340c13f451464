// Claude protocol data models
// Request/response shapes for the Anthropic-compatible /v1/messages surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anthropic Messages API request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(alias = "max_output_tokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Value>,
}

/// System prompt arrives either as a bare string or an array of text blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    String(String),
    Array(Vec<SystemBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
}

impl SystemPrompt {
    /// Normalize to block form; a bare string becomes a single text block.
    pub fn blocks(&self) -> Vec<SystemBlock> {
        match self {
            SystemPrompt::String(s) => vec![SystemBlock {
                block_type: "text".to_string(),
                text: s.clone(),
            }],
            SystemPrompt::Array(blocks) => blocks.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

/// Message content arrives either as a bare string or an array of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    String(String),
    Array(Vec<ContentBlock>),
}

impl MessageContent {
    /// Normalize to the array form. A blank string normalizes to no blocks.
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            MessageContent::String(s) => {
                if s.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![ContentBlock::Text { text: s.clone() }]
                }
            }
            MessageContent::Array(blocks) => blocks.clone(),
        }
    }
}

/// Content block (Claude)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    #[serde(rename = "image")]
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String, // "base64" or "url"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Tool definition. Clients send either direct fields or the legacy shape
/// with name/description/parameters nested under "function".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<Value>,
}

impl Tool {
    /// Direct field wins; legacy `function.name` is the fallback.
    pub fn effective_name(&self) -> Option<String> {
        if let Some(name) = &self.name {
            return Some(name.clone());
        }
        self.function
            .as_ref()
            .and_then(|f| f.get("name"))
            .and_then(|n| n.as_str())
            .map(|n| n.to_string())
    }

    pub fn effective_description(&self) -> Option<String> {
        if let Some(desc) = &self.description {
            return Some(desc.clone());
        }
        self.function
            .as_ref()
            .and_then(|f| f.get("description"))
            .and_then(|d| d.as_str())
            .map(|d| d.to_string())
    }

    /// Direct `input_schema` wins; legacy `function.parameters` is the fallback.
    pub fn effective_input_schema(&self) -> Option<Value> {
        if let Some(schema) = &self.input_schema {
            return Some(schema.clone());
        }
        self.function.as_ref().and_then(|f| f.get("parameters")).cloned()
    }
}

/// Tool-choice directive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoice {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub choice_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Assembled Anthropic response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub role: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    pub content: Vec<ContentBlock>,
    pub stop_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn string_content_normalizes_to_one_text_block() {
        let content = MessageContent::String("hello".to_string());
        let blocks = content.blocks();
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::Text { text } => assert_eq!(text, "hello"),
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn blank_string_content_normalizes_to_no_blocks() {
        assert!(MessageContent::String("   ".to_string()).blocks().is_empty());
    }

    #[test]
    fn system_prompt_string_becomes_text_block() {
        let system = SystemPrompt::String("be brief".to_string());
        let blocks = system.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].block_type, "text");
        assert_eq!(blocks[0].text, "be brief");
    }

    #[test]
    fn request_accepts_string_and_array_content() {
        let raw = r#"{
            "model": "claude-sonnet-4-5-20250929",
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": "plain string"},
                {"role": "assistant", "content": [{"type": "text", "text": "typed"}]}
            ]
        }"#;
        let request: ChatRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content.blocks().len(), 1);
        assert_eq!(request.messages[1].content.blocks().len(), 1);
    }

    #[test]
    fn request_accepts_max_output_tokens_alias() {
        let raw = r#"{
            "model": "m",
            "max_output_tokens": 42,
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let request: ChatRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.max_tokens, Some(42));
    }

    #[test]
    fn tool_effective_fields_prefer_direct_over_function() {
        let tool: Tool = serde_json::from_str(
            r#"{
                "name": "direct",
                "function": {"name": "legacy", "description": "legacy desc",
                             "parameters": {"type": "object"}}
            }"#,
        )
        .unwrap();
        assert_eq!(tool.effective_name().as_deref(), Some("direct"));
        assert_eq!(tool.effective_description().as_deref(), Some("legacy desc"));
        assert!(tool.effective_input_schema().is_some());
    }

    #[test]
    fn tool_effective_fields_fall_back_to_function() {
        let tool: Tool = serde_json::from_str(
            r#"{"function": {"name": "legacy", "parameters": {"type": "object", "properties": {}}}}"#,
        )
        .unwrap();
        assert_eq!(tool.effective_name().as_deref(), Some("legacy"));
        assert!(tool.effective_description().is_none());
        assert_eq!(
            tool.effective_input_schema().unwrap()["type"],
            serde_json::json!("object")
        );
    }

    proptest! {
        #[test]
        fn prop_content_block_text_roundtrip(text in "[a-zA-Z0-9 ]{0,100}") {
            let block = ContentBlock::Text { text: text.clone() };
            let json = serde_json::to_string(&block).unwrap();
            let back: ContentBlock = serde_json::from_str(&json).unwrap();
            match back {
                ContentBlock::Text { text: t } => prop_assert_eq!(t, text),
                _ => prop_assert!(false, "wrong variant"),
            }
        }

        #[test]
        fn prop_content_block_tool_use_roundtrip(
            name in "[a-zA-Z][a-zA-Z0-9_]{0,20}",
            key in "[a-zA-Z]{1,10}",
            val in "[a-zA-Z0-9]{0,20}",
        ) {
            let block = ContentBlock::ToolUse {
                id: "toolu_abc123".into(),
                name: name.clone(),
                input: serde_json::json!({key.clone(): val.clone()}),
            };
            let json = serde_json::to_string(&block).unwrap();
            let back: ContentBlock = serde_json::from_str(&json).unwrap();
            match back {
                ContentBlock::ToolUse { id, name: n, input } => {
                    prop_assert_eq!(id, "toolu_abc123");
                    prop_assert_eq!(n, name);
                    prop_assert_eq!(input[&key].as_str().unwrap(), val.as_str());
                }
                _ => prop_assert!(false, "wrong variant"),
            }
        }

        #[test]
        fn prop_content_block_tool_result_roundtrip(
            tool_use_id in "[a-zA-Z0-9_]{1,30}",
            content_str in "[a-zA-Z0-9 ]{0,50}",
        ) {
            let block = ContentBlock::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: Value::String(content_str.clone()),
                is_error: Some(false),
            };
            let json = serde_json::to_string(&block).unwrap();
            let back: ContentBlock = serde_json::from_str(&json).unwrap();
            match back {
                ContentBlock::ToolResult { tool_use_id: tid, content, is_error } => {
                    prop_assert_eq!(tid, tool_use_id);
                    prop_assert_eq!(content.as_str().unwrap(), content_str.as_str());
                    prop_assert_eq!(is_error, Some(false));
                }
                _ => prop_assert!(false, "wrong variant"),
            }
        }
    }
}
