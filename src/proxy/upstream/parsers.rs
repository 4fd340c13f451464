// Tool-call extraction from free text
// The gateway reports tool invocations inline as `[Called name with args: {...}]`
// markers; this module pulls them back out and deduplicates them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// A tool invocation recovered from gateway output. `arguments` keeps the
/// raw JSON text; parsing is deferred to response assembly so malformed
/// arguments can degrade instead of failing the request.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolInvocation {
    pub fn new(name: String, arguments: String) -> Self {
        Self {
            id: generate_tool_id(),
            name,
            arguments,
        }
    }
}

/// Anthropic-style tool id: "toolu_" + 24 hex chars.
pub fn generate_tool_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("toolu_{}", &hex[..24])
}

static TOOL_CALL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[Called\s+(\w+)\s+with\s+args:\s*").unwrap());

static TOOL_CALL_SIMPLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Called\s+(\w+)\]").unwrap());

/// Find the closing `}` matching the `{` at `start`, respecting strings and
/// escapes. Returns `None` when the braces never balance.
fn find_matching_brace(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if start >= bytes.len() || bytes[start] != b'{' {
        return None;
    }

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;
    let mut i = start;

    while i < bytes.len() {
        let ch = bytes[i];

        if escape_next {
            escape_next = false;
            i += 1;
            continue;
        }

        if ch == b'\\' && in_string {
            escape_next = true;
            i += 1;
            continue;
        }

        if ch == b'"' {
            in_string = !in_string;
            i += 1;
            continue;
        }

        if !in_string {
            if ch == b'{' {
                depth += 1;
            } else if ch == b'}' {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }

        i += 1;
    }

    None
}

/// Parse `[Called func_name with args: {...}]` markers out of `text`.
/// Falls back to the argument-less `[Called func_name]` form when no full
/// marker is found.
pub fn parse_bracket_tool_calls(text: &str) -> Vec<ToolInvocation> {
    if text.is_empty() || !text.contains("[Called") {
        return Vec::new();
    }

    let mut results = Vec::new();

    for caps in TOOL_CALL_PATTERN.captures_iter(text) {
        let func_name = caps.get(1).unwrap().as_str().to_string();
        let match_end = caps.get(0).unwrap().end();

        let json_start = match text[match_end..].find('{') {
            Some(offset) => match_end + offset,
            None => continue,
        };

        let json_end = match find_matching_brace(text, json_start) {
            Some(pos) => pos,
            None => continue,
        };

        let json_str = &text[json_start..=json_end];
        if serde_json::from_str::<serde_json::Value>(json_str).is_err() {
            continue;
        }

        results.push(ToolInvocation::new(func_name, json_str.to_string()));
    }

    if !results.is_empty() {
        return results;
    }

    for caps in TOOL_CALL_SIMPLE_PATTERN.captures_iter(text) {
        let func_name = caps.get(1).unwrap().as_str().to_string();
        results.push(ToolInvocation::new(func_name, "{}".to_string()));
    }

    results
}

/// Deduplicate by (name, raw argument text); the first occurrence wins and
/// insertion order is preserved.
pub fn deduplicate_tool_calls(calls: Vec<ToolInvocation>) -> Vec<ToolInvocation> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for call in calls {
        let key = format!("{}::{}", call.name, call.arguments);
        if seen.insert(key) {
            unique.push(call);
        }
    }

    unique
}
