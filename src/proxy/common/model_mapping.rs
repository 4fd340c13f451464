// Model name mapping (Kiro upstream only)

use serde::Serialize;

/// Fixed lookup table from public Anthropic model names to Kiro model ids.
/// Unknown names fall back to the default entry; mapping is never inferred
/// from the name's shape.
const MODEL_TABLE: &[(&str, &str)] = &[
    ("claude-3-5-sonnet-20241022", "auto"),
    ("claude-3-5-haiku-20241022", "auto"),
    ("claude-sonnet-4-5-20250929", "CLAUDE_SONNET_4_5_20250929_V1_0"),
];

const DEFAULT_MODEL_ID: &str = "CLAUDE_SONNET_4_5_20250929_V1_0";

pub fn map_model(model: &str) -> &'static str {
    MODEL_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, id)| *id)
        .unwrap_or(DEFAULT_MODEL_ID)
}

/// Model metadata for the /v1/models listing
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub owned_by: String,
}

const LISTED_MODELS: &[(&str, &str)] = &[
    ("claude-sonnet-4-5-20250929", "Claude Sonnet 4.5"),
    ("claude-3-5-haiku-20241022", "Claude 3.5 Haiku"),
];

pub fn list_models() -> Vec<ModelInfo> {
    LISTED_MODELS
        .iter()
        .map(|(id, name)| ModelInfo {
            id: id.to_string(),
            name: name.to_string(),
            owned_by: "kiro-gateway".to_string(),
        })
        .collect()
}
