// Application configuration
// Read from environment variables at startup; Kiro credentials fall back to
// token cache files when not set directly.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen address, e.g. "127.0.0.1:8045".
    pub bind: String,
    /// API key clients must present via x-api-key or Authorization.
    pub api_key: String,
    /// Default anthropic-version echoed back when the client sends none.
    pub anthropic_version: String,
    pub kiro: KiroConfig,
}

#[derive(Debug, Clone)]
pub struct KiroConfig {
    /// Full URL of the generateAssistantResponse endpoint.
    pub base_url: String,
    pub profile_arn: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token_file: Option<String>,
    pub refresh_token_file: Option<String>,
    /// Full URL of the refreshToken endpoint.
    pub refresh_url: String,
    /// Throttle window for refresh_if_needed.
    pub min_refresh_interval_secs: u64,
    pub disable_tools: bool,
    pub disable_history: bool,
    pub max_history_messages: usize,
    pub max_history_size: usize,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut kiro = KiroConfig {
            base_url: env_string("KIRO_BASE_URL").unwrap_or_else(|| {
                "https://codewhisperer.us-east-1.amazonaws.com/generateAssistantResponse".into()
            }),
            profile_arn: env_string("KIRO_PROFILE_ARN").unwrap_or_default(),
            access_token: env_string("KIRO_ACCESS_TOKEN"),
            refresh_token: env_string("KIRO_REFRESH_TOKEN"),
            access_token_file: env_string("KIRO_ACCESS_TOKEN_FILE"),
            refresh_token_file: env_string("KIRO_REFRESH_TOKEN_FILE"),
            refresh_url: env_string("KIRO_REFRESH_URL")
                .unwrap_or_else(|| "https://prod.us-east-1.auth.desktop.kiro.dev/refreshToken".into()),
            min_refresh_interval_secs: env_parse("KIRO_MIN_REFRESH_INTERVAL_SECS", 5),
            disable_tools: env_bool("KIRO_DISABLE_TOOLS"),
            disable_history: env_bool("KIRO_DISABLE_HISTORY"),
            max_history_messages: env_parse("KIRO_MAX_HISTORY_MESSAGES", 10),
            max_history_size: env_parse("KIRO_MAX_HISTORY_SIZE", 131072),
        };
        kiro.resolve_token_files();

        Self {
            bind: env_string("KIRO_GATEWAY_BIND").unwrap_or_else(|| "127.0.0.1:8045".into()),
            api_key: env_string("KIRO_API_KEY")
                .or_else(|| env_string("API_KEY"))
                .unwrap_or_default(),
            anthropic_version: env_string("ANTHROPIC_VERSION")
                .unwrap_or_else(|| "2023-06-01".into()),
            kiro,
        }
    }
}

#[derive(Debug, Default)]
struct TokenPair {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl KiroConfig {
    /// Fill missing tokens from candidate files: the configured token files
    /// first, then the Kiro SSO cache default location.
    pub fn resolve_token_files(&mut self) {
        if populated(&self.access_token) && populated(&self.refresh_token) {
            return;
        }

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = &self.access_token_file {
            candidates.push(PathBuf::from(path));
        }
        if let Some(path) = &self.refresh_token_file {
            candidates.push(PathBuf::from(path));
        }
        if let Some(path) = default_cache_path() {
            candidates.push(path);
        }
        candidates.dedup();

        for candidate in candidates {
            if !candidate.exists() {
                continue;
            }
            let Some(pair) = read_token_cache(&candidate).or_else(|| read_plain_token(&candidate))
            else {
                continue;
            };
            if !populated(&self.access_token) && populated(&pair.access_token) {
                debug!("Loaded Kiro access token from {}", candidate.display());
                self.access_token = pair.access_token;
            }
            if !populated(&self.refresh_token) && populated(&pair.refresh_token) {
                debug!("Loaded Kiro refresh token from {}", candidate.display());
                self.refresh_token = pair.refresh_token;
            }
            if populated(&self.access_token) && populated(&self.refresh_token) {
                break;
            }
        }

        if !populated(&self.access_token) {
            warn!("No Kiro access token configured; gateway calls will fail until one is set");
        }
    }
}

fn populated(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Parse a JSON token cache, accepting the key spellings seen in the wild:
/// accessToken / token / access_token and refreshToken / refresh_token.
fn read_token_cache(path: &Path) -> Option<TokenPair> {
    let raw = std::fs::read_to_string(path).ok()?;
    let node: Value = serde_json::from_str(&raw).ok()?;

    let text = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|key| node.get(key).and_then(Value::as_str))
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty())
    };

    let pair = TokenPair {
        access_token: text(&["accessToken", "token", "access_token"]),
        refresh_token: text(&["refreshToken", "refresh_token"]),
    };

    if pair.access_token.is_some() || pair.refresh_token.is_some() {
        Some(pair)
    } else {
        None
    }
}

/// A file holding nothing but the token itself.
fn read_plain_token(path: &Path) -> Option<TokenPair> {
    let value = std::fs::read_to_string(path).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(TokenPair {
        access_token: Some(trimmed.to_string()),
        refresh_token: None,
    })
}

fn default_cache_path() -> Option<PathBuf> {
    let home = env_string("HOME").or_else(|| env_string("USERPROFILE"))?;
    Some(
        PathBuf::from(home)
            .join(".aws")
            .join("sso")
            .join("cache")
            .join("kiro-auth-token.json"),
    )
}
