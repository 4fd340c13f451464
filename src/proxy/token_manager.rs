// Bearer token lifecycle
// Holds the current Kiro access token and performs throttled refresh
// against the desktop refresh endpoint. Refresh failure is never fatal to
// the caller; it just forgoes renewal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::KiroConfig;

/// Timeout for the refresh call, deliberately shorter than the gateway call.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Debug)]
struct TokenState {
    access_token: String,
    last_refresh: Option<Instant>,
}

/// Sole owner of the token state. Reads never observe a torn value and a
/// refresh is an atomic replace; concurrent refreshes are tolerated (last
/// writer wins) rather than serialized.
pub struct TokenManager {
    config: Arc<KiroConfig>,
    client: reqwest::Client,
    state: RwLock<TokenState>,
}

impl TokenManager {
    pub fn new(config: Arc<KiroConfig>, client: reqwest::Client) -> Self {
        let seed = config.access_token.clone().unwrap_or_default();
        Self {
            config,
            client,
            state: RwLock::new(TokenState {
                access_token: seed,
                last_refresh: None,
            }),
        }
    }

    pub async fn current_token(&self) -> String {
        self.state.read().await.access_token.clone()
    }

    /// Return the current token, lazily seeding it from configuration when
    /// empty.
    pub async fn ensure_token(&self) -> String {
        {
            let state = self.state.read().await;
            if !state.access_token.trim().is_empty() {
                return state.access_token.clone();
            }
        }

        let mut state = self.state.write().await;
        if state.access_token.trim().is_empty() {
            if let Some(token) = &self.config.access_token {
                state.access_token = token.clone();
            }
        }
        state.access_token.clone()
    }

    /// Refresh the access token unless a refresh happened inside the
    /// throttle window or no refresh credential is configured. Returns the
    /// token to use either way.
    pub async fn refresh_if_needed(&self) -> String {
        let throttle = Duration::from_secs(self.config.min_refresh_interval_secs);
        {
            let state = self.state.read().await;
            if let Some(last) = state.last_refresh {
                if last.elapsed() < throttle {
                    info!("Skip token refresh because of throttle window");
                    return state.access_token.clone();
                }
            }
        }

        let refresh_token = match &self.config.refresh_token {
            Some(token) if !token.trim().is_empty() => token.clone(),
            _ => {
                warn!("No refresh token configured, reuse current access token");
                return self.ensure_token().await;
            }
        };

        match self.request_refresh(&refresh_token).await {
            Ok(Some(new_token)) => {
                let mut state = self.state.write().await;
                state.access_token = new_token.clone();
                state.last_refresh = Some(Instant::now());
                info!("Access token refreshed");
                new_token
            }
            Ok(None) => {
                warn!("Refresh response missing accessToken, reuse existing token");
                self.ensure_token().await
            }
            Err(err) => {
                warn!("Failed to refresh token: {}", err);
                self.ensure_token().await
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<Option<String>, reqwest::Error> {
        let response = self
            .client
            .post(&self.config.refresh_url)
            .json(&RefreshRequest { refresh_token })
            .timeout(REFRESH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let body: RefreshResponse = response.json().await?;
        Ok(body
            .access_token
            .filter(|token| !token.trim().is_empty()))
    }
}
