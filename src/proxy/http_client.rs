// Configurable HTTP client builder
// One pooled reqwest::Client shared by the gateway and refresh calls.

use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Max idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// Connection timeout (default: 30s)
    pub connect_timeout: Duration,
    /// Overall request timeout (default: 120s); per-request timeouts may
    /// shorten this further.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 10,
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Build a configured reqwest::Client from the given config.
pub fn build_http_client(config: &HttpClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()
}
