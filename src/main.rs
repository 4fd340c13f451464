mod config;
mod error;
mod logger;
mod proxy;

use std::sync::Arc;

use tracing::{error, info};

use crate::proxy::handlers::kiro::KiroGateway;
use crate::proxy::http_client::{build_http_client, HttpClientConfig};
use crate::proxy::server::{router, AppState};
use crate::proxy::TokenManager;

#[tokio::main]
async fn main() {
    logger::init_logger();

    let config = Arc::new(config::AppConfig::from_env());
    if config.api_key.is_empty() {
        error!("No API key configured (set KIRO_API_KEY); refusing to start");
        std::process::exit(1);
    }

    let client = match build_http_client(&HttpClientConfig::default()) {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to build HTTP client: {}", err);
            std::process::exit(1);
        }
    };

    let kiro_config = Arc::new(config.kiro.clone());
    let token_manager = Arc::new(TokenManager::new(kiro_config.clone(), client.clone()));
    let gateway = Arc::new(KiroGateway::new(kiro_config, client, token_manager));

    let state = AppState {
        config: config.clone(),
        gateway,
    };

    let listener = match tokio::net::TcpListener::bind(&config.bind).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind {}: {}", config.bind, err);
            std::process::exit(1);
        }
    };

    info!("kiro-gateway listening on {}", config.bind);
    if let Err(err) = axum::serve(listener, router(state)).await {
        error!("Server error: {}", err);
        std::process::exit(1);
    }
}
