pub mod agent;
pub mod capture;
pub mod config;
pub mod errors;
pub mod llm;
pub mod server;

use crate::errors::ScoutResult;
use crate::llm::registry::ProviderRegistry;
use crate::server::AppState;

pub async fn run() -> ScoutResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    // Build the provider registry from config; fall back to an empty registry
    // on error so the server still answers /check-ai-binding with false.
    let (registry, bind_addr) = match config::load_config() {
        Ok(cfg) => (ProviderRegistry::from_config(&cfg), cfg.server.bind_addr),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load config; starting with empty LLM registry");
            (
                ProviderRegistry::new(String::new()),
                config::ServerConfig::default().bind_addr,
            )
        }
    };

    let state = AppState::new(registry);
    server::serve(bind_addr, state).await
}
