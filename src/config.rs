use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{ScoutError, ScoutResult};

/// Environment variable that overrides the vision model at request time.
pub const VISION_MODEL_ENV: &str = "SCREENSCOUT_VISION_MODEL";

/// Fallback model identifier when neither config nor env names one.
pub const DEFAULT_VISION_MODEL: &str = "glm-4v-flash";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var SCREENSCOUT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps service roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Conversational LLM: streaming reply shown to the user, tool-calling capable.
    pub chat: Option<RoleEntry>,
    /// Vision / image-understanding model driving the capture pipeline.
    pub vision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    /// Use SSE streaming. Set false for one-shot structured calls.
    #[serde(default = "default_true")]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    ([127, 0, 0, 1], 8787).into()
}

fn default_temperature() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

/// Resolve the vision model identifier for an incoming capture request.
/// Checked at request time so operators can repoint the model without a restart.
pub fn vision_model_override() -> Option<String> {
    std::env::var(VISION_MODEL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn resolve_config_path() -> ScoutResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(ScoutError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> ScoutResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}
