use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, LlmConfig};
use crate::errors::{ScoutError, ScoutResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    configured: HashMap<String, bool>,
    active: String,
    /// Kept for role-to-model lookups (does not need to be mutable after init).
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            configured: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>, configured: bool) {
        self.configured
            .insert(provider.name().to_string(), configured);
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> ScoutResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            ScoutError::Config(format!(
                "Active provider '{}' not found in registry",
                self.active
            ))
        })
    }

    /// Whether the model-execution binding is usable: the active provider
    /// exists and carries an endpoint + key. Probed by `/check-ai-binding`
    /// and before any model work in a request.
    pub fn binding_configured(&self) -> bool {
        self.configured.get(&self.active).copied().unwrap_or(false)
    }

    /// Return the provider and call configuration for a named service role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature and `stream = true`
    ///
    /// `max_steps` is the caller's per-invocation budget; it travels inside
    /// the returned `CallConfig`.
    pub fn call_config_for_role(
        &self,
        role: &str,
        max_steps: u32,
    ) -> ScoutResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let role_entry = match role {
            "chat" => self.llm_config.roles.chat.as_ref(),
            "vision" => self.llm_config.roles.vision.as_ref(),
            other => {
                tracing::warn!(role = other, "unknown role, falling back to active provider");
                None
            }
        };

        if let Some(entry) = role_entry {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                ScoutError::Config(format!(
                    "Role '{}' references unknown provider '{}'",
                    role, entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                role = role,
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature = temperature,
                "resolved role config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                    max_steps,
                },
            ));
        }

        // Fallback: active provider, provider-level defaults
        let provider = self.get_active()?;
        let entry = self.llm_config.providers.get(&self.active);
        let (model, temperature) = entry
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            role = role,
            provider = %self.active,
            model = %model,
            "role not configured, using active provider fallback"
        );
        Ok((
            provider,
            CallConfig {
                model,
                stream: true,
                temperature,
                max_steps,
            },
        ))
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `SCREENSCOUT_<ID>_API_KEY`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            configured: HashMap::new(),
            active: config.llm.active_provider.clone(),
            llm_config: config.llm.clone(),
        };
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("SCREENSCOUT_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider =
                OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key);
            let configured = provider.is_configured();
            registry.register(Arc::new(provider), configured);
        }
        registry
    }
}
