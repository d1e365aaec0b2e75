use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LlmConfig, RoleEntry};
use crate::errors::{GroundError, GroundResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::{CallConfig, ChatMessage};

/// What a model is used for. Each role maps to a provider + model in config.toml.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Grounding,
    Verification,
    Integration,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Grounding => "grounding",
            ModelRole::Verification => "verification",
            ModelRole::Integration => "integration",
        }
    }
}

/// A provider bound to the call parameters of one role.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, cfg: CallConfig) -> Self {
        Self { provider, cfg }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn call_config(&self) -> &CallConfig {
        &self.cfg
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> GroundResult<String> {
        self.provider.chat(messages, &self.cfg).await
    }
}

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// Kept for role-to-model lookups (does not need to be mutable after init).
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(llm_config: LlmConfig) -> Self {
        Self {
            providers: HashMap::new(),
            llm_config,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn list_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Return a client for a model role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. verification and integration fall back to the grounding role
    /// 3. the only configured provider, with its default model
    pub fn client_for_role(&self, role: ModelRole) -> GroundResult<ModelClient> {
        let roles = &self.llm_config.roles;
        let entry = match role {
            ModelRole::Grounding => roles.grounding.as_ref(),
            ModelRole::Verification => roles.verification.as_ref().or(roles.grounding.as_ref()),
            ModelRole::Integration => roles.integration.as_ref().or(roles.grounding.as_ref()),
        };

        if let Some(entry) = entry {
            return self.resolve_entry(role, entry);
        }

        if self.llm_config.providers.len() == 1 {
            if let Some(id) = self.llm_config.providers.keys().next() {
                tracing::debug!(role = role.as_str(), provider = %id, "role not configured, using sole provider");
                let fallback = RoleEntry {
                    provider: id.clone(),
                    model: None,
                    temperature: None,
                    max_tokens: None,
                };
                return self.resolve_entry(role, &fallback);
            }
        }

        Err(GroundError::Config(format!(
            "no [llm.roles.{}] configured and no single provider to fall back to",
            role.as_str()
        )))
    }

    fn resolve_entry(&self, role: ModelRole, entry: &RoleEntry) -> GroundResult<ModelClient> {
        let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
            GroundError::Config(format!(
                "Role '{}' references unknown provider '{}'",
                role.as_str(),
                entry.provider
            ))
        })?;
        let defaults = self.llm_config.providers.get(&entry.provider);
        let cfg = CallConfig {
            model: entry
                .model
                .clone()
                .or_else(|| defaults.map(|p| p.model.clone()))
                .unwrap_or_default(),
            temperature: entry
                .temperature
                .or_else(|| defaults.map(|p| p.temperature))
                .unwrap_or(0.0),
            max_tokens: entry
                .max_tokens
                .or_else(|| defaults.map(|p| p.max_tokens))
                .unwrap_or(400),
        };
        tracing::debug!(
            role = role.as_str(),
            provider = %entry.provider,
            model = %cfg.model,
            temperature = cfg.temperature,
            max_tokens = cfg.max_tokens,
            "resolved role config"
        );
        Ok(ModelClient::new(provider, cfg))
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `GROUNDLOOP_<ID>_API_KEY`.
    pub fn from_config(config: &LlmConfig) -> GroundResult<Self> {
        let mut registry = Self::new(config.clone());
        for (id, entry) in &config.providers {
            let api_key = std::env::var(format!("GROUNDLOOP_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider = OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                Duration::from_secs(entry.timeout_secs),
            )?;
            registry.register(Arc::new(provider));
        }
        tracing::info!(providers = ?registry.list_names(), "LLM registry ready");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn roles_fall_back_to_grounding() {
        let cfg = parse_config(
            r#"
            [llm.providers.tgi]
            api_base = "http://localhost:8080/v1/chat/completions"
            model = "tgi"
            max_tokens = 512

            [llm.roles.grounding]
            provider = "tgi"
            max_tokens = 400

            [llm.roles.integration]
            provider = "tgi"
            model = "coder"
            "#,
        )
        .unwrap();
        let registry = ProviderRegistry::from_config(&cfg.llm).unwrap();

        let grounding = registry.client_for_role(ModelRole::Grounding).unwrap();
        assert_eq!(grounding.call_config().model, "tgi");
        assert_eq!(grounding.call_config().max_tokens, 400);

        let verification = registry.client_for_role(ModelRole::Verification).unwrap();
        assert_eq!(verification.call_config(), grounding.call_config());

        let integration = registry.client_for_role(ModelRole::Integration).unwrap();
        assert_eq!(integration.call_config().model, "coder");
        assert_eq!(integration.call_config().max_tokens, 512);
    }

    #[test]
    fn missing_roles_without_sole_provider_is_a_config_error() {
        let registry = ProviderRegistry::new(LlmConfig::default());
        assert!(matches!(
            registry.client_for_role(ModelRole::Grounding),
            Err(GroundError::Config(_))
        ));
    }
}
