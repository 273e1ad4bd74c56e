//! LLM provider implementations

mod anthropic;
pub mod mock;
mod openai_compatible;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use openai_compatible::OpenAICompatibleProvider;

use crate::config::{ModelPreset, ProviderConfig};
use crate::error::{LlmError, Result};
use crate::provider::LlmProvider;

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    OpenRouter,
}

impl ProviderKind {
    /// Parse provider kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" | "open-ai" | "open_ai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(LlmError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

/// Create a provider instance from a preset and optional config
pub fn get_provider(
    preset: &ModelPreset,
    provider_config: Option<&ProviderConfig>,
) -> Result<Box<dyn LlmProvider>> {
    let kind = ProviderKind::from_str(&preset.provider)?;

    match kind {
        ProviderKind::Anthropic => {
            let api_key = get_api_key(provider_config, "ANTHROPIC_API_KEY", "Anthropic")?;
            Ok(Box::new(AnthropicProvider::new(&preset.model, api_key)?))
        }
        ProviderKind::OpenAi => {
            let api_key = get_api_key(provider_config, "OPENAI_API_KEY", "OpenAI")?;
            match provider_config.and_then(|c| c.base_url.as_deref()) {
                Some(base_url) => Ok(Box::new(OpenAICompatibleProvider::new(
                    &preset.model,
                    base_url,
                    api_key,
                    "OpenAI",
                )?)),
                None => Ok(Box::new(OpenAICompatibleProvider::openai(
                    &preset.model,
                    api_key,
                )?)),
            }
        }
        ProviderKind::OpenRouter => {
            let api_key = get_api_key(provider_config, "OPENROUTER_API_KEY", "OpenRouter")?;
            Ok(Box::new(OpenAICompatibleProvider::openrouter(
                &preset.model,
                api_key,
            )?))
        }
    }
}

/// Get API key from config or environment variable
fn get_api_key(
    config: Option<&ProviderConfig>,
    env_var: &str,
    provider_name: &str,
) -> Result<String> {
    // Check config first
    if let Some(key) = config.and_then(|c| c.api_key.clone()) {
        return Ok(key);
    }

    // Fall back to environment variable
    std::env::var(env_var).map_err(|_| LlmError::MissingApiKey {
        provider: provider_name.to_string(),
        env_var: env_var.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(
            ProviderKind::from_str("anthropic").unwrap(),
            ProviderKind::Anthropic
        );
        assert_eq!(
            ProviderKind::from_str("OpenAI").unwrap(),
            ProviderKind::OpenAi
        );
        assert_eq!(
            ProviderKind::from_str("openrouter").unwrap(),
            ProviderKind::OpenRouter
        );
        assert!(ProviderKind::from_str("cohere").is_err());
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(ProviderKind::Anthropic.env_var(), "ANTHROPIC_API_KEY");
        assert_eq!(ProviderKind::OpenAi.env_var(), "OPENAI_API_KEY");
        assert_eq!(ProviderKind::OpenRouter.env_var(), "OPENROUTER_API_KEY");
    }
}
