//! LLM client wrapper for booksum
//!
//! Resolves the configured model preset into a concrete provider once at
//! startup; the provider handle is then passed by reference into the
//! summarizer.

use anyhow::{Context, Result};
use llm_client::{Config, LlmProvider, get_provider};

/// Wrapper around LLM providers for booksum
pub struct LlmClient {
    provider: Box<dyn LlmProvider>,
}

impl LlmClient {
    /// Create a new LLM client
    ///
    /// If preset_name is None, uses the default preset from config.
    pub fn new(preset_name: Option<&str>, debug: bool) -> Result<Self> {
        let config = Config::load().context("Failed to load LLM configuration")?;

        let preset_name = preset_name.unwrap_or_else(|| config.get_default_for_program("booksum"));
        let preset = config
            .get_preset(preset_name)
            .context(format!("Unknown preset: {}", preset_name))?;

        let provider_config = config.get_provider_config(&preset.provider);
        let provider = get_provider(preset, provider_config).context(format!(
            "Failed to initialize provider '{}' for preset '{}'",
            preset.provider, preset_name
        ))?;

        provider.is_available()?;

        if debug {
            eprintln!(
                "Using LLM provider: {} (model: {})",
                provider.name(),
                preset.model
            );
        }

        Ok(Self { provider })
    }

    /// The resolved provider handle
    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }
}
