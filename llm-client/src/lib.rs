//! Shared LLM client library for the booksum workspace
//!
//! Provides a unified chat-completion interface over multiple providers:
//! - Anthropic API (direct)
//! - OpenAI API
//! - OpenRouter (multi-model access)
//!
//! Requests carry an ordered list of role-tagged messages; responses carry
//! the generated text plus the provider's stop reason.

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;

pub use config::{Config, ModelPreset, ProviderConfig};
pub use error::{LlmError, Result};
pub use provider::{ChatMessage, LlmProvider, LlmRequest, LlmResponse, TokenUsage};
pub use providers::{MockProvider, ProviderKind, get_provider};
