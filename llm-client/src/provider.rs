use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One role-tagged message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant"
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request to send to an LLM provider
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Full conversation to send, in order
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// Build a request from a message list with default sampling settings
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    /// Why generation stopped, in the provider's own vocabulary
    /// (e.g. "end_turn", "stop", "length", "max_tokens")
    pub stop_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// Whether the reply was cut off by the output token limit
    pub fn is_truncated(&self) -> bool {
        matches!(
            self.stop_reason.as_deref(),
            Some("length") | Some("max_tokens")
        )
    }
}

/// Token usage information
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a completion request
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Get the provider name for display
    fn name(&self) -> &'static str;

    /// Check if the provider is available (API key set, endpoint reachable, etc.)
    fn is_available(&self) -> Result<()>;
}
