//! Mock LLM provider for testing
//!
//! Provides a configurable mock provider that can simulate failures,
//! retries, and scripted replies, and records every request it receives
//! so callers can assert on the exact conversation sent.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

/// A mock provider for testing retry behavior and prompt construction
pub struct MockProvider {
    /// Number of times to fail before succeeding (0 = always succeed)
    fail_count: AtomicUsize,
    /// Call index after which every call fails (usize::MAX = never)
    fail_after: AtomicUsize,
    /// Current call count
    call_count: AtomicUsize,
    /// Error to return on failure (None = always succeed)
    fail_with: Mutex<Option<LlmError>>,
    /// Fixed response content used once scripted replies run out
    success_response: String,
    /// Scripted replies, consumed in order before `success_response`
    scripted: Mutex<VecDeque<String>>,
    /// Every request received, in call order
    requests: Mutex<Vec<LlmRequest>>,
    /// Stop reason attached to successful responses
    stop_reason: Option<String>,
}

impl MockProvider {
    /// Create a provider that fails `n` times with the given error, then succeeds
    pub fn fails_then_succeeds(n: usize, error: LlmError, response: &str) -> Self {
        Self {
            fail_count: AtomicUsize::new(n),
            fail_after: AtomicUsize::new(usize::MAX),
            call_count: AtomicUsize::new(0),
            fail_with: Mutex::new(Some(error)),
            success_response: response.to_string(),
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            stop_reason: Some("stop".to_string()),
        }
    }

    /// Create a provider that succeeds `n` times, then fails with the given error
    pub fn succeeds_then_fails(n: usize, error: LlmError, response: &str) -> Self {
        Self {
            fail_count: AtomicUsize::new(0),
            fail_after: AtomicUsize::new(n),
            call_count: AtomicUsize::new(0),
            fail_with: Mutex::new(Some(error)),
            success_response: response.to_string(),
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            stop_reason: Some("stop".to_string()),
        }
    }

    /// Create a provider that always fails with the given error
    pub fn always_fails(error: LlmError) -> Self {
        Self::fails_then_succeeds(usize::MAX, error, "")
    }

    /// Create a provider that always succeeds with the same reply
    pub fn always_succeeds(response: &str) -> Self {
        Self {
            fail_count: AtomicUsize::new(0),
            fail_after: AtomicUsize::new(usize::MAX),
            call_count: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            success_response: response.to_string(),
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            stop_reason: Some("stop".to_string()),
        }
    }

    /// Create a provider that replies with each script entry in turn,
    /// then falls back to the last entry
    pub fn with_script(replies: &[&str]) -> Self {
        let fallback = replies.last().copied().unwrap_or_default().to_string();
        Self {
            fail_count: AtomicUsize::new(0),
            fail_after: AtomicUsize::new(usize::MAX),
            call_count: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            success_response: fallback,
            scripted: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
            stop_reason: Some("stop".to_string()),
        }
    }

    /// Override the stop reason reported on success
    pub fn with_stop_reason(mut self, reason: &str) -> Self {
        self.stop_reason = Some(reason.to_string());
        self
    }

    /// Get the number of times complete() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get a copy of every request received so far, in call order
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request);

        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        let fail_count = self.fail_count.load(Ordering::SeqCst);
        let fail_after = self.fail_after.load(Ordering::SeqCst);

        if call_num < fail_count || call_num >= fail_after {
            // Should fail on this call
            let error = self.fail_with.lock().unwrap();
            if let Some(err) = error.as_ref() {
                return Err(clone_error(err));
            }
        }

        let content = self
            .scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.success_response.clone());

        Ok(LlmResponse {
            content,
            model: "mock-model".to_string(),
            stop_reason: self.stop_reason.clone(),
            usage: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> Result<()> {
        Ok(())
    }
}

/// Clone an LlmError (needed because LlmError doesn't implement Clone)
fn clone_error(err: &LlmError) -> LlmError {
    match err {
        LlmError::ServerOverloaded { message } => LlmError::ServerOverloaded {
            message: message.clone(),
        },
        LlmError::MissingApiKey { provider, env_var } => LlmError::MissingApiKey {
            provider: provider.clone(),
            env_var: env_var.clone(),
        },
        LlmError::RateLimited { retry_after } => LlmError::RateLimited {
            retry_after: *retry_after,
        },
        LlmError::ApiError {
            message,
            status_code,
        } => LlmError::ApiError {
            message: message.clone(),
            status_code: *status_code,
        },
        LlmError::ProviderUnavailable(s) => LlmError::ProviderUnavailable(s.clone()),
        LlmError::ConfigError(s) => LlmError::ConfigError(s.clone()),
        LlmError::InvalidPreset(s) => LlmError::InvalidPreset(s.clone()),
        // For Io and Toml errors, we create a generic error since they can't be cloned
        LlmError::Io(_) => LlmError::ConfigError("IO error (mock)".to_string()),
        LlmError::TomlParse(_) => LlmError::ConfigError("TOML parse error (mock)".to_string()),
        LlmError::TomlSerialize(_) => {
            LlmError::ConfigError("TOML serialize error (mock)".to_string())
        }
    }
}
