//! LLM provider abstractions for antigravity-runtime.
//!
//! The reasoner talks to the model only through [`LlmProvider`]. Output
//! validation lives outside the providers so they can be swapped or mocked.
//!
//! ## Security
//!
//! Providers that need an API key hold it in an [`ApiCredential`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
mod replay;
pub mod secrets;

#[cfg(feature = "gemini")]
mod gemini;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use replay::{ReplayProvider, ReplayProviderFactory, ReplayStep, RUN_STAMP_PLACEHOLDER};
pub use secrets::{ApiCredential, CredentialLookup, CredentialSource};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory, GEMINI_API_KEY_ENV};

/// Why a model call produced no usable text.
///
/// Only [`RateLimited`](ProviderError::RateLimited) is retried; the reasoner
/// turns every other variant into a crash at the reasoning stage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    HttpError(String),

    #[error("rate limited (provider hint: {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("unreadable provider response: {0}")]
    ParseError(String),

    #[error("credentials rejected")]
    AuthError,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("provider unavailable: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Per-call model settings, derived from `reasoner:` in the pipeline config.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Request a JSON-only response where the provider has such a mode
    pub json_output: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
            json_output: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// A previous model reply, replayed in a repair exchange.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Model the provider reports having used
    pub model: String,
    pub stop_reason: Option<String>,
}

/// Token counts, summed over every call of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
    }
}

/// A chat-completion backend.
///
/// The reasoner is the only caller. Nothing in `antigravity-core` reaches a
/// provider, and providers never see validation: they return text and the
/// reasoner decides what it is worth.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Cheap readiness check; no model call.
    async fn health_check(&self) -> bool;

    /// Recorded in audit records and stage details.
    fn name(&self) -> &str;

    /// Rough count for providers that report no usage, at four bytes a token.
    fn estimate_tokens(&self, text: &str) -> u32 {
        u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
    }
}
