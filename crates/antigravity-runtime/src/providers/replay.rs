//! Replay provider: returns recorded responses in order.
//!
//! Used for offline runs, demos and reproducing a recorded session. Each
//! `complete` call consumes the next step; an exhausted script reports
//! `NotConfigured`.
//!
//! Evidence ids carry the run start time, so a recording cannot know them in
//! advance. Responses may write `EVD-{run}-RETRIEVED`; `{run}` is replaced
//! with the timestamp of the ids found in the prompt.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value as JsonValue;

use super::{
    factory::ProviderFactory, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, Role, TokenUsage,
};

/// Stands in for the run timestamp inside recorded evidence ids.
pub const RUN_STAMP_PLACEHOLDER: &str = "{run}";

lazy_static! {
    static ref RUN_STAMP: Regex =
        Regex::new(r"EVD-([0-9]{14})-").unwrap();
}

/// Timestamp of the first evidence id outside the system prompt.
fn run_stamp(messages: &[ChatMessage]) -> Option<&str> {
    messages.iter().filter(|m| m.role != Role::System).find_map(|m| {
        RUN_STAMP
            .captures(&m.content)
            .and_then(|c| c.get(1))
            .map(|s| s.as_str())
    })
}

/// One scripted provider reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayStep {
    /// Return this text as the completion
    Response(String),

    /// Report a rate limit
    RateLimited,

    /// Fail with this error
    Error(ProviderError),
}

pub struct ReplayProvider {
    steps: Mutex<VecDeque<ReplayStep>>,
}

impl ReplayProvider {
    pub fn new(steps: impl IntoIterator<Item = ReplayStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
        }
    }

    /// Script made only of successful responses.
    pub fn from_responses(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(
            responses
                .into_iter()
                .map(|r| ReplayStep::Response(r.into())),
        )
    }

    /// Load a JSON file holding an array of response strings or JSON objects.
    ///
    /// Objects are re-serialized, so a recording can store the model output
    /// either as a string or inline.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::NotConfigured(format!(
                "cannot read replay file {}: {}",
                path.display(),
                e
            ))
        })?;
        let value: JsonValue =
            serde_json::from_str(&raw).map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Self::from_json(&value)
    }

    fn from_json(value: &JsonValue) -> Result<Self, ProviderError> {
        let entries = value.as_array().ok_or_else(|| {
            ProviderError::NotConfigured("replay responses must be a JSON array".to_string())
        })?;

        let responses = entries.iter().map(|entry| match entry {
            JsonValue::String(text) => text.clone(),
            other => other.to_string(),
        });
        Ok(Self::from_responses(responses))
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().len()
    }
}

impl std::fmt::Debug for ReplayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayProvider")
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[async_trait]
impl LlmProvider for ReplayProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let step = self.steps.lock().pop_front();
        match step {
            Some(ReplayStep::Response(content)) => {
                let content = match run_stamp(&messages) {
                    Some(stamp) => content.replace(RUN_STAMP_PLACEHOLDER, stamp),
                    None => content,
                };
                let prompt_tokens = messages
                    .iter()
                    .map(|m| self.estimate_tokens(&m.content))
                    .sum();
                let completion_tokens = self.estimate_tokens(&content);
                Ok(CompletionResponse {
                    content,
                    usage: TokenUsage {
                        prompt_tokens,
                        completion_tokens,
                    },
                    model: config.model.clone(),
                    stop_reason: Some("replay".to_string()),
                })
            }
            Some(ReplayStep::RateLimited) => Err(ProviderError::RateLimited { retry_after: None }),
            Some(ReplayStep::Error(err)) => Err(err),
            None => Err(ProviderError::NotConfigured(
                "replay script exhausted".to_string(),
            )),
        }
    }

    async fn health_check(&self) -> bool {
        self.remaining() > 0
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// `kind: replay`. Options: either `path` to a recording, or an inline
/// `responses` array whose object entries are serialized back to JSON text.
pub struct ReplayProviderFactory;

impl ProviderFactory for ReplayProviderFactory {
    fn kind(&self) -> &'static str {
        "replay"
    }

    fn summary(&self) -> &'static str {
        "Replays recorded reasoner responses in order, offline"
    }

    fn check(&self, options: &JsonValue) -> Result<(), ProviderError> {
        if options["path"].is_string() || options["responses"].is_array() {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "replay provider needs 'path' or a 'responses' array".to_string(),
            ))
        }
    }

    fn build(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider = match options["path"].as_str() {
            Some(path) => ReplayProvider::from_file(path)?,
            None => ReplayProvider::from_json(&options["responses"])?,
        };
        Ok(Arc::new(provider))
    }
}
