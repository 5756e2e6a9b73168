//! Structural and semantic gate on incoming requests.

use thiserror::Error;

use crate::crash::{ErrorType, RecommendedAction};
use crate::stage::StageFailure;
use crate::types::{AnalysisRequest, ProjectType, RawAnalysisRequest};

/// Default upper bound on request text, in characters.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 50_000;

/// Default upper bound on titles, in characters.
pub const DEFAULT_MAX_TITLE_CHARS: usize = 200;

/// Reasons a request is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Request text is missing")]
    MissingText,

    #[error("Request text is empty")]
    EmptyText,

    #[error("Request text is {chars} characters; the limit is {max}")]
    TextTooLong { chars: usize, max: usize },

    #[error("project_type is missing")]
    MissingProjectType,

    #[error("project_type '{0}' is not one of: research, patent")]
    InvalidProjectType(String),

    #[error("Title is present but empty")]
    EmptyTitle,

    #[error("Title is {chars} characters; the limit is {max}")]
    TitleTooLong { chars: usize, max: usize },
}

impl From<InputError> for StageFailure {
    fn from(err: InputError) -> Self {
        StageFailure::new(
            ErrorType::InputError,
            err.to_string(),
            RecommendedAction::AdjustInput,
        )
    }
}

/// Validates raw requests into [`AnalysisRequest`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputValidator {
    max_text_chars: usize,
    max_title_chars: usize,
}

impl InputValidator {
    pub fn new(max_text_chars: usize, max_title_chars: usize) -> Self {
        Self {
            max_text_chars,
            max_title_chars,
        }
    }

    /// Check a raw request. Missing required fields are errors, never defaults.
    pub fn validate(&self, raw: &RawAnalysisRequest) -> Result<AnalysisRequest, InputError> {
        let text = raw.text.as_deref().ok_or(InputError::MissingText)?;
        if text.trim().is_empty() {
            return Err(InputError::EmptyText);
        }
        let chars = text.chars().count();
        if chars > self.max_text_chars {
            return Err(InputError::TextTooLong {
                chars,
                max: self.max_text_chars,
            });
        }

        let token = raw
            .project_type
            .as_deref()
            .ok_or(InputError::MissingProjectType)?;
        let project_type = ProjectType::parse(token.trim())
            .ok_or_else(|| InputError::InvalidProjectType(token.to_string()))?;

        let title = match raw.title.as_deref() {
            None => None,
            Some(t) if t.trim().is_empty() => return Err(InputError::EmptyTitle),
            Some(t) => {
                let trimmed = t.trim();
                let chars = trimmed.chars().count();
                if chars > self.max_title_chars {
                    return Err(InputError::TitleTooLong {
                        chars,
                        max: self.max_title_chars,
                    });
                }
                Some(trimmed.to_string())
            }
        };

        Ok(AnalysisRequest::new(text.to_string(), title, project_type))
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TEXT_CHARS, DEFAULT_MAX_TITLE_CHARS)
    }
}
