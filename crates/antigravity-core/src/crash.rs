//! Crash logs and the two-shaped pipeline output.
//!
//! A crash log is a first-class result, not an error. Every run that
//! completes produces exactly one [`PipelineOutput`]: a full success
//! envelope or a crash log, never both.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evidence::EvidenceState;
use crate::stage::Stage;
use crate::types::SuccessEnvelope;

/// Failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    InputError,
    EvidenceMissing,
    SchemaViolation,
    LowConfidence,
    InternalInconsistency,
    UnknownFailure,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::InputError => "INPUT_ERROR",
            ErrorType::EvidenceMissing => "EVIDENCE_MISSING",
            ErrorType::SchemaViolation => "SCHEMA_VIOLATION",
            ErrorType::LowConfidence => "LOW_CONFIDENCE",
            ErrorType::InternalInconsistency => "INTERNAL_INCONSISTENCY",
            ErrorType::UnknownFailure => "UNKNOWN_FAILURE",
        }
    }

    /// Action recommended when nothing more specific is known.
    pub fn default_action(&self) -> RecommendedAction {
        match self {
            ErrorType::InputError => RecommendedAction::AdjustInput,
            ErrorType::EvidenceMissing => RecommendedAction::RetryWithMoreEvidence,
            ErrorType::LowConfidence => RecommendedAction::HumanReview,
            ErrorType::SchemaViolation
            | ErrorType::InternalInconsistency
            | ErrorType::UnknownFailure => RecommendedAction::SystemDebug,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    RetryWithMoreEvidence,
    AdjustInput,
    HumanReview,
    SystemDebug,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::RetryWithMoreEvidence => "retry_with_more_evidence",
            RecommendedAction::AdjustInput => "adjust_input",
            RecommendedAction::HumanReview => "human_review",
            RecommendedAction::SystemDebug => "system_debug",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal `"CRASH"` status marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrashStatus {
    #[serde(rename = "CRASH")]
    Crash,
}

/// Structured diagnostic emitted instead of a success envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrashLog {
    pub status: CrashStatus,
    pub error_type: ErrorType,
    pub error_message: String,
    pub failed_stage: Stage,
    pub evidence_state: EvidenceState,

    /// Confidence at the time of failure, 0.00 to 1.00 with two decimals
    pub confidence_score: f64,

    pub recommended_action: RecommendedAction,

    /// One entry per stage attempted
    pub debug_trace: Vec<String>,
}

impl CrashLog {
    pub fn new(
        error_type: ErrorType,
        error_message: impl Into<String>,
        failed_stage: Stage,
        evidence_state: EvidenceState,
        confidence_score: f64,
        recommended_action: RecommendedAction,
        debug_trace: Vec<String>,
    ) -> Self {
        Self {
            status: CrashStatus::Crash,
            error_type,
            error_message: error_message.into(),
            failed_stage,
            evidence_state,
            confidence_score: round_score(confidence_score),
            recommended_action,
            debug_trace,
        }
    }
}

/// Clamp to [0, 1] and round to two decimals. NaN becomes 0.
fn round_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// The two mutually exclusive shapes a completed run can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineOutput {
    Crash(CrashLog),
    Success(SuccessEnvelope),
}

impl PipelineOutput {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutput::Success(_))
    }

    pub fn as_success(&self) -> Option<&SuccessEnvelope> {
        match self {
            PipelineOutput::Success(envelope) => Some(envelope),
            PipelineOutput::Crash(_) => None,
        }
    }

    pub fn as_crash(&self) -> Option<&CrashLog> {
        match self {
            PipelineOutput::Crash(crash) => Some(crash),
            PipelineOutput::Success(_) => None,
        }
    }

    /// Short outcome label used in logs and audit records.
    pub fn outcome(&self) -> &'static str {
        match self {
            PipelineOutput::Success(_) => "SUCCESS",
            PipelineOutput::Crash(_) => "CRASH",
        }
    }
}
