//! The six-stage linear state machine.
//!
//! ```text
//! input_validation -> retrieval -> similarity -> reasoning
//!     -> verification -> output_generation -> SUCCESS
//!
//! any stage failure -> CRASH (failed_stage = that stage)
//! ```
//!
//! Stages advance only on explicit success, are never re-entered, and both
//! terminal states absorb. Each attempted stage leaves exactly one entry in
//! the trace.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crash::{CrashLog, ErrorType, RecommendedAction};
use crate::evidence::EvidenceState;

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InputValidation,
    Retrieval,
    Similarity,
    Reasoning,
    Verification,
    OutputGeneration,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::InputValidation,
        Stage::Retrieval,
        Stage::Similarity,
        Stage::Reasoning,
        Stage::Verification,
        Stage::OutputGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::InputValidation => "input_validation",
            Stage::Retrieval => "retrieval",
            Stage::Similarity => "similarity",
            Stage::Reasoning => "reasoning",
            Stage::Verification => "verification",
            Stage::OutputGeneration => "output_generation",
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<Stage> {
        let position = Stage::ALL.iter().position(|s| s == self)?;
        Stage::ALL.get(position + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub error_type: ErrorType,
    pub message: String,
    pub recommended_action: RecommendedAction,

    /// Confidence known at the time of failure, if any
    pub confidence_score: Option<f64>,
}

impl StageFailure {
    pub fn new(
        error_type: ErrorType,
        message: impl Into<String>,
        recommended_action: RecommendedAction,
    ) -> Self {
        Self {
            error_type,
            message: message.into(),
            recommended_action,
            confidence_score: None,
        }
    }

    /// Failure with the default action for its error type.
    pub fn of(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::new(error_type, message, error_type.default_action())
    }

    pub fn with_confidence(mut self, score: f64) -> Self {
        self.confidence_score = Some(score);
        self
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// Result of running one stage.
pub type StageOutcome<T> = Result<T, StageFailure>;

/// Where a run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running(Stage),
    Succeeded,
    Crashed(Stage),
}

/// Threads stage outcomes through the fixed stage order.
#[derive(Debug, Clone)]
pub struct StageMachine {
    state: RunState,
    trace: Vec<String>,
}

impl StageMachine {
    /// A fresh machine. The initial state is always `input_validation`.
    pub fn new() -> Self {
        Self {
            state: RunState::Running(Stage::InputValidation),
            trace: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The stage currently awaiting an outcome.
    pub fn current(&self) -> Option<Stage> {
        match self.state {
            RunState::Running(stage) => Some(stage),
            _ => None,
        }
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Record the outcome of the current stage and transition.
    ///
    /// `describe` renders a short trace note for a successful outcome.
    /// Advancing a terminal machine is itself an internal inconsistency and
    /// leaves the machine untouched.
    pub fn advance<T>(
        &mut self,
        outcome: StageOutcome<T>,
        describe: impl FnOnce(&T) -> String,
    ) -> StageOutcome<T> {
        let stage = match self.state {
            RunState::Running(stage) => stage,
            terminal => {
                return Err(StageFailure::of(
                    ErrorType::InternalInconsistency,
                    format!("stage outcome recorded after terminal state {:?}", terminal),
                ));
            }
        };

        match outcome {
            Ok(value) => {
                self.trace
                    .push(format!("{}: passed - {}", stage, describe(&value)));
                self.state = match stage.next() {
                    Some(next) => RunState::Running(next),
                    None => RunState::Succeeded,
                };
                tracing::debug!(stage = %stage, "Stage passed");
                Ok(value)
            }
            Err(failure) => {
                self.trace.push(format!("{}: failed - {}", stage, failure));
                self.state = RunState::Crashed(stage);
                tracing::warn!(
                    stage = %stage,
                    error_type = %failure.error_type,
                    "Stage failed"
                );
                Err(failure)
            }
        }
    }

    /// Like [`advance`](Self::advance), but a failure closes the run with
    /// its crash log.
    ///
    /// The log carries the whole trace. Its failed stage is the one the
    /// machine crashed in, or the one it had reached when the outcome was
    /// refused.
    pub fn settle<T>(
        &mut self,
        outcome: StageOutcome<T>,
        describe: impl FnOnce(&T) -> String,
        evidence_state: EvidenceState,
    ) -> Result<T, CrashLog> {
        self.advance(outcome, describe).map_err(|failure| {
            let failed_stage = match self.state {
                RunState::Running(stage) | RunState::Crashed(stage) => stage,
                RunState::Succeeded => Stage::OutputGeneration,
            };
            CrashLog::new(
                failure.error_type,
                failure.message,
                failed_stage,
                evidence_state,
                failure.confidence_score.unwrap_or(0.0),
                failure.recommended_action,
                self.trace.clone(),
            )
        })
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}
