//! # antigravity-core
//!
//! Deterministic building blocks of the evidence-locked analysis pipeline.
//!
//! This crate answers, without ever calling a model:
//! - What evidence does this run hold, and under which ids?
//! - Is the request well formed?
//! - Which concept terms does the document carry?
//! - Does a finished envelope cite only registered evidence?
//! - Which risk band and confidence level do the numbers map to?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same input, byte-identical concept set
//! 2. **No LLM calls**: the reasoner lives in `antigravity-runtime`
//! 3. **Evidence-locked**: every id in an envelope resolves in its own registry
//! 4. **Fail-closed**: a run ends in a full envelope or a full [`CrashLog`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use antigravity_core::{DeterministicAnalyzer, EvidenceRegistry, EvidenceSource};
//!
//! let mut registry = EvidenceRegistry::new();
//! registry.register(EvidenceSource::UserInput, "A graphene anode for fast charging.")?;
//!
//! let concepts = DeterministicAnalyzer::default()
//!     .analyze(Some("Graphene Anode"), "A graphene anode for fast charging.")?;
//! let overlaps = DeterministicAnalyzer::default().candidate_overlaps(&concepts, &registry);
//! ```

pub mod analyzer;
pub mod crash;
pub mod evidence;
pub mod scorer;
pub mod stage;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use analyzer::{AnalyzerConfig, AnalyzerError, DeterministicAnalyzer, TokenIndex};
pub use crash::{CrashLog, CrashStatus, ErrorType, PipelineOutput, RecommendedAction};
pub use evidence::{EvidenceRegistry, EvidenceState, RegistryError, EVIDENCE_ID_PREFIX};
pub use scorer::{
    assess_risk, risk_band, scope_disclaimer, similarity_level, ConfidenceScorer, ConfidenceSignals,
    ConfidenceThresholds, HUMAN_REVIEW_NOTICE, HUMAN_REVIEW_RECOMMENDATION,
};
pub use stage::{RunState, Stage, StageFailure, StageMachine, StageOutcome};
pub use types::{
    AnalysisRequest, CandidateOverlap, ClaimComparison, ClaimsComparison, Concept,
    ConceptCategory, ConceptSet, ConfidenceLevel, EvidenceItem, EvidenceReference,
    EvidenceSource, InferredRisk, NovelAspect, ObservedOverlap, PriorArtMatch, ProjectType,
    RawAnalysisRequest, RiskAssessment, RiskBand, SimilarityLevel, SuccessEnvelope,
};
pub use validation::{InputError, InputValidator, OutputValidator, OutputViolation};
