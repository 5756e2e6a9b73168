//! Gate before emission.
//!
//! An envelope leaves the pipeline only if every mandatory field is
//! populated with real content, it matches the envelope schema, and every
//! evidence id it mentions was registered in the same run. References must
//! also carry the source and timestamp the registry holds for their id.

use thiserror::Error;

use crate::crash::{ErrorType, RecommendedAction};
use crate::evidence::EvidenceRegistry;
use crate::scorer::HUMAN_REVIEW_NOTICE;
use crate::stage::StageFailure;
use crate::types::{ConfidenceLevel, ObservedOverlap, SuccessEnvelope};
use crate::validation::schema::validate_envelope_schema;

/// Values that stand in for content without being content.
pub const PLACEHOLDER_TOKENS: &[&str] = &["UNKNOWN", "N/A", "TBD", "TODO", "PLACEHOLDER"];

/// Whether a string is empty, whitespace or a placeholder token.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || PLACEHOLDER_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Ways an envelope can fail the output gate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutputViolation {
    #[error("Field '{field}' is missing or holds a placeholder")]
    Placeholder { field: String },

    #[error("Field '{field}' must not be empty")]
    EmptyList { field: &'static str },

    #[error("Envelope does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Envelope could not be serialized: {0}")]
    Serialization(String),

    #[error("Evidence id '{id}' in {location} is not registered in this run")]
    UnregisteredEvidence { id: String, location: &'static str },

    #[error("Evidence reference '{id}' does not match the registered item")]
    AlteredReference { id: String },

    #[error("Overlapping aspects differ from the concepts of the prior-art matches")]
    AspectsMismatch,

    #[error("Low-confidence envelope does not carry the human review notice")]
    MissingReviewNotice,
}

impl From<OutputViolation> for StageFailure {
    fn from(violation: OutputViolation) -> Self {
        StageFailure::new(
            ErrorType::SchemaViolation,
            violation.to_string(),
            RecommendedAction::SystemDebug,
        )
    }
}

/// Checks envelopes against the registry of the run that produced them.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputValidator;

impl OutputValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate an envelope. The first violation found is returned.
    pub fn validate(
        &self,
        envelope: &SuccessEnvelope,
        registry: &EvidenceRegistry,
    ) -> Result<(), OutputViolation> {
        self.check_populated(envelope)?;

        let value = serde_json::to_value(envelope)
            .map_err(|e| OutputViolation::Serialization(e.to_string()))?;
        validate_envelope_schema(&value).map_err(OutputViolation::Schema)?;

        for reference in &envelope.evidence_references {
            match registry.resolve(&reference.evidence_id) {
                None => {
                    return Err(OutputViolation::UnregisteredEvidence {
                        id: reference.evidence_id.clone(),
                        location: "evidence_references",
                    })
                }
                Some(item) if item.reference() != *reference => {
                    return Err(OutputViolation::AlteredReference {
                        id: reference.evidence_id.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        if let Some(id) = envelope
            .observed_overlap
            .cited_evidence_ids()
            .into_iter()
            .find(|id| !registry.contains(id))
        {
            return Err(OutputViolation::UnregisteredEvidence {
                id: id.to_string(),
                location: "observed_overlap",
            });
        }

        let observed = &envelope.observed_overlap;
        if observed.overlapping_aspects
            != ObservedOverlap::overlapping_aspects_of(&observed.prior_art_matches)
        {
            return Err(OutputViolation::AspectsMismatch);
        }

        if envelope.confidence == ConfidenceLevel::Low
            && !envelope.scope_disclaimer.contains(HUMAN_REVIEW_NOTICE)
        {
            return Err(OutputViolation::MissingReviewNotice);
        }

        Ok(())
    }

    fn check_populated(&self, envelope: &SuccessEnvelope) -> Result<(), OutputViolation> {
        if envelope.evidence_references.is_empty() {
            return Err(OutputViolation::EmptyList {
                field: "evidence_references",
            });
        }
        if envelope.unknowns.is_empty() {
            return Err(OutputViolation::EmptyList { field: "unknowns" });
        }

        let mut texts: Vec<(String, &str)> = vec![
            ("scope_disclaimer".into(), envelope.scope_disclaimer.as_str()),
            (
                "observed_overlap.summary".into(),
                envelope.observed_overlap.summary.as_str(),
            ),
            (
                "inferred_risk.basis".into(),
                envelope.inferred_risk.basis.as_str(),
            ),
        ];
        texts.extend(
            envelope
                .unknowns
                .iter()
                .enumerate()
                .map(|(i, u)| (format!("unknowns[{}]", i), u.as_str())),
        );
        texts.extend(
            envelope
                .inferred_risk
                .recommendations
                .iter()
                .enumerate()
                .map(|(i, r)| (format!("inferred_risk.recommendations[{}]", i), r.as_str())),
        );
        texts.extend(
            envelope
                .observed_overlap
                .novel_aspects
                .iter()
                .enumerate()
                .map(|(i, a)| (format!("observed_overlap.novel_aspects[{}].claim", i), a.claim.as_str())),
        );

        match texts.into_iter().find(|(_, value)| is_placeholder(value)) {
            Some((field, _)) => Err(OutputViolation::Placeholder { field }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        EvidenceSource, InferredRisk, NovelAspect, PriorArtMatch, RiskBand, SimilarityLevel,
    };
    use chrono::{TimeZone, Utc};

    fn registry() -> EvidenceRegistry {
        let mut registry =
            EvidenceRegistry::starting_at(Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap());
        registry
            .register(EvidenceSource::UserInput, "A graphene anode for fast charging.")
            .unwrap();
        registry
            .register(EvidenceSource::Retrieved, "Prior graphene anode paper.")
            .unwrap();
        registry
    }

    fn envelope(registry: &EvidenceRegistry) -> SuccessEnvelope {
        SuccessEnvelope {
            evidence_references: registry.items().iter().map(|i| i.reference()).collect(),
            confidence: ConfidenceLevel::Medium,
            scope_disclaimer: "Compared against registered evidence only.".into(),
            observed_overlap: ObservedOverlap {
                summary: "The anode chemistry overlaps with one paper.".into(),
                prior_art_matches: vec![PriorArtMatch {
                    similarity_score: 0.5,
                    similarity: SimilarityLevel::Medium,
                    overlapping_concepts: ["graphene anode".to_string()].into(),
                    differentiating_aspects: Default::default(),
                    evidence_ids: ["EVD-20250314092653-RETRIEVED".to_string()].into(),
                    description: String::new(),
                }],
                overlapping_aspects: ["graphene anode".to_string()].into(),
                novel_aspects: vec![NovelAspect {
                    claim: "Charging profile is not described in the paper.".into(),
                    evidence_ids: ["EVD-20250314092653-INPUT".to_string()].into(),
                }],
                candidate_overlaps: vec![],
            },
            inferred_risk: InferredRisk {
                band: RiskBand::Yellow,
                score: 0.5,
                basis: "Maximum similarity across matches.".into(),
                recommendations: vec![],
            },
            unknowns: vec!["Unpublished work is not covered.".into()],
        }
    }

    #[test]
    fn test_valid_envelope_passes() {
        let registry = registry();
        let validator = OutputValidator::new();
        assert_eq!(validator.validate(&envelope(&registry), &registry), Ok(()));
    }

    #[test]
    fn test_placeholders() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("  unknown "));
        assert!(is_placeholder("n/a"));
        assert!(is_placeholder("Placeholder"));
        assert!(!is_placeholder("Unknown prior art in adjacent fields"));
    }

    #[test]
    fn test_placeholder_summary_rejected() {
        let registry = registry();
        let mut env = envelope(&registry);
        env.observed_overlap.summary = "TBD".into();
        assert!(matches!(
            OutputValidator::new().validate(&env, &registry),
            Err(OutputViolation::Placeholder { field }) if field == "observed_overlap.summary"
        ));
    }

    #[test]
    fn test_empty_unknowns_rejected() {
        let registry = registry();
        let mut env = envelope(&registry);
        env.unknowns.clear();
        assert_eq!(
            OutputValidator::new().validate(&env, &registry),
            Err(OutputViolation::EmptyList { field: "unknowns" })
        );
    }

    #[test]
    fn test_unregistered_reference_rejected() {
        let registry = registry();
        let mut env = envelope(&registry);
        env.evidence_references[0].evidence_id = "EVD-20250314092653-EXTERNAL".into();

        let violation = OutputValidator::new().validate(&env, &registry).unwrap_err();
        assert!(matches!(
            violation,
            OutputViolation::UnregisteredEvidence {
                location: "evidence_references",
                ..
            }
        ));

        let failure: StageFailure = violation.into();
        assert_eq!(failure.error_type, ErrorType::SchemaViolation);
    }

    #[test]
    fn test_altered_reference_rejected() {
        let registry = registry();

        let mut retimed = envelope(&registry);
        retimed.evidence_references[1].timestamp =
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            OutputValidator::new().validate(&retimed, &registry),
            Err(OutputViolation::AlteredReference {
                id: "EVD-20250314092653-RETRIEVED".into()
            })
        );

        let mut relabelled = envelope(&registry);
        relabelled.evidence_references[0].source = EvidenceSource::External;
        assert!(matches!(
            OutputValidator::new().validate(&relabelled, &registry),
            Err(OutputViolation::AlteredReference { id }) if id == "EVD-20250314092653-INPUT"
        ));
    }

    #[test]
    fn test_overlapping_aspects_must_match_prior_art() {
        let registry = registry();
        let mut env = envelope(&registry);
        env.observed_overlap
            .overlapping_aspects
            .insert("cathode".to_string());
        assert_eq!(
            OutputValidator::new().validate(&env, &registry),
            Err(OutputViolation::AspectsMismatch)
        );

        env.observed_overlap.overlapping_aspects.clear();
        assert_eq!(
            OutputValidator::new().validate(&env, &registry),
            Err(OutputViolation::AspectsMismatch)
        );
    }

    #[test]
    fn test_unregistered_citation_in_overlap_rejected() {
        let registry = registry();
        let mut env = envelope(&registry);
        env.observed_overlap.prior_art_matches[0].evidence_ids =
            ["EVD-20250314092653-RETRIEVED-7".to_string()].into();
        assert!(matches!(
            OutputValidator::new().validate(&env, &registry),
            Err(OutputViolation::UnregisteredEvidence {
                location: "observed_overlap",
                ..
            })
        ));
    }

    #[test]
    fn test_low_confidence_requires_notice() {
        let registry = registry();
        let mut env = envelope(&registry);
        env.confidence = ConfidenceLevel::Low;
        assert_eq!(
            OutputValidator::new().validate(&env, &registry),
            Err(OutputViolation::MissingReviewNotice)
        );

        env.scope_disclaimer = format!("Registered evidence only. {}", HUMAN_REVIEW_NOTICE);
        assert_eq!(OutputValidator::new().validate(&env, &registry), Ok(()));
    }
}
