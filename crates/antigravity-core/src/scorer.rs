//! Confidence and risk scoring.
//!
//! Risk bands use closed-open intervals, inclusive at the lower bound:
//!
//! | score        | band   |
//! |--------------|--------|
//! | [0.0, 0.3)   | GREEN  |
//! | [0.3, 0.6)   | YELLOW |
//! | [0.6, 1.0]   | RED    |
//!
//! The overall risk score is the maximum similarity across matches. A single
//! strong overlap dominates; no matches means score 0 and GREEN.

use crate::types::{
    ConfidenceLevel, PriorArtMatch, ProjectType, RiskAssessment, RiskBand, SimilarityLevel,
};

/// Lower bound of the YELLOW band.
pub const YELLOW_THRESHOLD: f64 = 0.3;

/// Lower bound of the RED band.
pub const RED_THRESHOLD: f64 = 0.6;

/// Sentence carried by every low-confidence scope disclaimer.
pub const HUMAN_REVIEW_NOTICE: &str =
    "Low confidence: qualified human review is required before relying on this result.";

/// Recommendation appended to low-confidence envelopes.
pub const HUMAN_REVIEW_RECOMMENDATION: &str =
    "Have a qualified reviewer examine the cited evidence before acting on this analysis.";

/// Map a similarity score to its band.
pub fn risk_band(score: f64) -> RiskBand {
    if score >= RED_THRESHOLD {
        RiskBand::Red
    } else if score >= YELLOW_THRESHOLD {
        RiskBand::Yellow
    } else {
        RiskBand::Green
    }
}

/// Map a similarity score to its level. Same cut points as [`risk_band`].
pub fn similarity_level(score: f64) -> SimilarityLevel {
    match risk_band(score) {
        RiskBand::Red => SimilarityLevel::High,
        RiskBand::Yellow => SimilarityLevel::Medium,
        RiskBand::Green => SimilarityLevel::Low,
    }
}

/// Derive the run's risk from its prior-art matches.
pub fn assess_risk(matches: &[PriorArtMatch]) -> RiskAssessment {
    let score = matches
        .iter()
        .map(|m| m.similarity_score)
        .filter(|s| !s.is_nan())
        .fold(0.0_f64, f64::max)
        .clamp(0.0, 1.0);

    RiskAssessment {
        band: risk_band(score),
        score,
    }
}

/// Thresholds for the confidence level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceThresholds {
    /// Certainty must exceed this for `high`
    pub high_certainty: f64,

    /// Certainty below this forces `low`
    pub low_certainty: f64,

    /// Fewer non-whitespace evidence characters than this forces `low`
    pub marginal_evidence_chars: usize,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high_certainty: 0.75,
            low_certainty: 0.4,
            marginal_evidence_chars: 120,
        }
    }
}

/// Everything the confidence level is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfidenceSignals {
    pub evidence_usable: bool,

    /// Non-whitespace characters across registered evidence
    pub evidence_chars: usize,

    /// Reasoner self-reported certainty; `None` when it answered UNKNOWN
    pub certainty: Option<f64>,

    /// Fields the reasoner answered UNKNOWN plus claims dropped for lack of evidence
    pub hedged_fields: usize,

    /// Unknowns the reasoner listed
    pub reported_unknowns: usize,
}

impl ConfidenceSignals {
    /// Numeric score reported in crash logs.
    pub fn score(&self) -> f64 {
        self.certainty.unwrap_or(0.0).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfidenceScorer {
    thresholds: ConfidenceThresholds,
}

impl ConfidenceScorer {
    pub fn new(thresholds: ConfidenceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ConfidenceThresholds {
        &self.thresholds
    }

    pub fn level(&self, signals: &ConfidenceSignals) -> ConfidenceLevel {
        let t = &self.thresholds;

        let marginal = signals.evidence_chars < t.marginal_evidence_chars;
        let hedged = signals.hedged_fields > 0 || signals.certainty.is_none();
        let uncertain = signals.certainty.map_or(true, |c| c < t.low_certainty);

        if !signals.evidence_usable || marginal || hedged || uncertain {
            return ConfidenceLevel::Low;
        }

        let certain = signals.certainty.map_or(false, |c| c > t.high_certainty);
        if certain && signals.reported_unknowns == 0 {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Medium
        }
    }
}

/// Scope disclaimer for an envelope of the given confidence.
///
/// Low confidence narrows the claimed scope and carries [`HUMAN_REVIEW_NOTICE`].
pub fn scope_disclaimer(level: ConfidenceLevel, project_type: ProjectType) -> String {
    let mut disclaimer = format!(
        "This analysis compares the submitted {} only against the evidence registered \
         for this run. It is not a legal opinion and does not determine patentability \
         or novelty.",
        project_type.work_label()
    );

    if level == ConfidenceLevel::Low {
        disclaimer.push(' ');
        disclaimer.push_str(HUMAN_REVIEW_NOTICE);
        disclaimer.push_str(
            " Claimed scope is limited to the individual overlaps listed with their evidence ids.",
        );
    }

    disclaimer
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn matched(score: f64) -> PriorArtMatch {
        PriorArtMatch {
            similarity_score: score,
            similarity: similarity_level(score),
            overlapping_concepts: BTreeSet::new(),
            differentiating_aspects: BTreeSet::new(),
            evidence_ids: ["EVD-20250101000000-RETRIEVED".to_string()].into(),
            description: String::new(),
        }
    }

    fn solid_signals() -> ConfidenceSignals {
        ConfidenceSignals {
            evidence_usable: true,
            evidence_chars: 500,
            certainty: Some(0.9),
            hedged_fields: 0,
            reported_unknowns: 0,
        }
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(risk_band(0.0), RiskBand::Green);
        assert_eq!(risk_band(0.29999), RiskBand::Green);
        assert_eq!(risk_band(0.3), RiskBand::Yellow);
        assert_eq!(risk_band(0.59999), RiskBand::Yellow);
        assert_eq!(risk_band(0.6), RiskBand::Red);
        assert_eq!(risk_band(1.0), RiskBand::Red);
    }

    #[test]
    fn test_similarity_level_follows_band_thresholds() {
        assert_eq!(similarity_level(0.0), SimilarityLevel::Low);
        assert_eq!(similarity_level(0.29999), SimilarityLevel::Low);
        assert_eq!(similarity_level(0.3), SimilarityLevel::Medium);
        assert_eq!(similarity_level(0.59999), SimilarityLevel::Medium);
        assert_eq!(similarity_level(0.6), SimilarityLevel::High);
        assert_eq!(similarity_level(1.0), SimilarityLevel::High);
    }

    #[test]
    fn test_max_score_dominates() {
        let risk = assess_risk(&[matched(0.1), matched(0.85), matched(0.35)]);
        assert_eq!(risk.score, 0.85);
        assert_eq!(risk.band, RiskBand::Red);
    }

    #[test]
    fn test_no_matches_is_green() {
        let risk = assess_risk(&[]);
        assert_eq!(risk.score, 0.0);
        assert_eq!(risk.band, RiskBand::Green);
    }

    #[test]
    fn test_high_confidence() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.level(&solid_signals()), ConfidenceLevel::High);
    }

    #[test]
    fn test_reported_unknowns_cap_at_medium() {
        let scorer = ConfidenceScorer::default();
        let signals = ConfidenceSignals {
            reported_unknowns: 1,
            ..solid_signals()
        };
        assert_eq!(scorer.level(&signals), ConfidenceLevel::Medium);
    }

    #[test]
    fn test_low_confidence_triggers() {
        let scorer = ConfidenceScorer::default();
        let cases = [
            ConfidenceSignals {
                evidence_usable: false,
                ..solid_signals()
            },
            ConfidenceSignals {
                evidence_chars: 119,
                ..solid_signals()
            },
            ConfidenceSignals {
                certainty: None,
                ..solid_signals()
            },
            ConfidenceSignals {
                hedged_fields: 1,
                ..solid_signals()
            },
            ConfidenceSignals {
                certainty: Some(0.39),
                ..solid_signals()
            },
        ];
        for signals in cases {
            assert_eq!(scorer.level(&signals), ConfidenceLevel::Low, "{:?}", signals);
        }
    }

    #[test]
    fn test_middle_certainty_is_medium() {
        let scorer = ConfidenceScorer::default();
        let signals = ConfidenceSignals {
            certainty: Some(0.75),
            ..solid_signals()
        };
        assert_eq!(scorer.level(&signals), ConfidenceLevel::Medium);
    }

    #[test]
    fn test_low_disclaimer_carries_notice() {
        let low = scope_disclaimer(ConfidenceLevel::Low, ProjectType::Patent);
        assert!(low.contains(HUMAN_REVIEW_NOTICE));
        assert!(low.contains("patent claim"));

        let medium = scope_disclaimer(ConfidenceLevel::Medium, ProjectType::Research);
        assert!(!medium.contains(HUMAN_REVIEW_NOTICE));
    }
}
