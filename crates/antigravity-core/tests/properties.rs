//! Property tests for the deterministic pieces.

use antigravity_core::{
    assess_risk, risk_band, similarity_level, DeterministicAnalyzer, EvidenceRegistry,
    EvidenceSource, PriorArtMatch, RiskBand, SimilarityLevel,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use regex::Regex;

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[A-Z][a-z]{2,8}",
            "[a-z]{2,8}",
            "[A-Z]{2,5}",
            "[a-z]{2,6}-[a-z]{2,6}",
            Just(".".to_string()),
        ],
        1..40,
    )
    .prop_map(|words| words.join(" "))
}

fn matched(score: f64) -> PriorArtMatch {
    PriorArtMatch {
        similarity_score: score,
        similarity: similarity_level(score),
        overlapping_concepts: Default::default(),
        differentiating_aspects: Default::default(),
        evidence_ids: ["EVD-20250101000000-RETRIEVED".to_string()].into(),
        description: String::new(),
    }
}

/// Occurrences of `term` found by a standalone whole-word regex.
fn whole_word_count(term: &str, text: &str) -> usize {
    let body = term
        .split(' ')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let acronym = term.chars().any(|c| c.is_ascii_uppercase()) && !term.chars().any(char::is_lowercase);
    let pattern = if acronym {
        format!(r"\b{}\b", body)
    } else {
        format!(r"(?i)\b{}\b", body)
    };
    Regex::new(&pattern).unwrap().find_iter(text).count()
}

proptest! {
    #[test]
    fn analysis_is_byte_identical(title in "[A-Z][a-z]{3,10}", text in document()) {
        let analyzer = DeterministicAnalyzer::default();
        let first = serde_json::to_string(&analyzer.analyze(Some(&title), &text).unwrap()).unwrap();
        let second = serde_json::to_string(&analyzer.analyze(Some(&title), &text).unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn weights_are_normalized(text in document()) {
        prop_assume!(!text.trim().is_empty());
        let set = DeterministicAnalyzer::default().analyze(None, &text).unwrap();
        for (_, concept) in set.iter() {
            prop_assert!((0.0..=1.0).contains(&concept.weight));
            prop_assert!(concept.frequency >= 1);
        }
        if !set.is_empty() {
            prop_assert!(set.iter().any(|(_, c)| c.weight == 1.0));
        }
    }

    #[test]
    fn frequency_matches_whole_word_search(title in "[A-Z][a-z]{3,10}", text in document()) {
        let analyzed = format!("{}\n{}", title, text);
        let set = DeterministicAnalyzer::default().analyze(Some(&title), &text).unwrap();
        for (term, concept) in set.iter() {
            prop_assert_eq!(concept.frequency as usize, whole_word_count(term, &analyzed), "{}", term);
            prop_assert!(!concept.context.is_empty());
        }
    }

    #[test]
    fn similarity_level_tracks_band(score in 0.0f64..=1.0) {
        let expected = match risk_band(score) {
            RiskBand::Red => SimilarityLevel::High,
            RiskBand::Yellow => SimilarityLevel::Medium,
            RiskBand::Green => SimilarityLevel::Low,
        };
        prop_assert_eq!(similarity_level(score), expected);
    }

    #[test]
    fn band_follows_thresholds(score in 0.0f64..=1.0) {
        let band = risk_band(score);
        let expected = if score >= 0.6 {
            RiskBand::Red
        } else if score >= 0.3 {
            RiskBand::Yellow
        } else {
            RiskBand::Green
        };
        prop_assert_eq!(band, expected);
    }

    #[test]
    fn risk_is_maximum_score(scores in prop::collection::vec(0.0f64..=1.0, 0..8)) {
        let matches: Vec<PriorArtMatch> = scores.iter().copied().map(matched).collect();
        let risk = assess_risk(&matches);
        let expected = scores.iter().copied().fold(0.0_f64, f64::max);
        prop_assert_eq!(risk.score, expected);
        prop_assert_eq!(risk.band, risk_band(expected));
    }

    #[test]
    fn evidence_ids_are_unique(texts in prop::collection::vec("[a-z ]{0,12}", 1..12)) {
        let mut registry =
            EvidenceRegistry::starting_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let mut ids = std::collections::BTreeSet::new();
        for (i, text) in texts.iter().enumerate() {
            let source = if i % 2 == 0 { EvidenceSource::Retrieved } else { EvidenceSource::External };
            let id = registry.register(source, text.clone()).unwrap().id().to_string();
            ids.insert(id);
        }
        prop_assert_eq!(ids.len(), registry.len());
    }
}

#[test]
fn band_boundaries() {
    assert_eq!(risk_band(0.3), RiskBand::Yellow);
    assert_eq!(risk_band(0.29999), RiskBand::Green);
    assert_eq!(risk_band(0.6), RiskBand::Red);
    assert_eq!(risk_band(0.59999), RiskBand::Yellow);
}
