//! Deterministic, model-free concept analysis.
//!
//! A pure function of `(title, text)`:
//!
//! 1. Candidate terms come from three patterns: hyphenated compounds,
//!    acronyms and capitalized words or phrases. Earlier patterns claim their
//!    spans so a compound is not also counted as its capitalized head.
//! 2. Weight is `frequency x position_boost`, normalized by the heaviest
//!    term and rounded to 3 decimals. The boost applies when a term first
//!    occurs in the opening fraction of the analyzed text; the title is
//!    prepended, so title terms are always boosted.
//! 3. Category is a fixed lexical heuristic: domain vocabulary is
//!    `common_domain`, process words are `methodological`, everything else is
//!    `differentiating`.
//!
//! Output lives in ordered maps, so serializing the same input twice gives
//! byte-identical JSON.
//!
//! Each text is tokenized once into a [`TokenIndex`]; term frequency, first
//! position and evidence overlap are all lookups in that index.

pub mod patterns;
pub mod tokens;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use thiserror::Error;

use crate::crash::{ErrorType, RecommendedAction};
use crate::evidence::EvidenceRegistry;
use crate::scorer::similarity_level;
use crate::stage::StageFailure;
use crate::types::{
    AnalysisRequest, CandidateOverlap, ClaimComparison, ClaimsComparison, Concept,
    ConceptCategory, ConceptSet, EvidenceItem, EvidenceSource,
};
use patterns::{
    is_domain_stopword, is_methodological_word, is_stopword, ACRONYM_PATTERN,
    CAPITALIZED_PATTERN, HYPHENATED_PATTERN, METHODOLOGICAL_KEYWORDS,
};
pub use tokens::TokenIndex;

/// Errors from the analyzer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Nothing to analyze: text is empty")]
    EmptyInput,

    #[error("No claims provided")]
    NoClaims,

    #[error("Claim {number} is empty")]
    BlankClaim { number: usize },
}

impl From<AnalyzerError> for StageFailure {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::EmptyInput => StageFailure::new(
                ErrorType::InternalInconsistency,
                err.to_string(),
                RecommendedAction::SystemDebug,
            ),
            AnalyzerError::NoClaims | AnalyzerError::BlankClaim { .. } => StageFailure::new(
                ErrorType::InputError,
                err.to_string(),
                RecommendedAction::AdjustInput,
            ),
        }
    }
}

/// Tuning for term weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    /// Leading share of the analyzed text that earns the boost
    pub opening_fraction: f64,

    /// Multiplier for terms first seen in the opening
    pub position_boost: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            opening_fraction: 0.2,
            position_boost: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicAnalyzer {
    config: AnalyzerConfig,
}

impl DeterministicAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn analyze_request(&self, request: &AnalysisRequest) -> Result<ConceptSet, AnalyzerError> {
        self.analyze(request.title(), request.text())
    }

    /// Extract, weight and categorize the concept terms of a document.
    pub fn analyze(&self, title: Option<&str>, text: &str) -> Result<ConceptSet, AnalyzerError> {
        let analyzed = match title {
            Some(t) if !t.trim().is_empty() => format!("{}\n{}", t.trim(), text),
            _ => text.to_string(),
        };
        if analyzed.trim().is_empty() {
            return Err(AnalyzerError::EmptyInput);
        }

        let opening_end = analyzed.len() as f64 * self.config.opening_fraction;
        let index = TokenIndex::new(&analyzed);
        let mut raw: BTreeMap<String, (u32, f64, String)> = BTreeMap::new();

        for term in extract_candidates(&analyzed) {
            let mut occurrences = index.occurrences(&term);
            let Some(first) = occurrences.next() else {
                continue;
            };
            let frequency = 1 + occurrences.count() as u32;
            let boost = if (first.start as f64) < opening_end {
                self.config.position_boost
            } else {
                1.0
            };
            let context = index.sentence_at(first.start);
            raw.insert(term, (frequency, frequency as f64 * boost, context));
        }

        let max_raw = raw.values().map(|(_, w, _)| *w).fold(0.0_f64, f64::max);
        let concepts = raw
            .into_iter()
            .map(|(term, (frequency, weight, context))| {
                let concept = Concept {
                    category: categorize(&term),
                    weight: if max_raw > 0.0 {
                        round3(weight / max_raw)
                    } else {
                        0.0
                    },
                    frequency,
                    context,
                    is_known: false,
                };
                (term, concept)
            })
            .collect();

        let set = ConceptSet::from_map(concepts);
        tracing::debug!(terms = set.len(), chars = analyzed.len(), "Concepts extracted");
        Ok(set)
    }

    /// Lexical overlap between the concepts and each non-user evidence item.
    ///
    /// Items sharing no term are left out.
    pub fn candidate_overlaps(
        &self,
        concepts: &ConceptSet,
        registry: &EvidenceRegistry,
    ) -> Vec<CandidateOverlap> {
        if concepts.is_empty() {
            return Vec::new();
        }

        let mut overlaps = Vec::new();
        for item in prior_art(registry) {
            let index = TokenIndex::new(item.text());
            let shared: BTreeSet<String> = concepts
                .iter()
                .map(|(term, _)| term)
                .filter(|term| index.contains(term))
                .cloned()
                .collect();
            if shared.is_empty() {
                continue;
            }

            let overlap_ratio = round3(shared.len() as f64 / concepts.len() as f64);
            overlaps.push(CandidateOverlap {
                evidence_id: item.id().to_string(),
                shared_terms: shared,
                overlap_ratio,
            });
        }

        overlaps
    }

    /// Compare each claim, on its own, against the non-user evidence.
    ///
    /// A claim scores the largest share of its terms found in one item. The
    /// strongest claim scores lowest and the weakest highest; ties go to the
    /// earlier claim.
    pub fn compare_claims(
        &self,
        claims: &[String],
        registry: &EvidenceRegistry,
    ) -> Result<ClaimsComparison, AnalyzerError> {
        if claims.is_empty() {
            return Err(AnalyzerError::NoClaims);
        }

        let indexed: Vec<(&str, TokenIndex)> = prior_art(registry)
            .map(|item| (item.id(), TokenIndex::new(item.text())))
            .collect();

        let mut compared: Vec<ClaimComparison> = Vec::with_capacity(claims.len());
        for (i, claim) in claims.iter().enumerate() {
            let claim_number = i + 1;
            if claim.trim().is_empty() {
                return Err(AnalyzerError::BlankClaim {
                    number: claim_number,
                });
            }
            let concepts = self.analyze(None, claim)?;

            let mut known: BTreeSet<String> = BTreeSet::new();
            let mut closest: Option<(&str, BTreeSet<String>)> = None;
            for (id, index) in &indexed {
                let shared: BTreeSet<String> = concepts
                    .iter()
                    .map(|(term, _)| term)
                    .filter(|term| index.contains(term))
                    .cloned()
                    .collect();
                known.extend(shared.iter().cloned());
                if shared.len() > closest.as_ref().map_or(0, |(_, s)| s.len()) {
                    closest = Some((*id, shared));
                }
            }

            let (closest_evidence_id, shared_terms) = match closest {
                Some((id, shared)) => (Some(id.to_string()), shared),
                None => (None, BTreeSet::new()),
            };
            let similarity_score = if concepts.is_empty() {
                0.0
            } else {
                round3(shared_terms.len() as f64 / concepts.len() as f64)
            };

            compared.push(ClaimComparison {
                claim_number,
                claim: claim.trim().to_string(),
                similarity_score,
                similarity: similarity_level(similarity_score),
                closest_evidence_id,
                shared_terms,
                differentiating_terms: concepts
                    .iter()
                    .map(|(term, _)| term)
                    .filter(|term| !known.contains(*term))
                    .cloned()
                    .collect(),
            });
        }

        let mut strongest = &compared[0];
        let mut weakest = &compared[0];
        for claim in &compared[1..] {
            if claim.similarity_score < strongest.similarity_score {
                strongest = claim;
            }
            if claim.similarity_score > weakest.similarity_score {
                weakest = claim;
            }
        }
        let (strongest_claim, weakest_claim) = (strongest.claim_number, weakest.claim_number);

        tracing::debug!(claims = compared.len(), strongest_claim, weakest_claim, "Claims compared");
        Ok(ClaimsComparison {
            claims: compared,
            strongest_claim,
            weakest_claim,
        })
    }
}

/// Evidence the request is compared against: everything not supplied by the user.
fn prior_art(registry: &EvidenceRegistry) -> impl Iterator<Item = &EvidenceItem> {
    registry
        .items()
        .iter()
        .filter(|i| i.source() != EvidenceSource::UserInput)
}

/// Collect normalized candidate terms, in pattern priority order.
fn extract_candidates(text: &str) -> BTreeSet<String> {
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut terms = BTreeSet::new();

    for m in HYPHENATED_PATTERN.find_iter(text) {
        claimed.push(m.range());
        let term = m.as_str();
        if term.split('-').all(is_stopword) {
            continue;
        }
        terms.insert(normalize(term));
    }

    for m in ACRONYM_PATTERN.find_iter(text) {
        if overlaps_any(&claimed, &m.range()) || is_stopword(m.as_str()) {
            continue;
        }
        claimed.push(m.range());
        terms.insert(m.as_str().to_string());
    }

    for m in CAPITALIZED_PATTERN.find_iter(text) {
        let mut run: Vec<&str> = Vec::new();
        let mut offset = m.start();
        for word in m.as_str().split([' ', '\t']) {
            let span = offset..offset + word.len();
            offset = span.end + 1;
            if word.is_empty() {
                continue;
            }
            if overlaps_any(&claimed, &span) {
                flush_phrase(&mut run, &mut terms);
            } else {
                run.push(word);
            }
        }
        flush_phrase(&mut run, &mut terms);
    }

    terms
}

/// Turn a run of capitalized words into a term, trimming function words.
fn flush_phrase(run: &mut Vec<&str>, terms: &mut BTreeSet<String>) {
    let start = run.iter().position(|w| !is_stopword(w));
    let end = run.iter().rposition(|w| !is_stopword(w));
    if let (Some(start), Some(end)) = (start, end) {
        let phrase = run[start..=end].join(" ").to_lowercase();
        if phrase.chars().count() >= 3 {
            terms.insert(phrase);
        }
    }
    run.clear();
}

fn overlaps_any(claimed: &[Range<usize>], span: &Range<usize>) -> bool {
    claimed
        .iter()
        .any(|c| c.start < span.end && span.start < c.end)
}

/// Acronym-style terms keep their case; everything else is lowercased.
fn normalize(term: &str) -> String {
    if is_acronym_like(term) {
        term.to_string()
    } else {
        term.to_lowercase()
    }
}

fn is_acronym_like(term: &str) -> bool {
    term.chars().any(|c| c.is_ascii_uppercase()) && !term.chars().any(|c| c.is_lowercase())
}

fn categorize(term: &str) -> ConceptCategory {
    let words: Vec<&str> = term
        .split([' ', '-'])
        .filter(|w| !w.is_empty())
        .collect();

    if is_domain_stopword(term)
        || words
            .iter()
            .all(|w| is_domain_stopword(w) || is_stopword(w))
    {
        return ConceptCategory::CommonDomain;
    }

    let methodological = METHODOLOGICAL_KEYWORDS.contains(&term)
        || (!is_acronym_like(term) && words.last().is_some_and(|w| is_methodological_word(w)));
    if methodological {
        ConceptCategory::Methodological
    } else {
        ConceptCategory::Differentiating
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimilarityLevel;
    use chrono::{TimeZone, Utc};

    fn analyzer() -> DeterministicAnalyzer {
        DeterministicAnalyzer::default()
    }

    #[test]
    fn test_candidate_categories() {
        let text = "The Graphene Anode improves charging. Data Processing uses LIDAR. \
                    The Invention relies on solid-state cells.";
        let set = analyzer().analyze(None, text).unwrap();

        let category = |t: &str| set.get(t).map(|c| c.category);
        assert_eq!(category("graphene anode"), Some(ConceptCategory::Differentiating));
        assert_eq!(category("data processing"), Some(ConceptCategory::Methodological));
        assert_eq!(category("invention"), Some(ConceptCategory::CommonDomain));
        assert_eq!(category("LIDAR"), Some(ConceptCategory::Differentiating));
        assert_eq!(category("solid-state"), Some(ConceptCategory::Differentiating));
        assert!(!set.contains("the"));
    }

    #[test]
    fn test_hyphenated_compound_claims_capitalized_head() {
        let set = analyzer()
            .analyze(None, "Our Lithium-ion pack is stable.")
            .unwrap();
        assert!(set.contains("lithium-ion"));
        assert!(!set.contains("lithium"));
    }

    #[test]
    fn test_title_terms_are_boosted() {
        let body = format!("{} Quantum appears late.", "filler ".repeat(50));
        let set = analyzer().analyze(Some("Perovskite"), &body).unwrap();

        assert_eq!(set.get("perovskite").unwrap().weight, 1.0);
        assert_eq!(set.get("quantum").unwrap().weight, 0.667);
    }

    #[test]
    fn test_frequency_can_outweigh_boost() {
        let body = format!("{} Quantum here and Quantum there.", "filler ".repeat(50));
        let set = analyzer().analyze(Some("Perovskite"), &body).unwrap();

        let quantum = set.get("quantum").unwrap();
        assert_eq!(quantum.frequency, 2);
        assert_eq!(quantum.weight, 1.0);
        assert_eq!(set.get("perovskite").unwrap().weight, 0.75);
    }

    #[test]
    fn test_is_deterministic() {
        let text = "A MEMS Gyroscope with Adaptive Filtering and low-noise readout.";
        let first = serde_json::to_string(&analyzer().analyze(Some("Gyro"), text).unwrap()).unwrap();
        let second =
            serde_json::to_string(&analyzer().analyze(Some("Gyro"), text).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input_fails() {
        assert_eq!(
            analyzer().analyze(None, "  \n "),
            Err(AnalyzerError::EmptyInput)
        );
        let failure: StageFailure = AnalyzerError::EmptyInput.into();
        assert_eq!(failure.error_type, ErrorType::InternalInconsistency);
    }

    #[test]
    fn test_lowercase_text_yields_no_capitalized_terms() {
        let set = analyzer().analyze(None, "plain words only here").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_candidate_overlaps() {
        let body = format!("{} Quantum appears late.", "filler ".repeat(50));
        let set = analyzer().analyze(Some("Perovskite"), &body).unwrap();

        let mut registry =
            EvidenceRegistry::starting_at(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap());
        registry.register(EvidenceSource::UserInput, body.clone()).unwrap();
        registry
            .register(EvidenceSource::Retrieved, "A perovskite cell with quantum wells.")
            .unwrap();
        registry
            .register(EvidenceSource::Retrieved, "Unrelated text about rivers.")
            .unwrap();

        let overlaps = analyzer().candidate_overlaps(&set, &registry);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].evidence_id, "EVD-20250102030405-RETRIEVED");
        assert_eq!(overlaps[0].overlap_ratio, 1.0);
        assert!(overlaps[0].shared_terms.contains("quantum"));
    }

    #[test]
    fn test_concept_context_is_first_sentence() {
        let text = "Cells degrade. The Graphene Anode resists wear! Later the Graphene Anode fails.";
        let set = analyzer().analyze(Some("Battery Study"), text).unwrap();

        let anode = set.get("graphene anode").unwrap();
        assert_eq!(anode.frequency, 2);
        assert_eq!(anode.context, "The Graphene Anode resists wear!");
        assert!(!anode.is_known);
        assert_eq!(set.get("battery study").unwrap().context, "Battery Study");
    }

    #[test]
    fn test_large_input_counts_every_term() {
        let text: String = (0..1500)
            .map(|i| format!("Gamma{} meets Gamma{} here. ", i, i))
            .collect();
        assert!(text.len() > 40_000);

        let set = analyzer().analyze(None, &text).unwrap();
        assert_eq!(set.len(), 1500);
        assert!(set.iter().all(|(_, c)| c.frequency == 2));
        assert_eq!(set.get("gamma1").unwrap().context, "Gamma1 meets Gamma1 here.");
    }

    fn claims_registry() -> EvidenceRegistry {
        let mut registry =
            EvidenceRegistry::starting_at(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap());
        registry
            .register(EvidenceSource::UserInput, "Graphene Anode and Cobalt Cathode.")
            .unwrap();
        registry
            .register(EvidenceSource::Retrieved, "A graphene anode paired with a cobalt cathode.")
            .unwrap();
        registry
            .register(EvidenceSource::External, "Notes on a Silicon Binder.")
            .unwrap();
        registry
    }

    fn claims(items: &[&str]) -> Vec<String> {
        items.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_compare_claims_ranks_by_overlap() {
        let registry = claims_registry();
        let result = analyzer()
            .compare_claims(
                &claims(&[
                    "A Graphene Anode with a Cobalt Cathode.",
                    "A Silicon Binder with Laser Sintering.",
                    "A Tungsten Mesh.",
                ]),
                &registry,
            )
            .unwrap();

        let first = &result.claims[0];
        assert_eq!(first.claim_number, 1);
        assert_eq!(first.similarity_score, 1.0);
        assert_eq!(first.similarity, SimilarityLevel::High);
        assert_eq!(
            first.closest_evidence_id.as_deref(),
            Some("EVD-20250102030405-RETRIEVED")
        );
        assert!(first.differentiating_terms.is_empty());

        let second = &result.claims[1];
        assert_eq!(second.similarity_score, 0.5);
        assert_eq!(second.similarity, SimilarityLevel::Medium);
        assert_eq!(
            second.closest_evidence_id.as_deref(),
            Some("EVD-20250102030405-EXTERNAL")
        );
        assert!(second.differentiating_terms.contains("laser sintering"));

        let third = &result.claims[2];
        assert_eq!(third.similarity_score, 0.0);
        assert_eq!(third.similarity, SimilarityLevel::Low);
        assert!(third.closest_evidence_id.is_none());
        assert!(third.differentiating_terms.contains("tungsten mesh"));

        assert_eq!(result.strongest_claim, 3);
        assert_eq!(result.weakest_claim, 1);
    }

    #[test]
    fn test_compare_claims_ties_go_to_earlier_claim() {
        let registry = claims_registry();
        let result = analyzer()
            .compare_claims(&claims(&["a plain claim", "another plain claim"]), &registry)
            .unwrap();

        assert!(result.claims.iter().all(|c| c.similarity_score == 0.0));
        assert_eq!(result.strongest_claim, 1);
        assert_eq!(result.weakest_claim, 1);
    }

    #[test]
    fn test_compare_claims_rejects_empty_input() {
        let registry = claims_registry();
        assert_eq!(
            analyzer().compare_claims(&[], &registry),
            Err(AnalyzerError::NoClaims)
        );
        assert_eq!(
            analyzer().compare_claims(&claims(&["A Graphene Anode.", "  "]), &registry),
            Err(AnalyzerError::BlankClaim { number: 2 })
        );

        let failure: StageFailure = AnalyzerError::NoClaims.into();
        assert_eq!(failure.error_type, ErrorType::InputError);
        assert_eq!(failure.message, "No claims provided");
    }
}
