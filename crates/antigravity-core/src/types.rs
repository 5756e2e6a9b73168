//! Core types shared by every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// Text supplied by the requester
    UserInput,
    /// Text fetched by a retrieval collaborator
    Retrieved,
    /// Text from any other external collaborator
    External,
}

impl EvidenceSource {
    /// Tag used inside evidence identifiers.
    pub fn tag(&self) -> &'static str {
        match self {
            EvidenceSource::UserInput => "INPUT",
            EvidenceSource::Retrieved => "RETRIEVED",
            EvidenceSource::External => "EXTERNAL",
        }
    }

    /// Wire name of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceSource::UserInput => "user_input",
            EvidenceSource::Retrieved => "retrieved",
            EvidenceSource::External => "external",
        }
    }
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identified, immutable unit of source text.
///
/// Items are only created by [`crate::EvidenceRegistry::register`] and are
/// never mutated afterwards, so the fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    id: String,
    source: EvidenceSource,
    text: String,
    timestamp: DateTime<Utc>,
}

impl EvidenceItem {
    pub(crate) fn new(
        id: String,
        source: EvidenceSource,
        text: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source,
            text,
            timestamp,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> EvidenceSource {
        self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the item carries any non-whitespace text.
    pub fn is_usable(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Reference form used in success envelopes.
    pub fn reference(&self) -> EvidenceReference {
        EvidenceReference {
            evidence_id: self.id.clone(),
            source: self.source,
            timestamp: self.timestamp,
        }
    }
}

/// Kind of project being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Research,
    Patent,
}

impl ProjectType {
    /// Parse the wire token. Only the exact lowercase tokens are accepted.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "research" => Some(ProjectType::Research),
            "patent" => Some(ProjectType::Patent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Research => "research",
            ProjectType::Patent => "patent",
        }
    }

    /// How the submitted work is described to the reasoner.
    pub fn work_label(&self) -> &'static str {
        match self {
            ProjectType::Research => "research idea",
            ProjectType::Patent => "patent claim",
        }
    }

    /// How the comparison corpus is described to the reasoner.
    pub fn prior_art_label(&self) -> &'static str {
        match self {
            ProjectType::Research => "published research",
            ProjectType::Patent => "existing patents",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as it arrives from a collaborator, before validation.
///
/// Every field is optional so that a malformed request still reaches the
/// input validator and produces a crash log instead of a decode error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAnalysisRequest {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub project_type: Option<String>,
}

impl RawAnalysisRequest {
    pub fn new(
        text: impl Into<String>,
        title: Option<&str>,
        project_type: impl Into<String>,
    ) -> Self {
        Self {
            text: Some(text.into()),
            title: title.map(str::to_string),
            project_type: Some(project_type.into()),
        }
    }
}

/// A request accepted by the input validator. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    text: String,
    title: Option<String>,
    project_type: ProjectType,
}

impl AnalysisRequest {
    pub(crate) fn new(text: String, title: Option<String>, project_type: ProjectType) -> Self {
        Self {
            text,
            title,
            project_type,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn project_type(&self) -> ProjectType {
        self.project_type
    }
}

/// Category a concept term falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptCategory {
    Differentiating,
    CommonDomain,
    Methodological,
}

/// Weight and category of one extracted term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub category: ConceptCategory,

    /// Normalized relevance weight in [0, 1]
    pub weight: f64,

    /// Occurrences in the analyzed text
    pub frequency: u32,

    /// Sentence of the first occurrence
    #[serde(default)]
    pub context: String,

    /// Whether any non-user evidence item contains the term
    #[serde(default)]
    pub is_known: bool,
}

/// Term -> concept mapping produced by the deterministic analyzer.
///
/// Backed by a `BTreeMap` so serialization order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptSet {
    concepts: BTreeMap<String, Concept>,
}

impl ConceptSet {
    pub(crate) fn from_map(concepts: BTreeMap<String, Concept>) -> Self {
        Self { concepts }
    }

    pub fn get(&self, term: &str) -> Option<&Concept> {
        self.concepts.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.concepts.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Concept)> {
        self.concepts.iter()
    }

    /// Terms of one category, in term order.
    pub fn terms_in(&self, category: ConceptCategory) -> Vec<&str> {
        self.concepts
            .iter()
            .filter(|(_, c)| c.category == category)
            .map(|(t, _)| t.as_str())
            .collect()
    }

    /// Flag every term that one of the overlaps shares with prior art.
    pub fn mark_known(&mut self, overlaps: &[CandidateOverlap]) {
        for term in overlaps.iter().flat_map(|o| &o.shared_terms) {
            if let Some(concept) = self.concepts.get_mut(term) {
                concept.is_known = true;
            }
        }
    }

    /// The `n` heaviest terms. Ties break on term order.
    pub fn top(&self, n: usize) -> Vec<(&str, &Concept)> {
        let mut ranked: Vec<(&str, &Concept)> = self
            .concepts
            .iter()
            .map(|(t, c)| (t.as_str(), c))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.weight
                .partial_cmp(&a.1.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.truncate(n);
        ranked
    }
}

/// Deterministic lexical overlap between the request and one evidence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOverlap {
    pub evidence_id: String,
    pub shared_terms: BTreeSet<String>,

    /// Shared terms divided by all concept terms
    pub overlap_ratio: f64,
}

/// Coarse similarity of one comparison. Cut at the risk band thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityLevel {
    Low,
    Medium,
    High,
}

impl SimilarityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityLevel::Low => "low",
            SimilarityLevel::Medium => "medium",
            SimilarityLevel::High => "high",
        }
    }
}

impl fmt::Display for SimilarityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prior-art overlap reported by the reasoner and checked against evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorArtMatch {
    pub similarity_score: f64,

    /// Level of `similarity_score`
    pub similarity: SimilarityLevel,

    pub overlapping_concepts: BTreeSet<String>,
    pub differentiating_aspects: BTreeSet<String>,

    /// Registered evidence ids backing this match (never empty)
    pub evidence_ids: BTreeSet<String>,

    #[serde(default)]
    pub description: String,
}

/// One claim compared on its own against the non-user evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimComparison {
    /// 1-based position in the submitted list
    pub claim_number: usize,
    pub claim: String,

    /// Best share of the claim's terms found in a single evidence item
    pub similarity_score: f64,
    pub similarity: SimilarityLevel,

    /// Item holding that best share; `None` when no term is found anywhere
    pub closest_evidence_id: Option<String>,

    /// Terms shared with the closest item
    pub shared_terms: BTreeSet<String>,

    /// Terms found in no evidence item
    pub differentiating_terms: BTreeSet<String>,
}

/// Claim-by-claim comparison of a claim set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimsComparison {
    pub claims: Vec<ClaimComparison>,

    /// Claim number with the lowest similarity
    pub strongest_claim: usize,

    /// Claim number with the highest similarity
    pub weakest_claim: usize,
}

/// A differentiation claim reported by the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelAspect {
    pub claim: String,
    pub evidence_ids: BTreeSet<String>,
}

/// Traffic-light classification of prior-art overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskBand {
    Green,
    Yellow,
    Red,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Green => "GREEN",
            RiskBand::Yellow => "YELLOW",
            RiskBand::Red => "RED",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub band: RiskBand,
    pub score: f64,
}

/// Ordinal confidence. Declaration order is the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceReference {
    pub evidence_id: String,
    pub source: EvidenceSource,
    pub timestamp: DateTime<Utc>,
}

/// What was directly detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservedOverlap {
    pub summary: String,
    pub prior_art_matches: Vec<PriorArtMatch>,

    /// Union of the matches' `overlapping_concepts`
    pub overlapping_aspects: BTreeSet<String>,
    pub novel_aspects: Vec<NovelAspect>,
    pub candidate_overlaps: Vec<CandidateOverlap>,
}

impl ObservedOverlap {
    /// Aspects shared with prior art across all `matches`.
    pub fn overlapping_aspects_of(matches: &[PriorArtMatch]) -> BTreeSet<String> {
        matches
            .iter()
            .flat_map(|m| m.overlapping_concepts.iter().cloned())
            .collect()
    }

    /// Every evidence id cited anywhere in the observed overlap.
    pub fn cited_evidence_ids(&self) -> BTreeSet<&str> {
        let mut ids: BTreeSet<&str> = BTreeSet::new();
        for m in &self.prior_art_matches {
            ids.extend(m.evidence_ids.iter().map(String::as_str));
        }
        for a in &self.novel_aspects {
            ids.extend(a.evidence_ids.iter().map(String::as_str));
        }
        for o in &self.candidate_overlaps {
            ids.insert(o.evidence_id.as_str());
        }
        ids
    }
}

/// What was probabilistically derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InferredRisk {
    pub band: RiskBand,
    pub score: f64,
    pub basis: String,
    pub recommendations: Vec<String>,
}

/// The only success shape the pipeline emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuccessEnvelope {
    pub evidence_references: Vec<EvidenceReference>,
    pub confidence: ConfidenceLevel,
    pub scope_disclaimer: String,
    pub observed_overlap: ObservedOverlap,
    pub inferred_risk: InferredRisk,
    pub unknowns: Vec<String>,
}
