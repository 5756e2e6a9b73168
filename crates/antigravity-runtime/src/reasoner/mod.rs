//! Constrained reasoner.
//!
//! The only component that calls a model. It builds the evidence-locked
//! prompt, calls the provider under a timeout and the rate-limit retry
//! policy, and turns the reply into a [`ReasoningResult`] that cites
//! registered evidence only.
//!
//! ## Contract
//!
//! 1. The reply must pass the output schema and strict decoding. One repair
//!    prompt is allowed, then the call fails with `SCHEMA_VIOLATION`.
//! 2. Unregistered evidence ids are removed. A claim left without ids is
//!    dropped and counted as hedging.
//! 3. Scores slightly outside [0, 1] are clamped. Anything further out than
//!    `score_tolerance` is an internal inconsistency.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use antigravity_core::validation::is_placeholder;
use antigravity_core::{
    similarity_level, AnalysisRequest, CandidateOverlap, ConceptSet, ErrorType, EvidenceRegistry,
    NovelAspect, PriorArtMatch, RecommendedAction, StageFailure,
};
use thiserror::Error;

use crate::cache::{CacheKey, ResponseCache};
use crate::prompts;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError, TokenUsage};
use crate::resilience::{retry_rate_limited, with_timeout, RetryPolicy};

pub mod schema;

pub use schema::{
    parse_reasoner_output, strip_code_fences, Certainty, RawMatch, RawNovelAspect,
    RawReasonerOutput, UnknownMarker, REASONER_OUTPUT_SCHEMA_JSON, UNKNOWN_TOKEN,
};

/// Reasoner settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasonerConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Upper bound on each provider call
    pub timeout: Duration,

    pub retry: RetryPolicy,

    /// Largest overshoot outside [0, 1] that is clamped instead of rejected
    pub score_tolerance: f64,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            score_tolerance: 0.05,
        }
    }
}

impl ReasonerConfig {
    fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            json_output: true,
        }
    }
}

/// Errors from the reasoning stage.
#[derive(Error, Debug)]
pub enum ReasonerError {
    #[error("Reasoner output violated the output schema after one repair attempt: {0}")]
    SchemaViolation(String),

    #[error("{field} = {value} lies outside [0, 1] by more than the tolerance {tolerance}")]
    ScoreOutOfRange {
        field: String,
        value: f64,
        tolerance: f64,
    },

    #[error("Provider still rate limited after {retries} retries")]
    RateLimitExhausted { retries: usize },

    #[error("Reasoner call failed: {0}")]
    Provider(#[source] ProviderError),

    #[error("Evidence registry must be sealed before reasoning")]
    UnsealedRegistry,
}

impl From<ReasonerError> for StageFailure {
    fn from(err: ReasonerError) -> Self {
        let message = err.to_string();
        match err {
            ReasonerError::SchemaViolation(_) => StageFailure::new(
                ErrorType::SchemaViolation,
                message,
                RecommendedAction::SystemDebug,
            ),
            ReasonerError::ScoreOutOfRange { .. } => StageFailure::new(
                ErrorType::InternalInconsistency,
                message,
                RecommendedAction::SystemDebug,
            ),
            ReasonerError::RateLimitExhausted { .. } => StageFailure::new(
                ErrorType::UnknownFailure,
                message,
                RecommendedAction::RetryWithMoreEvidence,
            ),
            ReasonerError::Provider(_) => StageFailure::new(
                ErrorType::UnknownFailure,
                message,
                RecommendedAction::SystemDebug,
            ),
            ReasonerError::UnsealedRegistry => {
                StageFailure::of(ErrorType::InternalInconsistency, message)
            }
        }
    }
}

/// Reasoner output after evidence and range checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningResult {
    /// `None` when the reasoner answered UNKNOWN
    pub summary: Option<String>,

    /// `None` when the reasoner answered UNKNOWN
    pub certainty: Option<f64>,

    pub prior_art_matches: Vec<PriorArtMatch>,
    pub novel_aspects: Vec<NovelAspect>,
    pub unknowns: Vec<String>,
    pub recommendations: Vec<String>,

    /// Claims removed because no cited id was registered
    pub dropped_claims: usize,

    /// Unregistered ids stripped from claims
    pub removed_ids: usize,

    pub clamped_scores: usize,

    /// Provider calls made, retries and repair included
    pub provider_calls: u32,
    pub repaired: bool,
    pub cached: bool,
    pub usage: TokenUsage,
}

impl ReasoningResult {
    /// Fields answered UNKNOWN plus claims dropped for lack of evidence.
    pub fn hedged_fields(&self) -> usize {
        usize::from(self.summary.is_none())
            + usize::from(self.certainty.is_none())
            + self.dropped_claims
    }
}

#[derive(Debug, Default)]
struct Exchange {
    calls: u32,
    repaired: bool,
    cached: bool,
    usage: TokenUsage,
}

/// Adapter around an [`LlmProvider`] that enforces the output contract.
pub struct ConstrainedReasoner {
    provider: Arc<dyn LlmProvider>,
    config: ReasonerConfig,
    cache: Option<Arc<ResponseCache>>,
}

impl ConstrainedReasoner {
    pub fn new(provider: Arc<dyn LlmProvider>, config: ReasonerConfig) -> Self {
        Self {
            provider,
            config,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one reasoning exchange against the sealed registry.
    ///
    /// An unsealed registry is refused before any provider call.
    pub async fn reason(
        &self,
        request: &AnalysisRequest,
        concepts: &ConceptSet,
        overlaps: &[CandidateOverlap],
        registry: &EvidenceRegistry,
    ) -> Result<ReasoningResult, ReasonerError> {
        if !registry.is_sealed() {
            return Err(ReasonerError::UnsealedRegistry);
        }
        let messages = prompts::build_messages(request, concepts, overlaps, registry);
        let key = CacheKey::new(&messages, &self.config.model);

        if let Some(cache) = &self.cache {
            if let Some(raw) = cache.get(&key).await {
                tracing::debug!(provider = self.provider.name(), "Reasoner cache hit");
                let exchange = Exchange {
                    cached: true,
                    ..Exchange::default()
                };
                return self.finish(raw, registry, exchange);
            }
        }

        let mut exchange = Exchange::default();
        let first = self.call(messages.clone(), &mut exchange).await?;

        let raw = match parse_reasoner_output(&first) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(error = %error, "Reasoner output rejected, sending repair prompt");
                let mut repair = messages;
                repair.push(ChatMessage::assistant(first));
                repair.push(prompts::repair_message(&error));
                exchange.repaired = true;

                let second = self.call(repair, &mut exchange).await?;
                parse_reasoner_output(&second).map_err(ReasonerError::SchemaViolation)?
            }
        };

        if let Some(cache) = &self.cache {
            cache.insert(key, raw.clone()).await;
        }

        self.finish(raw, registry, exchange)
    }

    /// One logical call: timeout per attempt, retry on rate limits only.
    async fn call(
        &self,
        messages: Vec<ChatMessage>,
        exchange: &mut Exchange,
    ) -> Result<String, ReasonerError> {
        let completion = self.config.completion_config();
        let attempts = AtomicU32::new(0);
        let timeout = self.config.timeout;

        let provider = &self.provider;
        let messages = &messages;
        let completion = &completion;
        let counter = &attempts;

        let result = retry_rate_limited(&self.config.retry, move || {
            counter.fetch_add(1, Ordering::Relaxed);
            with_timeout(timeout, provider.complete(messages.clone(), completion))
        })
        .await;

        exchange.calls += attempts.load(Ordering::Relaxed);

        match result {
            Ok(response) => {
                exchange.usage.add(response.usage);
                Ok(response.content)
            }
            Err(ProviderError::RateLimited { .. }) => Err(ReasonerError::RateLimitExhausted {
                retries: self.config.retry.max_retries,
            }),
            Err(err) => Err(ReasonerError::Provider(err)),
        }
    }

    fn finish(
        &self,
        raw: RawReasonerOutput,
        registry: &EvidenceRegistry,
        exchange: Exchange,
    ) -> Result<ReasoningResult, ReasonerError> {
        let tolerance = self.config.score_tolerance;
        let mut clamped_scores = 0;
        let mut removed_ids = 0;
        let mut dropped_claims = 0;

        let certainty = match raw.certainty {
            Certainty::Reported(value) => Some(bound_score(
                "certainty",
                value,
                tolerance,
                &mut clamped_scores,
            )?),
            Certainty::Unknown(_) => None,
        };

        let summary = Some(raw.summary.trim().to_string()).filter(|s| !is_placeholder(s));

        let mut prior_art_matches = Vec::new();
        for (index, m) in raw.prior_art_matches.into_iter().enumerate() {
            let similarity_score = bound_score(
                &format!("prior_art_matches[{}].similarity_score", index),
                m.similarity_score,
                tolerance,
                &mut clamped_scores,
            )?;

            let evidence_ids = registered_ids(m.evidence_ids, registry, &mut removed_ids);
            if evidence_ids.is_empty() {
                dropped_claims += 1;
                tracing::warn!(index, "Dropping prior-art match without registered evidence");
                continue;
            }

            prior_art_matches.push(PriorArtMatch {
                similarity_score,
                similarity: similarity_level(similarity_score),
                overlapping_concepts: term_set(m.overlapping_concepts),
                differentiating_aspects: term_set(m.differentiating_aspects),
                evidence_ids,
                description: m.description.trim().to_string(),
            });
        }

        let mut novel_aspects = Vec::new();
        for (index, aspect) in raw.novel_aspects.into_iter().enumerate() {
            let evidence_ids = registered_ids(aspect.evidence_ids, registry, &mut removed_ids);
            let claim = aspect.claim.trim().to_string();
            if evidence_ids.is_empty() || is_placeholder(&claim) {
                dropped_claims += 1;
                tracing::warn!(index, "Dropping novel aspect without registered evidence");
                continue;
            }
            novel_aspects.push(NovelAspect {
                claim,
                evidence_ids,
            });
        }

        if removed_ids > 0 {
            tracing::warn!(removed_ids, "Removed unregistered evidence ids from reasoner claims");
        }

        Ok(ReasoningResult {
            summary,
            certainty,
            prior_art_matches,
            novel_aspects,
            unknowns: meaningful(raw.unknowns),
            recommendations: meaningful(raw.recommendations),
            dropped_claims,
            removed_ids,
            clamped_scores,
            provider_calls: exchange.calls,
            repaired: exchange.repaired,
            cached: exchange.cached,
            usage: exchange.usage,
        })
    }
}

impl std::fmt::Debug for ConstrainedReasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstrainedReasoner")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

/// Accept a score in [0, 1], clamp a small overshoot, reject the rest.
fn bound_score(
    field: &str,
    value: f64,
    tolerance: f64,
    clamped: &mut usize,
) -> Result<f64, ReasonerError> {
    if (0.0..=1.0).contains(&value) {
        return Ok(value);
    }

    let deviation = if value < 0.0 { -value } else { value - 1.0 };
    if !value.is_finite() || deviation > tolerance {
        return Err(ReasonerError::ScoreOutOfRange {
            field: field.to_string(),
            value,
            tolerance,
        });
    }

    *clamped += 1;
    tracing::warn!(field, value, "Clamping out-of-range score");
    Ok(value.clamp(0.0, 1.0))
}

fn registered_ids(
    ids: Vec<String>,
    registry: &EvidenceRegistry,
    removed: &mut usize,
) -> BTreeSet<String> {
    let mut kept = BTreeSet::new();
    for id in ids {
        let id = id.trim().to_string();
        if registry.contains(&id) {
            kept.insert(id);
        } else {
            *removed += 1;
        }
    }
    kept
}

fn term_set(terms: Vec<String>) -> BTreeSet<String> {
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Drop placeholder entries from a free-text list.
fn meaningful(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !is_placeholder(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, ReplayProvider, ReplayStep};
    use antigravity_core::{
        DeterministicAnalyzer, EvidenceSource, InputValidator, RawAnalysisRequest, SimilarityLevel,
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    const INPUT_ID: &str = "EVD-20250301090000-INPUT";
    const RETRIEVED_ID: &str = "EVD-20250301090000-RETRIEVED";

    struct Fixture {
        request: AnalysisRequest,
        registry: EvidenceRegistry,
        concepts: ConceptSet,
        overlaps: Vec<CandidateOverlap>,
    }

    fn fixture() -> Fixture {
        let raw = RawAnalysisRequest::new(
            "A Solid-State Battery with a Graphene Anode for fast charging.",
            Some("Graphene Anode Cell"),
            "patent",
        );
        let request = InputValidator::default().validate(&raw).unwrap();
        let mut registry =
            EvidenceRegistry::starting_at(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        registry
            .register(EvidenceSource::UserInput, request.text())
            .unwrap();
        registry
            .register(
                EvidenceSource::Retrieved,
                "US prior art describing a Graphene Anode in a lithium-ion cell.",
            )
            .unwrap();
        registry.seal();

        let analyzer = DeterministicAnalyzer::default();
        let concepts = analyzer.analyze_request(&request).unwrap();
        let overlaps = analyzer.candidate_overlaps(&concepts, &registry);
        Fixture {
            request,
            registry,
            concepts,
            overlaps,
        }
    }

    fn reply(score: f64, ids: &[&str]) -> String {
        json!({
            "summary": "The retrieved patent also uses a graphene anode.",
            "certainty": 0.8,
            "prior_art_matches": [{
                "similarity_score": score,
                "overlapping_concepts": ["graphene anode"],
                "differentiating_aspects": ["solid-state"],
                "evidence_ids": ids,
                "description": "Same anode material."
            }],
            "novel_aspects": [{
                "claim": "Solid-state electrolyte is not described in the evidence.",
                "evidence_ids": [INPUT_ID]
            }],
            "unknowns": [],
            "recommendations": ["Search for solid-state graphene cells."]
        })
        .to_string()
    }

    fn reasoner(steps: Vec<ReplayStep>) -> (ConstrainedReasoner, Arc<ReplayProvider>) {
        let provider = Arc::new(ReplayProvider::new(steps));
        (
            ConstrainedReasoner::new(provider.clone(), ReasonerConfig::default()),
            provider,
        )
    }

    async fn run(reasoner: &ConstrainedReasoner) -> Result<ReasoningResult, ReasonerError> {
        let f = fixture();
        reasoner
            .reason(&f.request, &f.concepts, &f.overlaps, &f.registry)
            .await
    }

    #[tokio::test]
    async fn test_valid_reply() {
        let (reasoner, _) = reasoner(vec![ReplayStep::Response(reply(0.7, &[RETRIEVED_ID]))]);
        let result = run(&reasoner).await.unwrap();

        assert_eq!(result.certainty, Some(0.8));
        assert_eq!(result.prior_art_matches.len(), 1);
        assert_eq!(result.prior_art_matches[0].similarity, SimilarityLevel::High);
        assert_eq!(result.novel_aspects.len(), 1);
        assert_eq!(result.hedged_fields(), 0);
        assert_eq!(result.provider_calls, 1);
        assert!(!result.repaired);
    }

    #[tokio::test]
    async fn test_unsealed_registry_is_refused_before_any_call() {
        let (reasoner, provider) = reasoner(vec![ReplayStep::Response(reply(0.7, &[RETRIEVED_ID]))]);
        let f = fixture();
        let mut open = EvidenceRegistry::starting_at(f.registry.run_started());
        open.register(EvidenceSource::UserInput, f.request.text())
            .unwrap();

        let err = reasoner
            .reason(&f.request, &f.concepts, &f.overlaps, &open)
            .await
            .unwrap_err();
        assert!(matches!(err, ReasonerError::UnsealedRegistry));
        assert_eq!(provider.remaining(), 1);

        let failure = StageFailure::from(err);
        assert_eq!(failure.error_type, ErrorType::InternalInconsistency);
        assert_eq!(failure.recommended_action, RecommendedAction::SystemDebug);
    }

    #[tokio::test]
    async fn test_fenced_reply_is_accepted() {
        let fenced = format!("```json\n{}\n```", reply(0.7, &[RETRIEVED_ID]));
        let (reasoner, _) = reasoner(vec![ReplayStep::Response(fenced)]);
        assert!(run(&reasoner).await.is_ok());
    }

    #[tokio::test]
    async fn test_repair_prompt_recovers() {
        let (reasoner, provider) = reasoner(vec![
            ReplayStep::Response("Looks novel to me.".to_string()),
            ReplayStep::Response(reply(0.7, &[RETRIEVED_ID])),
        ]);
        let result = run(&reasoner).await.unwrap();
        assert!(result.repaired);
        assert_eq!(result.provider_calls, 2);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_second_bad_reply_is_schema_violation() {
        let (reasoner, _) = reasoner(vec![
            ReplayStep::Response("Looks novel to me.".to_string()),
            ReplayStep::Response(r#"{"summary": "still wrong"}"#.to_string()),
        ]);
        let err = run(&reasoner).await.unwrap_err();
        assert!(matches!(err, ReasonerError::SchemaViolation(_)));

        let failure = StageFailure::from(err);
        assert_eq!(failure.error_type, ErrorType::SchemaViolation);
        assert_eq!(failure.recommended_action, RecommendedAction::SystemDebug);
    }

    #[tokio::test]
    async fn test_unregistered_ids_removed_and_claims_dropped() {
        let (reasoner, _) = reasoner(vec![ReplayStep::Response(reply(
            0.7,
            &["EVD-19990101000000-RETRIEVED"],
        ))]);
        let result = run(&reasoner).await.unwrap();

        assert!(result.prior_art_matches.is_empty());
        assert_eq!(result.dropped_claims, 1);
        assert_eq!(result.removed_ids, 1);
        assert_eq!(result.hedged_fields(), 1);
        assert_eq!(result.novel_aspects.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_citations_keep_registered_ids() {
        let (reasoner, _) = reasoner(vec![ReplayStep::Response(reply(
            0.7,
            &[RETRIEVED_ID, "EVD-20250301090000-RETRIEVED-9"],
        ))]);
        let result = run(&reasoner).await.unwrap();
        let ids: Vec<&str> = result.prior_art_matches[0]
            .evidence_ids
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(ids, vec![RETRIEVED_ID]);
        assert_eq!(result.dropped_claims, 0);
    }

    #[tokio::test]
    async fn test_small_overshoot_is_clamped() {
        let (reasoner, _) = reasoner(vec![ReplayStep::Response(reply(1.03, &[RETRIEVED_ID]))]);
        let result = run(&reasoner).await.unwrap();
        assert_eq!(result.prior_art_matches[0].similarity_score, 1.0);
        assert_eq!(result.clamped_scores, 1);
    }

    #[tokio::test]
    async fn test_large_overshoot_is_inconsistent() {
        let (reasoner, _) = reasoner(vec![ReplayStep::Response(reply(1.2, &[RETRIEVED_ID]))]);
        let failure = StageFailure::from(run(&reasoner).await.unwrap_err());
        assert_eq!(failure.error_type, ErrorType::InternalInconsistency);
    }

    #[tokio::test]
    async fn test_unknown_fields_are_hedged() {
        let text = json!({
            "summary": "UNKNOWN",
            "certainty": "UNKNOWN",
            "prior_art_matches": [],
            "novel_aspects": [],
            "unknowns": ["No prior art was retrieved.", "N/A"],
            "recommendations": []
        })
        .to_string();
        let (reasoner, _) = reasoner(vec![ReplayStep::Response(text)]);
        let result = run(&reasoner).await.unwrap();

        assert_eq!(result.summary, None);
        assert_eq!(result.certainty, None);
        assert_eq!(result.hedged_fields(), 2);
        assert_eq!(result.unknowns, vec!["No prior art was retrieved."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion() {
        let (reasoner, provider) = reasoner(vec![ReplayStep::RateLimited; 5]);
        let started = tokio::time::Instant::now();
        let err = run(&reasoner).await.unwrap_err();

        assert!(matches!(err, ReasonerError::RateLimitExhausted { retries: 3 }));
        assert_eq!(provider.remaining(), 1);
        assert!(started.elapsed() >= Duration::from_secs(14));

        let failure = StageFailure::from(err);
        assert_eq!(failure.error_type, ErrorType::UnknownFailure);
        assert_eq!(
            failure.recommended_action,
            RecommendedAction::RetryWithMoreEvidence
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let (reasoner, _) = reasoner(vec![
            ReplayStep::RateLimited,
            ReplayStep::RateLimited,
            ReplayStep::Response(reply(0.4, &[RETRIEVED_ID])),
        ]);
        let result = run(&reasoner).await.unwrap();
        assert_eq!(result.provider_calls, 3);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let (reasoner, provider) = reasoner(vec![
            ReplayStep::Error(ProviderError::HttpError("connection reset".to_string())),
            ReplayStep::Response(reply(0.4, &[RETRIEVED_ID])),
        ]);
        let failure = StageFailure::from(run(&reasoner).await.unwrap_err());
        assert_eq!(failure.error_type, ErrorType::UnknownFailure);
        assert_eq!(failure.recommended_action, RecommendedAction::SystemDebug);
        assert_eq!(provider.remaining(), 1);
    }

    struct StalledProvider;

    #[async_trait]
    impl LlmProvider for StalledProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::HttpError("unreachable".to_string()))
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transport_failure() {
        let reasoner = ConstrainedReasoner::new(Arc::new(StalledProvider), ReasonerConfig::default());
        let err = run(&reasoner).await.unwrap_err();
        assert!(matches!(
            err,
            ReasonerError::Provider(ProviderError::Timeout(d)) if d == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_prompt() {
        let provider = Arc::new(ReplayProvider::new(vec![ReplayStep::Response(reply(
            0.7,
            &[RETRIEVED_ID],
        ))]));
        let reasoner = ConstrainedReasoner::new(provider.clone(), ReasonerConfig::default())
            .with_cache(Arc::new(ResponseCache::default()));

        let first = run(&reasoner).await.unwrap();
        let second = run(&reasoner).await.unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.provider_calls, 0);
        assert_eq!(first.prior_art_matches, second.prior_art_matches);
    }
}
