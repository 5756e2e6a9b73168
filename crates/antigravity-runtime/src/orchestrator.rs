//! Pipeline orchestrator.
//!
//! Sequences the six stages of a run:
//!
//! ```text
//! input_validation -> retrieval -> similarity -> reasoning -> verification -> output_generation
//! ```
//!
//! Each stage outcome is threaded through a [`StageMachine`]. The first
//! failure ends the run with a [`CrashLog`]; passing every stage ends it with
//! a validated [`SuccessEnvelope`]. A run never yields both, and never
//! neither unless it was cancelled. Only [`Pipeline::run_cancellable`] can
//! be cancelled; the type of [`Pipeline::run`] rules the third outcome out.
//!
//! Runs share nothing except the audit logger, so one [`Pipeline`] can serve
//! any number of concurrent tasks.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use antigravity_core::{
    assess_risk, scope_disclaimer, AnalysisRequest, CandidateOverlap, ConceptSet,
    ConfidenceLevel, ConfidenceScorer, ConfidenceSignals, CrashLog, DeterministicAnalyzer,
    ErrorType, EvidenceRegistry, EvidenceState, InferredRisk, InputValidator, ObservedOverlap,
    OutputValidator, PipelineOutput, ProjectType, RawAnalysisRequest, RecommendedAction,
    RiskAssessment, StageFailure, StageMachine, StageOutcome, SuccessEnvelope,
    HUMAN_REVIEW_RECOMMENDATION,
};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use thiserror::Error;
use tracing::Instrument;

use crate::audit::{self, digest, AuditLogger, AuditRecord, RunOutcome, StageRecord, StageStatus};
use crate::cache::ResponseCache;
use crate::config::{ConfigError, PipelineConfig};
use crate::providers::{LlmProvider, ProviderError, ProviderRegistry, TokenUsage};
use crate::reasoner::{ConstrainedReasoner, ReasoningResult};
use crate::supplier::{EvidenceSupplier, RequestTextSupplier};

/// Unknown carried by every envelope: the comparison is closed over the
/// registered evidence.
pub const SCOPE_UNKNOWN: &str = "Prior art outside the registered evidence was not searched.";

/// Errors from assembling a [`Pipeline`].
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not create provider: {0}")]
    Provider(#[from] ProviderError),
}

/// Cooperative cancellation, checked at every stage boundary.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    providers: ProviderRegistry,
    suppliers: Vec<Arc<dyn EvidenceSupplier>>,
    audit: Option<Arc<AuditLogger>>,
}

impl PipelineBuilder {
    fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            provider: None,
            providers: ProviderRegistry::with_defaults(),
            suppliers: vec![Arc::new(RequestTextSupplier)],
            audit: None,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this provider instead of creating one from `config.provider`.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Registry used to create the configured provider.
    pub fn provider_registry(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Add a supplier after the existing ones.
    pub fn evidence_supplier(mut self, supplier: Arc<dyn EvidenceSupplier>) -> Self {
        self.suppliers.push(supplier);
        self
    }

    /// Replace every supplier, including the default request-text supplier.
    pub fn replace_suppliers(mut self, suppliers: Vec<Arc<dyn EvidenceSupplier>>) -> Self {
        self.suppliers = suppliers;
        self
    }

    /// Audit logger for this pipeline. Falls back to the global logger.
    pub fn audit_logger(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn build(self) -> Result<Pipeline, BuildError> {
        let config = self.config;
        config.validate()?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => self
                .providers
                .create(&config.provider.kind, &config.provider.options)?,
        };

        let mut reasoner = ConstrainedReasoner::new(provider, config.reasoner_config());
        if config.cache.enabled {
            reasoner = reasoner.with_cache(Arc::new(ResponseCache::new(
                config.cache.max_entries,
                config.cache.ttl,
            )));
        }

        tracing::debug!(
            provider = reasoner.provider_name(),
            suppliers = self.suppliers.len(),
            min_confidence = %config.scoring.min_confidence,
            "Pipeline built"
        );

        Ok(Pipeline {
            input_validator: config.input_validator(),
            analyzer: DeterministicAnalyzer::new(config.analyzer_config()),
            reasoner,
            scorer: ConfidenceScorer::new(config.confidence_thresholds()),
            output_validator: OutputValidator::new(),
            min_confidence: config.scoring.min_confidence,
            suppliers: self.suppliers,
            audit: self.audit.or_else(audit::global),
            sequence: AtomicU64::new(0),
        })
    }
}

/// The evidence-locked analysis pipeline.
pub struct Pipeline {
    input_validator: InputValidator,
    analyzer: DeterministicAnalyzer,
    reasoner: ConstrainedReasoner,
    scorer: ConfidenceScorer,
    output_validator: OutputValidator,
    min_confidence: ConfidenceLevel,
    suppliers: Vec<Arc<dyn EvidenceSupplier>>,
    audit: Option<Arc<AuditLogger>>,
    sequence: AtomicU64,
}

/// What can stop a run between stages.
trait Cancellation {
    /// Yielded instead of an output by a stopped run.
    type Stopped;

    fn stopped(&self) -> Option<Self::Stopped>;
}

/// A run nothing can stop.
struct Uncancellable;

impl Cancellation for Uncancellable {
    type Stopped = Infallible;

    fn stopped(&self) -> Option<Infallible> {
        None
    }
}

/// A run stopped through its [`CancelToken`].
struct Cancelled;

impl Cancellation for &CancelToken {
    type Stopped = Cancelled;

    fn stopped(&self) -> Option<Cancelled> {
        self.is_cancelled().then_some(Cancelled)
    }
}

/// Why the stage sequence stopped early.
enum Halt<S> {
    Crashed(CrashLog),
    Stopped(S),
}

/// What verification hands to output generation.
struct Verified {
    risk: RiskAssessment,
    level: ConfidenceLevel,

    /// Numeric confidence, attached to any later failure
    score: f64,
}

/// Per-run mutable state.
struct RunContext<C> {
    machine: StageMachine,
    registry: EvidenceRegistry,
    stages: Vec<StageRecord>,
    cancel: C,
    project_type: Option<ProjectType>,
    confidence: Option<ConfidenceLevel>,
    provider: Option<String>,
    usage: Option<TokenUsage>,
}

impl<C: Cancellation> RunContext<C> {
    fn new(started_at: DateTime<Utc>, cancel: C) -> Self {
        Self {
            machine: StageMachine::new(),
            registry: EvidenceRegistry::starting_at(started_at),
            stages: Vec::new(),
            cancel,
            project_type: None,
            confidence: None,
            provider: None,
            usage: None,
        }
    }

    fn checkpoint(&self) -> Result<(), Halt<C::Stopped>> {
        match self.cancel.stopped() {
            Some(stopped) => {
                tracing::info!(stage = ?self.machine.current(), "Run cancelled at stage boundary");
                Err(Halt::Stopped(stopped))
            }
            None => Ok(()),
        }
    }

    /// Feed one stage outcome to the machine and time it.
    fn record<T>(
        &mut self,
        started: Instant,
        outcome: StageOutcome<T>,
        describe: impl FnOnce(&T) -> String,
    ) -> Result<T, Halt<C::Stopped>> {
        let stage = self.machine.current();
        let result = self
            .machine
            .settle(outcome, describe, self.registry.state());

        if let Some(stage) = stage {
            self.stages.push(StageRecord {
                stage,
                status: if result.is_ok() {
                    StageStatus::Passed
                } else {
                    StageStatus::Failed
                },
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        result.map_err(Halt::Crashed)
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn provider_name(&self) -> &str {
        self.reasoner.provider_name()
    }

    /// Run the pipeline to completion.
    ///
    /// Always yields exactly one of a success envelope or a crash log.
    pub async fn run(&self, raw: &RawAnalysisRequest) -> PipelineOutput {
        match self.execute(raw, Uncancellable).await {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }

    /// Run the pipeline, stopping at the next stage boundary once `cancel`
    /// fires. A cancelled run yields `None` and emits no envelope.
    pub async fn run_cancellable(
        &self,
        raw: &RawAnalysisRequest,
        cancel: &CancelToken,
    ) -> Option<PipelineOutput> {
        self.execute(raw, cancel).await.ok()
    }

    async fn execute<C: Cancellation>(
        &self,
        raw: &RawAnalysisRequest,
        cancel: C,
    ) -> Result<PipelineOutput, C::Stopped> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_id = format!(
            "RUN-{}-{:06}",
            started_at.format("%Y%m%d%H%M%S"),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );

        let span = tracing::info_span!("pipeline_run", run_id = %run_id);
        async move {
            let mut ctx = RunContext::new(started_at, cancel);

            let result = match self.stages(raw, &mut ctx).await {
                Ok(envelope) => Ok(PipelineOutput::Success(envelope)),
                Err(Halt::Crashed(crash)) => Ok(PipelineOutput::Crash(crash)),
                Err(Halt::Stopped(stopped)) => Err(stopped),
            };

            let elapsed_ms = clock.elapsed().as_millis() as u64;
            match &result {
                Ok(PipelineOutput::Success(envelope)) => tracing::info!(
                    outcome = "SUCCESS",
                    confidence = %envelope.confidence,
                    band = %envelope.inferred_risk.band,
                    elapsed_ms,
                    "Pipeline run finished"
                ),
                Ok(PipelineOutput::Crash(crash)) => tracing::info!(
                    outcome = "CRASH",
                    error_type = %crash.error_type,
                    failed_stage = %crash.failed_stage,
                    elapsed_ms,
                    "Pipeline run finished"
                ),
                Err(_) => tracing::info!(outcome = "CANCELLED", elapsed_ms, "Pipeline run finished"),
            }

            self.audit(&run_id, raw, &ctx, result.as_ref().ok(), started_at, elapsed_ms);
            result
        }
        .instrument(span)
        .await
    }

    async fn stages<C: Cancellation>(
        &self,
        raw: &RawAnalysisRequest,
        ctx: &mut RunContext<C>,
    ) -> Result<SuccessEnvelope, Halt<C::Stopped>> {
        ctx.checkpoint()?;
        let started = Instant::now();
        let outcome = self.input_validator.validate(raw).map_err(StageFailure::from);
        let request = ctx.record(started, outcome, |r| {
            format!(
                "accepted {} request of {} chars",
                r.project_type(),
                r.text().chars().count()
            )
        })?;
        ctx.project_type = Some(request.project_type());

        ctx.checkpoint()?;
        let started = Instant::now();
        let outcome = self.retrieve(&request, &mut ctx.registry).await;
        ctx.record(started, outcome, |n| format!("{} evidence items registered", n))?;

        ctx.checkpoint()?;
        let started = Instant::now();
        let outcome = self.similarity(&request, &ctx.registry);
        let (concepts, overlaps) = ctx.record(started, outcome, |(concepts, overlaps)| {
            format!(
                "{} concepts, {} candidate overlaps",
                concepts.len(),
                overlaps.len()
            )
        })?;

        ctx.checkpoint()?;
        let started = Instant::now();
        ctx.provider = Some(self.reasoner.provider_name().to_string());
        let outcome = self
            .reasoner
            .reason(&request, &concepts, &overlaps, &ctx.registry)
            .await
            .map_err(StageFailure::from);
        if let Ok(result) = &outcome {
            ctx.usage = Some(result.usage);
        }
        let reasoning = ctx.record(started, outcome, |r| {
            format!(
                "{} matches, {} novel aspects, {} provider calls{}",
                r.prior_art_matches.len(),
                r.novel_aspects.len(),
                r.provider_calls,
                if r.cached { " (cached)" } else { "" }
            )
        })?;

        ctx.checkpoint()?;
        let started = Instant::now();
        let outcome = self.verify(&reasoning, &ctx.registry);
        if let Ok(verified) = &outcome {
            ctx.confidence = Some(verified.level);
        }
        let verified = ctx.record(started, outcome, |v| {
            format!(
                "risk {} ({:.2}), confidence {}",
                v.risk.band, v.risk.score, v.level
            )
        })?;

        ctx.checkpoint()?;
        let started = Instant::now();
        let envelope = self.compose(&request, &overlaps, &reasoning, &verified, &ctx.registry);
        let outcome = self.gate(envelope, &ctx.registry, verified.score);
        ctx.record(started, outcome, |e| {
            format!("{} evidence references", e.evidence_references.len())
        })
    }

    /// Collect evidence from every supplier, register it and seal the registry.
    async fn retrieve(
        &self,
        request: &AnalysisRequest,
        registry: &mut EvidenceRegistry,
    ) -> StageOutcome<usize> {
        let batches = try_join_all(self.suppliers.iter().map(|s| s.supply(request)))
            .await
            .map_err(|e| {
                StageFailure::new(
                    ErrorType::EvidenceMissing,
                    e.to_string(),
                    RecommendedAction::RetryWithMoreEvidence,
                )
            })?;

        for item in batches.into_iter().flatten() {
            registry
                .register(item.source, item.text)
                .map_err(|e| StageFailure::of(ErrorType::InternalInconsistency, e.to_string()))?;
        }
        registry.seal();

        let state = registry.state();
        if !state.provided {
            return Err(StageFailure::of(
                ErrorType::EvidenceMissing,
                "No evidence was registered for this run",
            ));
        }
        if !state.usable {
            return Err(StageFailure::of(
                ErrorType::EvidenceMissing,
                "Registered evidence is empty or whitespace only",
            ));
        }

        Ok(registry.len())
    }

    fn similarity(
        &self,
        request: &AnalysisRequest,
        registry: &EvidenceRegistry,
    ) -> StageOutcome<(ConceptSet, Vec<CandidateOverlap>)> {
        let mut concepts = self.analyzer.analyze_request(request)?;
        let overlaps = self.analyzer.candidate_overlaps(&concepts, registry);
        concepts.mark_known(&overlaps);
        Ok((concepts, overlaps))
    }

    /// Score confidence, then check the claims. Every failure from here on
    /// carries the computed score.
    fn verify(
        &self,
        reasoning: &ReasoningResult,
        registry: &EvidenceRegistry,
    ) -> StageOutcome<Verified> {
        let state = registry.state();
        let signals = ConfidenceSignals {
            evidence_usable: state.usable,
            evidence_chars: registry.usable_chars(),
            certainty: reasoning.certainty,
            hedged_fields: reasoning.hedged_fields(),
            reported_unknowns: reasoning.unknowns.len(),
        };
        let score = signals.score();
        let level = self.scorer.level(&signals);

        let cited = reasoning
            .prior_art_matches
            .iter()
            .flat_map(|m| m.evidence_ids.iter())
            .chain(reasoning.novel_aspects.iter().flat_map(|a| a.evidence_ids.iter()));
        for id in cited {
            if !registry.contains(id) {
                return Err(StageFailure::of(
                    ErrorType::InternalInconsistency,
                    format!("Claim cites unregistered evidence id '{}'", id),
                )
                .with_confidence(score));
            }
        }

        if level < self.min_confidence {
            return Err(StageFailure::new(
                ErrorType::LowConfidence,
                format!(
                    "Confidence {} is below the required minimum {}",
                    level, self.min_confidence
                ),
                RecommendedAction::HumanReview,
            )
            .with_confidence(score));
        }

        Ok(Verified {
            risk: assess_risk(&reasoning.prior_art_matches),
            level,
            score,
        })
    }

    fn compose(
        &self,
        request: &AnalysisRequest,
        overlaps: &[CandidateOverlap],
        reasoning: &ReasoningResult,
        verified: &Verified,
        registry: &EvidenceRegistry,
    ) -> SuccessEnvelope {
        let project_type = request.project_type();

        let summary = reasoning.summary.clone().unwrap_or_else(|| {
            format!(
                "The reasoner could not summarize how the submitted {} relates to the \
                 registered evidence; only the evidence-backed items below were observed.",
                project_type.work_label()
            )
        });

        let mut recommendations = reasoning.recommendations.clone();
        if verified.level == ConfidenceLevel::Low
            && !recommendations.iter().any(|r| r == HUMAN_REVIEW_RECOMMENDATION)
        {
            recommendations.push(HUMAN_REVIEW_RECOMMENDATION.to_string());
        }

        SuccessEnvelope {
            evidence_references: registry
                .items()
                .iter()
                .filter(|i| i.is_usable())
                .map(|i| i.reference())
                .collect(),
            confidence: verified.level,
            scope_disclaimer: scope_disclaimer(verified.level, project_type),
            observed_overlap: ObservedOverlap {
                summary,
                prior_art_matches: reasoning.prior_art_matches.clone(),
                overlapping_aspects: ObservedOverlap::overlapping_aspects_of(
                    &reasoning.prior_art_matches,
                ),
                novel_aspects: reasoning.novel_aspects.clone(),
                candidate_overlaps: overlaps.to_vec(),
            },
            inferred_risk: InferredRisk {
                band: verified.risk.band,
                score: verified.risk.score,
                basis: risk_basis(reasoning, &verified.risk),
                recommendations,
            },
            unknowns: unknowns(reasoning, registry.state(), project_type),
        }
    }

    /// Output gate: nothing leaves the pipeline without passing it.
    fn gate(
        &self,
        envelope: SuccessEnvelope,
        registry: &EvidenceRegistry,
        confidence_score: f64,
    ) -> StageOutcome<SuccessEnvelope> {
        self.output_validator
            .validate(&envelope, registry)
            .map_err(|violation| StageFailure::from(violation).with_confidence(confidence_score))?;
        Ok(envelope)
    }

    fn audit<C>(
        &self,
        run_id: &str,
        raw: &RawAnalysisRequest,
        ctx: &RunContext<C>,
        output: Option<&PipelineOutput>,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) {
        let Some(logger) = &self.audit else {
            return;
        };

        let crash = output.and_then(PipelineOutput::as_crash);
        let record = AuditRecord {
            run_id: run_id.to_string(),
            action: "analyze".to_string(),
            started_at,
            finished_at: Utc::now(),
            elapsed_ms,
            input_hash: digest(serde_json::to_vec(raw).unwrap_or_default()),
            output_hash: output
                .and_then(|o| serde_json::to_vec(o).ok())
                .map(digest),
            project_type: ctx.project_type,
            outcome: match output {
                Some(PipelineOutput::Success(_)) => RunOutcome::Success,
                Some(PipelineOutput::Crash(_)) => RunOutcome::Crash,
                None => RunOutcome::Cancelled,
            },
            error_type: crash.map(|c| c.error_type),
            failed_stage: crash.map(|c| c.failed_stage),
            stages: ctx.stages.clone(),
            evidence_ids: ctx
                .registry
                .items()
                .iter()
                .map(|i| i.id().to_string())
                .collect(),
            confidence: ctx.confidence,
            provider: ctx.provider.clone(),
            token_usage: ctx.usage,
        };

        if let Err(e) = logger.append(record) {
            tracing::warn!(run_id, error = %e, "Audit record dropped");
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("reasoner", &self.reasoner)
            .field("min_confidence", &self.min_confidence)
            .field(
                "suppliers",
                &self.suppliers.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

/// How the risk score was derived.
fn risk_basis(reasoning: &ReasoningResult, risk: &RiskAssessment) -> String {
    let strongest = reasoning.prior_art_matches.iter().max_by(|a, b| {
        a.similarity_score
            .partial_cmp(&b.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    match strongest {
        Some(m) => format!(
            "Maximum similarity score {:.2} across {} evidence-backed prior-art match(es), \
             strongest match cites {}; band {}.",
            risk.score,
            reasoning.prior_art_matches.len(),
            m.evidence_ids.iter().cloned().collect::<Vec<_>>().join(", "),
            risk.band
        ),
        None => format!(
            "No evidence-backed prior-art match was reported; risk score {:.2}, band {}.",
            risk.score, risk.band
        ),
    }
}

fn unknowns(reasoning: &ReasoningResult, state: EvidenceState, project_type: ProjectType) -> Vec<String> {
    let mut unknowns = reasoning.unknowns.clone();

    if reasoning.summary.is_none() {
        unknowns.push("The reasoner answered UNKNOWN for the overlap summary.".to_string());
    }
    if reasoning.certainty.is_none() {
        unknowns.push("The reasoner answered UNKNOWN for its certainty.".to_string());
    }
    if reasoning.dropped_claims > 0 {
        unknowns.push(format!(
            "{} claim(s) were dropped because they cited no registered evidence.",
            reasoning.dropped_claims
        ));
    }
    if state.retrieved_count == 0 {
        unknowns.push(format!(
            "No {} were registered; only the submitted text was analyzed.",
            project_type.prior_art_label()
        ));
    }
    unknowns.push(SCOPE_UNKNOWN.to_string());

    unknowns
}
