//! # antigravity-runtime
//!
//! The parts of the evidence-locked pipeline that touch the outside world:
//! the constrained reasoner and its providers, the audit trail, and the
//! orchestrator that runs the six stages.
//!
//! Everything deterministic lives in `antigravity-core`. This crate is where
//! the single non-deterministic call happens, and it never lets that call's
//! output past the evidence and schema checks.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use antigravity_core::RawAnalysisRequest;
//! use antigravity_runtime::{Pipeline, ReplayProvider, StaticEvidenceSupplier};
//!
//! let pipeline = Pipeline::builder()
//!     .provider(Arc::new(ReplayProvider::from_file("recordings/session.json")?))
//!     .evidence_supplier(Arc::new(StaticEvidenceSupplier::retrieved([prior_art])))
//!     .build()?;
//!
//! let output = pipeline
//!     .run(&RawAnalysisRequest::new(text, Some("Graphene Anode Cell"), "patent"))
//!     .await;
//! println!("{}", serde_json::to_string_pretty(&output)?);
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod reasoner;
pub mod resilience;
pub mod supplier;

pub use audit::{AuditError, AuditLogger, AuditRecord, AuditSink, JsonlFileAuditSink, MemoryAuditSink};
pub use cache::ResponseCache;
pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{BuildError, CancelToken, Pipeline, PipelineBuilder};
pub use providers::{
    LlmProvider, ProviderError, ProviderRegistry, ReplayProvider, ReplayStep, Role,
};
pub use reasoner::{ConstrainedReasoner, ReasonerConfig, ReasonerError, ReasoningResult};
pub use resilience::RetryPolicy;
pub use supplier::{
    EvidenceSupplier, RequestTextSupplier, StaticEvidenceSupplier, SuppliedEvidence,
    SupplierError,
};
