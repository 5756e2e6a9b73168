//! Evidence suppliers.
//!
//! Document extraction and retrieval live outside the pipeline. They plug in
//! through [`EvidenceSupplier`] and hand over raw text; the retrieval stage
//! registers everything they return and then seals the registry.

use async_trait::async_trait;
use antigravity_core::{AnalysisRequest, EvidenceSource};
use thiserror::Error;

/// Errors from evidence suppliers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SupplierError {
    #[error("Evidence supplier '{supplier}' failed: {message}")]
    Failed { supplier: String, message: String },
}

/// One piece of raw evidence text and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SuppliedEvidence {
    pub source: EvidenceSource,
    pub text: String,
}

impl SuppliedEvidence {
    pub fn new(source: EvidenceSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }

    pub fn retrieved(text: impl Into<String>) -> Self {
        Self::new(EvidenceSource::Retrieved, text)
    }

    pub fn external(text: impl Into<String>) -> Self {
        Self::new(EvidenceSource::External, text)
    }
}

/// Source of evidence text for a run.
///
/// Suppliers run during the retrieval stage only. They must not keep
/// per-run state between calls; the same supplier serves concurrent runs.
#[async_trait]
pub trait EvidenceSupplier: Send + Sync {
    /// Evidence for this request, in the order it should be registered.
    async fn supply(&self, request: &AnalysisRequest)
        -> Result<Vec<SuppliedEvidence>, SupplierError>;

    fn name(&self) -> &str;
}

/// Registers the request text itself as `user_input` evidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestTextSupplier;

#[async_trait]
impl EvidenceSupplier for RequestTextSupplier {
    async fn supply(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Vec<SuppliedEvidence>, SupplierError> {
        Ok(vec![SuppliedEvidence::new(
            EvidenceSource::UserInput,
            request.text(),
        )])
    }

    fn name(&self) -> &str {
        "request_text"
    }
}

/// Fixed evidence, the same for every request.
#[derive(Debug, Clone, Default)]
pub struct StaticEvidenceSupplier {
    name: String,
    items: Vec<SuppliedEvidence>,
}

impl StaticEvidenceSupplier {
    pub fn new(name: impl Into<String>, items: Vec<SuppliedEvidence>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    /// Supplier of `retrieved` items, one per text.
    pub fn retrieved<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            "static_retrieved",
            texts.into_iter().map(SuppliedEvidence::retrieved).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl EvidenceSupplier for StaticEvidenceSupplier {
    async fn supply(
        &self,
        _request: &AnalysisRequest,
    ) -> Result<Vec<SuppliedEvidence>, SupplierError> {
        Ok(self.items.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
