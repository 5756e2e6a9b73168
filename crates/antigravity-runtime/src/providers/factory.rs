//! Named provider construction.
//!
//! The config file and the CLI pick a provider by `kind`. Each kind has a
//! [`ProviderFactory`] that turns the free-form `options` object of
//! `provider:` into a ready provider.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};

/// Builds one kind of provider from its `options`.
pub trait ProviderFactory: Send + Sync {
    /// Name used in `provider.kind`, e.g. "gemini" or "replay".
    fn kind(&self) -> &'static str;

    /// One line for `check-config` and error messages.
    fn summary(&self) -> &'static str;

    /// Reject options the provider could not start with. Must not do I/O
    /// beyond reading the environment.
    fn check(&self, options: &JsonValue) -> Result<(), ProviderError>;

    fn build(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;
}

/// The provider kinds compiled into this build.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: Vec<Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay always; Gemini with the `gemini` feature.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::ReplayProviderFactory));
        #[cfg(feature = "gemini")]
        registry.register(Arc::new(super::GeminiProviderFactory));
        registry
    }

    /// Add a factory. A later factory of the same kind wins.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.retain(|f| f.kind() != factory.kind());
        self.factories.push(factory);
    }

    pub fn has_provider(&self, kind: &str) -> bool {
        self.factories.iter().any(|f| f.kind() == kind)
    }

    /// Registered kinds, sorted.
    pub fn available_types(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.iter().map(|f| f.kind()).collect();
        kinds.sort_unstable();
        kinds
    }

    /// `(kind, summary)` for every registered kind, sorted by kind.
    pub fn summaries(&self) -> Vec<(&'static str, &'static str)> {
        let mut rows: Vec<_> = self
            .factories
            .iter()
            .map(|f| (f.kind(), f.summary()))
            .collect();
        rows.sort_unstable();
        rows
    }

    pub fn validate(&self, kind: &str, options: &JsonValue) -> Result<(), ProviderError> {
        self.lookup(kind)?.check(options)
    }

    /// Check `options`, then build the provider.
    pub fn create(
        &self,
        kind: &str,
        options: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.lookup(kind)?;
        factory.check(options)?;
        let provider = factory.build(options)?;
        tracing::debug!(kind, provider = provider.name(), "Provider created");
        Ok(provider)
    }

    /// Like [`create`](Self::create), but refuses a provider whose health
    /// check fails.
    pub async fn create_ready(
        &self,
        kind: &str,
        options: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider = self.create(kind, options)?;
        if !provider.health_check().await {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{}' failed its health check",
                provider.name()
            )));
        }
        Ok(provider)
    }

    fn lookup(&self, kind: &str) -> Result<&dyn ProviderFactory, ProviderError> {
        self.factories
            .iter()
            .find(|f| f.kind() == kind)
            .map(|f| f.as_ref())
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "no provider of kind '{}' in this build (available: {})",
                    kind,
                    self.available_types().join(", ")
                ))
            })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.available_types()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ReplayProvider;

    /// Replay under another kind name, with a required `label` option.
    struct LabelledReplay(&'static str);

    impl ProviderFactory for LabelledReplay {
        fn kind(&self) -> &'static str {
            self.0
        }

        fn summary(&self) -> &'static str {
            "test replay"
        }

        fn check(&self, options: &JsonValue) -> Result<(), ProviderError> {
            match options["label"].as_str() {
                Some(_) => Ok(()),
                None => Err(ProviderError::NotConfigured("label required".into())),
            }
        }

        fn build(&self, _options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            Ok(Arc::new(ReplayProvider::from_responses(Vec::<String>::new())))
        }
    }

    #[test]
    fn test_create_checks_options_first() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(LabelledReplay("scripted")));

        assert!(registry.has_provider("scripted"));
        assert!(matches!(
            registry.create("scripted", &serde_json::json!({})),
            Err(ProviderError::NotConfigured(_))
        ));
        let provider = registry
            .create("scripted", &serde_json::json!({"label": "x"}))
            .unwrap();
        assert_eq!(provider.name(), "replay");
    }

    #[tokio::test]
    async fn test_create_ready_runs_health_check() {
        let registry = ProviderRegistry::with_defaults();

        let ready = registry
            .create_ready("replay", &serde_json::json!({"responses": ["{}"]}))
            .await
            .unwrap();
        assert_eq!(ready.name(), "replay");

        match registry
            .create_ready("replay", &serde_json::json!({"responses": []}))
            .await
        {
            Err(ProviderError::NotConfigured(msg)) => assert!(msg.contains("health check")),
            other => panic!("expected NotConfigured, got {:?}", other.map(|p| p.name().to_string())),
        }
    }

    #[test]
    fn test_unknown_kind_lists_available() {
        let registry = ProviderRegistry::with_defaults();
        match registry.validate("openai", &serde_json::json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("'openai'"));
                assert!(msg.contains("replay"));
            }
            other => panic!("expected NotConfigured, got {:?}", other),
        }
    }

    #[test]
    fn test_register_replaces_same_kind() {
        let mut registry = ProviderRegistry::with_defaults();
        let before = registry.available_types().len();
        registry.register(Arc::new(LabelledReplay("replay")));

        assert_eq!(registry.available_types().len(), before);
        assert!(registry.summaries().contains(&("replay", "test replay")));
        assert!(format!("{:?}", registry).contains("replay"));
    }
}
