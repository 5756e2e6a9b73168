//! Pipeline configuration.
//!
//! Loaded from YAML or JSON. Every key is optional; missing keys take the
//! defaults below. Durations use humantime notation (`30s`, `2m`, `1h`).
//!
//! ```yaml
//! reasoner:
//!   model: gemini-1.5-flash
//!   timeout: 30s
//!   initial_backoff: 2s
//! scoring:
//!   min_confidence: medium
//! cache:
//!   enabled: true
//!   ttl: 1h
//! audit:
//!   path: logs/audit.jsonl
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use antigravity_core::{
    AnalyzerConfig, ConfidenceLevel, ConfidenceThresholds, InputValidator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::reasoner::ReasonerConfig;
use crate::resilience::RetryPolicy;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub input: InputSettings,
    pub analyzer: AnalyzerSettings,
    pub reasoner: ReasonerSettings,
    pub provider: ProviderSettings,
    pub scoring: ScoringSettings,
    pub cache: CacheSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSettings {
    pub max_text_chars: usize,
    pub max_title_chars: usize,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            max_text_chars: antigravity_core::validation::DEFAULT_MAX_TEXT_CHARS,
            max_title_chars: antigravity_core::validation::DEFAULT_MAX_TITLE_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerSettings {
    /// Leading share of the text whose terms get the position boost
    pub opening_fraction: f64,
    pub position_boost: f64,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        let defaults = AnalyzerConfig::default();
        Self {
            opening_fraction: defaults.opening_fraction,
            position_boost: defaults.position_boost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReasonerSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Upper bound on a single provider call
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    pub max_rate_limit_retries: usize,

    /// First rate-limit delay; each further delay doubles
    #[serde(with = "humantime_duration")]
    pub initial_backoff: Duration,

    /// Largest distance outside [0, 1] a score may be clamped from
    pub score_tolerance: f64,
}

impl Default for ReasonerSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
            max_rate_limit_retries: 3,
            initial_backoff: Duration::from_secs(2),
            score_tolerance: 0.05,
        }
    }
}

/// Which provider backs the reasoner, and its provider-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    pub kind: String,
    pub options: JsonValue,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "gemini".to_string(),
            options: JsonValue::Object(Default::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringSettings {
    pub high_certainty_threshold: f64,
    pub low_certainty_threshold: f64,
    pub marginal_evidence_chars: usize,

    /// Runs below this confidence crash with LOW_CONFIDENCE
    pub min_confidence: ConfidenceLevel,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        let t = ConfidenceThresholds::default();
        Self {
            high_certainty_threshold: t.high_certainty,
            low_certainty_threshold: t.low_certainty,
            marginal_evidence_chars: t.marginal_evidence_chars,
            min_confidence: ConfidenceLevel::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSettings {
    /// JSONL file that receives one line per run; in-memory only when unset
    pub path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Reject values that cannot describe a working pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.input.max_text_chars == 0 {
            return invalid("input.max_text_chars must be positive".into());
        }
        if self.input.max_title_chars == 0 {
            return invalid("input.max_title_chars must be positive".into());
        }

        let fraction = self.analyzer.opening_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return invalid(format!(
                "analyzer.opening_fraction must be in (0, 1], got {}",
                fraction
            ));
        }
        if !(self.analyzer.position_boost >= 1.0) {
            return invalid(format!(
                "analyzer.position_boost must be at least 1.0, got {}",
                self.analyzer.position_boost
            ));
        }

        let r = &self.reasoner;
        if r.model.trim().is_empty() {
            return invalid("reasoner.model must not be empty".into());
        }
        if r.max_tokens == 0 {
            return invalid("reasoner.max_tokens must be positive".into());
        }
        if r.timeout.is_zero() {
            return invalid("reasoner.timeout must be positive".into());
        }
        if r.initial_backoff.is_zero() {
            return invalid("reasoner.initial_backoff must be positive".into());
        }
        if !(r.score_tolerance >= 0.0 && r.score_tolerance < 1.0) {
            return invalid(format!(
                "reasoner.score_tolerance must be in [0, 1), got {}",
                r.score_tolerance
            ));
        }

        let s = &self.scoring;
        for (name, value) in [
            ("scoring.high_certainty_threshold", s.high_certainty_threshold),
            ("scoring.low_certainty_threshold", s.low_certainty_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{} must be in [0, 1], got {}", name, value));
            }
        }
        if s.low_certainty_threshold >= s.high_certainty_threshold {
            return invalid(format!(
                "scoring.low_certainty_threshold ({}) must be below high_certainty_threshold ({})",
                s.low_certainty_threshold, s.high_certainty_threshold
            ));
        }

        if self.cache.enabled && (self.cache.max_entries == 0 || self.cache.ttl.is_zero()) {
            return invalid("cache.max_entries and cache.ttl must be positive when enabled".into());
        }

        if self.provider.kind.trim().is_empty() {
            return invalid("provider.kind must not be empty".into());
        }

        Ok(())
    }

    pub fn input_validator(&self) -> InputValidator {
        InputValidator::new(self.input.max_text_chars, self.input.max_title_chars)
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            opening_fraction: self.analyzer.opening_fraction,
            position_boost: self.analyzer.position_boost,
        }
    }

    pub fn confidence_thresholds(&self) -> ConfidenceThresholds {
        ConfidenceThresholds {
            high_certainty: self.scoring.high_certainty_threshold,
            low_certainty: self.scoring.low_certainty_threshold,
            marginal_evidence_chars: self.scoring.marginal_evidence_chars,
        }
    }

    pub fn reasoner_config(&self) -> ReasonerConfig {
        let r = &self.reasoner;
        ReasonerConfig {
            model: r.model.clone(),
            max_tokens: r.max_tokens,
            temperature: r.temperature,
            timeout: r.timeout,
            retry: RetryPolicy::new(r.max_rate_limit_retries, r.initial_backoff),
            score_tolerance: r.score_tolerance,
        }
    }
}

/// Serde adapter for humantime durations.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
