//! API keys for hosted providers.
//!
//! A key is wrapped in [`SecretString`] as soon as it is read and only
//! unwrapped while a request header is built. Debug and Display print the
//! key's label and origin, never the key.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;

use super::ProviderError;

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The `provider.options` object of the config
    Options,
    Environment,
    /// Passed directly to a provider constructor
    Inline,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Options => "provider options",
            CredentialSource::Environment => "environment",
            CredentialSource::Inline => "inline",
        })
    }
}

/// How a provider looks up its key: an options field first, then an
/// environment variable. Blank values count as missing.
#[derive(Debug, Clone, Copy)]
pub struct CredentialLookup {
    pub label: &'static str,
    pub option_key: &'static str,
    pub env_var: &'static str,
}

impl CredentialLookup {
    pub const fn new(label: &'static str, option_key: &'static str, env_var: &'static str) -> Self {
        Self {
            label,
            option_key,
            env_var,
        }
    }

    pub fn resolve(&self, options: &JsonValue) -> Result<ApiCredential, ProviderError> {
        if let Some(value) = self.in_options(options) {
            return Ok(ApiCredential::new(value, CredentialSource::Options, self.label));
        }
        if let Some(value) = self.in_env() {
            return Ok(ApiCredential::new(value, CredentialSource::Environment, self.label));
        }
        Err(ProviderError::NotConfigured(format!(
            "{} missing: set provider.options.{} or {}",
            self.label, self.option_key, self.env_var
        )))
    }

    /// Whether [`resolve`](Self::resolve) would succeed.
    pub fn is_resolvable(&self, options: &JsonValue) -> bool {
        self.in_options(options).is_some() || self.in_env().is_some()
    }

    fn in_options<'a>(&self, options: &'a JsonValue) -> Option<&'a str> {
        options[self.option_key]
            .as_str()
            .filter(|v| !v.trim().is_empty())
    }

    fn in_env(&self) -> Option<String> {
        std::env::var(self.env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

/// A provider API key.
pub struct ApiCredential {
    secret: SecretString,
    source: CredentialSource,
    label: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            source,
            label,
        }
    }

    pub fn inline(value: impl Into<String>, label: &'static str) -> Self {
        Self::new(value, CredentialSource::Inline, label)
    }

    /// The raw key, for a request header. Do not keep the borrow around.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.secret.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("label", &self.label)
            .field("source", &self.source)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [REDACTED]", self.label, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const UNSET: CredentialLookup =
        CredentialLookup::new("Test key", "api_key", "ANTIGRAVITY_TEST_UNSET_KEY");

    #[test]
    fn test_never_printed() {
        let secret = "AIza-do-not-print-0042";
        let cred = ApiCredential::inline(secret, "Gemini API key");

        assert!(!format!("{:?}", cred).contains(secret));
        assert!(!format!("{}", cred).contains(secret));
        assert_eq!(format!("{}", cred), "Gemini API key (inline) [REDACTED]");
        assert_eq!(cred.expose(), secret);
    }

    #[test]
    fn test_options_win_over_environment() {
        let lookup = CredentialLookup::new("Test key", "api_key", "ANTIGRAVITY_TEST_KEY_ORDER");
        std::env::set_var(lookup.env_var, "from-env");

        let from_options = lookup.resolve(&json!({"api_key": "from-options"})).unwrap();
        let from_env = lookup.resolve(&json!({"api_key": "  "})).unwrap();
        std::env::remove_var(lookup.env_var);

        assert_eq!(from_options.expose(), "from-options");
        assert_eq!(from_options.source(), CredentialSource::Options);
        assert_eq!(from_env.expose(), "from-env");
        assert_eq!(from_env.source(), CredentialSource::Environment);
    }

    #[test]
    fn test_missing_key_names_both_places() {
        let err = UNSET.resolve(&json!({})).unwrap_err().to_string();
        assert!(err.contains("provider.options.api_key"));
        assert!(err.contains("ANTIGRAVITY_TEST_UNSET_KEY"));

        assert!(!UNSET.is_resolvable(&json!({"api_key": ""})));
        assert!(UNSET.is_resolvable(&json!({"api_key": "k"})));
    }
}
