//! Contract for raw reasoner output.
//!
//! The model's reply is checked twice: against
//! schemas/reasoner_output.schema.json, then by strict serde decoding into
//! [`RawReasonerOutput`]. Scores are deliberately unbounded here; range
//! handling happens after decoding so small overshoots can be clamped.

use std::sync::OnceLock;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Embedded reasoner output schema, also quoted verbatim in the prompt.
pub const REASONER_OUTPUT_SCHEMA_JSON: &str =
    include_str!("../../../../schemas/reasoner_output.schema.json");

/// Token the model must use instead of guessing.
pub const UNKNOWN_TOKEN: &str = "UNKNOWN";

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)^\s*```[A-Za-z]*[ \t]*\r?\n?(.*?)\s*```\s*$").unwrap();
}

/// Self-reported certainty: a number, or the literal `"UNKNOWN"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Certainty {
    Reported(f64),
    Unknown(UnknownMarker),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnknownMarker {
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMatch {
    pub similarity_score: f64,
    pub overlapping_concepts: Vec<String>,
    pub differentiating_aspects: Vec<String>,
    pub evidence_ids: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawNovelAspect {
    pub claim: String,
    pub evidence_ids: Vec<String>,
}

/// The reasoner's reply after decoding, before evidence checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawReasonerOutput {
    pub summary: String,
    pub certainty: Certainty,
    pub prior_art_matches: Vec<RawMatch>,
    pub novel_aspects: Vec<RawNovelAspect>,
    pub unknowns: Vec<String>,
    pub recommendations: Vec<String>,
}

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    COMPILED_SCHEMA
        .get_or_init(|| {
            let schema_value: serde_json::Value =
                serde_json::from_str(REASONER_OUTPUT_SCHEMA_JSON)
                    .map_err(|e| format!("Invalid schema JSON: {}", e))?;
            jsonschema::options()
                .build(&schema_value)
                .map_err(|e| format!("Failed to compile schema: {}", e))
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Parse a model reply into [`RawReasonerOutput`].
///
/// The error string is fed back to the model in the repair prompt.
pub fn parse_reasoner_output(content: &str) -> Result<RawReasonerOutput, String> {
    let body = strip_code_fences(content);

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("response is not valid JSON: {}", e))?;

    let validator = get_validator()?;
    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();
    if !errors.is_empty() {
        return Err(format!("schema violations: {}", errors.join("; ")));
    }

    serde_json::from_value(value).map_err(|e| format!("response does not decode: {}", e))
}
