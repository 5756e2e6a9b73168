//! JSON Schema validation for success envelopes.
//!
//! Envelopes are validated against schemas/success_envelope.schema.json,
//! embedded at compile time and compiled once.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded envelope schema.
pub const SUCCESS_ENVELOPE_SCHEMA_JSON: &str =
    include_str!("../../../../schemas/success_envelope.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value =
            serde_json::from_str(SUCCESS_ENVELOPE_SCHEMA_JSON)
                .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a serialized envelope against the schema.
///
/// Returns every violation as `"<message> at <instance path>"`.
pub fn validate_envelope_schema(envelope_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(envelope_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
