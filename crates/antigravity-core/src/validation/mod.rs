//! Input and output gates.

mod input;
mod output;
pub mod schema;

pub use input::{InputError, InputValidator, DEFAULT_MAX_TEXT_CHARS, DEFAULT_MAX_TITLE_CHARS};
pub use output::{is_placeholder, OutputValidator, OutputViolation, PLACEHOLDER_TOKENS};
