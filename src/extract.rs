//! Response extraction: turn the model's free text into a validated value
//!
//! Models asked for "JSON only" still wrap replies in code fences and emit raw
//! backslashes inside strings (LaTeX is the usual culprit). Extraction:
//!
//! 1. Trim surrounding whitespace.
//! 2. Strip one leading fence (```` ``` ```` or ```` ```json ````) and one
//!    trailing fence, each only if present.
//! 3. Strictly parse against the schema.
//! 4. On failure, double every backslash and parse once more.
//! 5. Otherwise report [`Error::Validation`] with the first diagnostic.

use crate::schema::SchemaDescriptor;
use crate::{Error, Result};
use serde_json::Value;

const FENCE: &str = "```";

/// Extract a validated value from raw model output.
///
/// Never returns a partially populated value: the result either satisfies
/// `schema` completely or is an error.
///
/// # Examples
///
/// ```rust
/// use vlm_structured::{extract, schema};
///
/// let s = schema().field("markdown", "string").build();
/// let value = extract("```json\n{\"markdown\": \"hi\"}\n```", &s).unwrap();
/// assert_eq!(value, serde_json::json!({"markdown": "hi"}));
/// ```
pub fn extract(raw_text: &str, schema: &dyn SchemaDescriptor) -> Result<Value> {
    let text = strip_code_fences(raw_text);
    if text.is_empty() {
        return Err(Error::validation("empty response"));
    }

    let first_err = match schema.try_parse(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let repaired = escape_backslashes(text);
    match schema.try_parse(&repaired) {
        Ok(value) => {
            log::debug!("Response parsed after escaping backslashes");
            Ok(value)
        }
        Err(repair_err) => {
            log::debug!("Repair pass also failed: {}", repair_err);
            Err(match first_err {
                Error::Validation(_) => first_err,
                other => Error::validation(other.to_string()),
            })
        }
    }
}

/// Trim and strip at most one opening and one closing code fence.
///
/// The opening fence may carry a language tag (```` ```json ````). Either
/// side is stripped independently.
pub fn strip_code_fences(raw_text: &str) -> &str {
    let mut text = raw_text.trim();

    if let Some(rest) = text.strip_prefix(FENCE) {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
    }

    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest;
    }

    text.trim()
}

/// Double every literal backslash.
pub fn escape_backslashes(text: &str) -> String {
    text.replace('\\', "\\\\")
}
