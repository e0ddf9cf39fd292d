//! Recovery of a JSON object embedded in free-form model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

// Greedy on purpose: first `{` through last `}`, no brace balancing.
static JSON_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Extracts the JSON object found between the first `{` and the last `}` of
/// `text`.
///
/// Returns an empty map when no such span exists or when the span is not
/// valid JSON. Both cases are logged at warn level; nothing is returned as an
/// error, so callers treat an empty map as "nothing recovered".
///
/// Text holding several objects (`{"a":1} noise {"b":2}`) is captured as one
/// span and therefore fails to parse.
pub fn extract_json_from_text(text: &str) -> Map<String, Value> {
    let span = JSON_SPAN.find(text).map(|found| found.as_str());

    if let Some(segment) = span {
        match serde_json::from_str::<Map<String, Value>>(segment) {
            Ok(object) => return object,
            Err(err) => {
                warn!("Could not decode JSON from text segment: {segment} - Error: {err}");
            }
        }
    }

    warn!("No valid JSON found in the text.");
    Map::new()
}
