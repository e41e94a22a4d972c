//! Classification and filename-suggestion prompts plus their response parsers.
//!
//! Classification output must parse: a document we cannot categorize cannot be renamed or
//! extracted, so an unparseable response is a hard stage failure. The suggested-name
//! response, by contrast, degrades to the literal `"document"`.

use crate::store::DocType;
use serde_json::Value;

pub(crate) const CLASSIFICATION_PROMPT: &str = "\
Classify this image/document into one of these categories (exact string values):
- Invoice
- Receipt
- Flight Ticket
- Order Confirmation
- Other

Respond with JSON only in this format:
{
  \"docType\": \"<one of the categories above>\",
  \"confidence\": <number between 0 and 1>
}

Return JSON only.";

pub(crate) fn filename_prompt(original_file_name: &str) -> String {
    format!(
        "Based on the content of this image/document, suggest a short descriptive filename \
stem (no extension). Include discriminative info such as vendor/store, destination, order \
number, etc. The original filename is: {original_file_name}.

Respond with JSON only in this format:
{{
  \"betterName\": \"<concise English filename stem without extension>\"
}}

Return JSON only."
    )
}

/// Parse the classification response into a canonical type and confidence.
///
/// Returns `None` when the response is not JSON; the caller treats that as a stage
/// failure. A missing or malformed confidence defaults to 0.
pub(crate) fn parse_classification(raw: &str) -> Option<(DocType, f64)> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let doc_type = value
        .get("docType")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("Other");
    let confidence = value
        .get("confidence")
        .map(lenient_number)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    Some((DocType::normalize(doc_type), confidence))
}

/// Parse the suggested-name response, falling back to `"document"`.
pub(crate) fn parse_better_name(raw: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return "document".to_string();
    };
    if let Some(name) = value.get("betterName").and_then(Value::as_str)
        && !name.trim().is_empty()
    {
        return name.trim().to_string();
    }
    // Some models answer with a full filename instead of a stem.
    if let Some(file_name) = value.get("alternativeFilename").and_then(Value::as_str) {
        let stem = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(file_name)
            .trim();
        if !stem.is_empty() {
            return stem.to_string();
        }
    }
    "document".to_string()
}

/// Accept numbers serialized either as JSON numbers or as strings.
pub(crate) fn lenient_number(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
