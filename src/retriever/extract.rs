// JSON recovery from report text and console output

use crate::retriever::RetrievalError;
use serde_json::Value;
use tracing::info;

/// Parse a report artifact; it must hold one JSON object
pub fn parse_report(text: &str, origin: &str) -> Result<Value, RetrievalError> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| RetrievalError::MalformedPayload {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(RetrievalError::MalformedPayload {
            origin: origin.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    }
    log_summary(&value);
    Ok(value)
}

/// Parse the whole of `stdout` as one JSON document
pub fn parse_document(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Brace-delimited span from the first `{` to the last `}`
pub fn fragment(stdout: &str) -> Option<&str> {
    let start = stdout.find('{')?;
    let end = stdout.rfind('}')?;
    (end > start).then(|| &stdout[start..=end])
}

/// Locate and parse a JSON object embedded in console output.
///
/// `None` when there is no candidate span at all; `Some(Err)` when a span
/// was found but did not parse.
pub fn extract_fragment(stdout: &str) -> Option<Result<Value, RetrievalError>> {
    let candidate = fragment(stdout)?;
    Some(parse_report(candidate, "stdout"))
}

/// `summary.total` when the report carries one; diagnostics only
pub fn summary_total(report: &Value) -> Option<&Value> {
    report.get("summary")?.get("total")
}

fn log_summary(report: &Value) {
    match summary_total(report) {
        Some(total) => info!(total = %total, "report summary"),
        None => info!(total = "N/A", "report summary"),
    }
}
