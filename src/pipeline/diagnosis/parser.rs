//! Locate and parse the JSON object embedded in free-form model text.
//!
//! Models wrap their answer in markdown fences, prose, or both. The scanner
//! tracks string literals so braces inside values do not end an object early,
//! and prefers the largest balanced span over the first one.

use serde_json::Value;

use super::adapter::truncate_chars;
use super::types::ProviderKind;
use super::ProviderError;

/// Upper bound on the raw text kept in `MalformedResponse` diagnostics.
pub const MAX_RAW_DIAGNOSTIC_CHARS: usize = 2_000;

/// Every top-level balanced `{...}` span, in order of appearance.
///
/// A single pass keeps a stack of open brace positions; a span is recorded
/// when its closing brace arrives. Braces left open at end of input are
/// dropped, so a stray `{` in leading prose cannot hide the real object.
/// Spans nested inside another recorded span are not returned.
pub fn find_json_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut open: Vec<usize> = Vec::new();
    let mut closed: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'{' => open.push(i),
            b'"' if !open.is_empty() => in_string = true,
            b'}' => {
                if let Some(start) = open.pop() {
                    closed.push((start, i));
                }
            }
            _ => {}
        }
    }

    // Inner spans close before their parents; order by start, parents first.
    closed.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    let mut spans = Vec::new();
    let mut covered_until: Option<usize> = None;
    for (start, end) in closed {
        if covered_until.is_some_and(|until| start <= until) {
            continue;
        }
        covered_until = Some(end);
        // Braces are ASCII, so both ends are char boundaries.
        spans.push(&text[start..=end]);
    }
    spans
}

/// The largest balanced `{...}` span (the first one on ties).
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut best: Option<&str> = None;
    for candidate in find_json_candidates(text) {
        if best.map_or(true, |b| candidate.len() > b.len()) {
            best = Some(candidate);
        }
    }
    best
}

/// Extract and parse the JSON object from a provider completion.
///
/// Candidates are tried largest first; the first one that parses as a JSON
/// object wins.
pub fn parse_provider_text(provider: ProviderKind, text: &str) -> Result<Value, ProviderError> {
    if text.trim().is_empty() {
        return Err(malformed(provider, "empty completion", text));
    }

    let mut candidates = find_json_candidates(text);
    if candidates.is_empty() {
        return Err(malformed(provider, "no JSON object found", text));
    }
    // Stable sort keeps appearance order among equal lengths.
    candidates.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut last_error = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => return Ok(value),
            Ok(_) => {}
            Err(e) => last_error = Some(e),
        }
    }

    let reason = match last_error {
        Some(e) => format!("JSON parse error: {e}"),
        None => "no JSON object found".to_string(),
    };
    Err(malformed(provider, &reason, text))
}

fn malformed(provider: ProviderKind, reason: &str, text: &str) -> ProviderError {
    ProviderError::MalformedResponse {
        provider,
        reason: reason.to_string(),
        raw: truncate_chars(text, MAX_RAW_DIAGNOSTIC_CHARS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_with_prose() {
        let text = "Here is the result:\n```json\n{\"leafDetected\":false}\n```";
        assert_eq!(extract_json_object(text), Some("{\"leafDetected\":false}"));
    }

    #[test]
    fn nested_objects_are_not_truncated() {
        let text = r#"```json
{"possibleDiseases": [{"name": "Rust", "likelihood": 60}], "causes": [{"disease": "Rust"}]}
```"#;
        let json = extract_json_object(text).unwrap();
        assert!(json.ends_with("}]}"));
        let value: Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["causes"][0]["disease"], "Rust");
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"Result: {"description": "spots look like } and { shapes", "stage": 2} done"#;
        let value = parse_provider_text(ProviderKind::Gemini, text).unwrap();
        assert_eq!(value["description"], "spots look like } and { shapes");
        assert_eq!(value["stage"], 2);
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let text = r#"{"description": "the \"ring\" pattern {x}", "stage": 1}"#;
        let value = parse_provider_text(ProviderKind::Groq, text).unwrap();
        assert_eq!(value["stage"], 1);
    }

    #[test]
    fn largest_span_wins_over_first() {
        let text = r#"Example: {"a": 1}. Answer: {"stage": 3, "healthPercentage": 20, "causes": []}"#;
        let json = extract_json_object(text).unwrap();
        assert!(json.contains("healthPercentage"));
    }

    #[test]
    fn stray_open_brace_in_prose_is_skipped() {
        let text = "Note {unfinished thought\n```json\n{\"stage\": 0}\n```";
        let value = parse_provider_text(ProviderKind::Gemini, text).unwrap();
        assert_eq!(value["stage"], 0);
    }

    #[test]
    fn falls_back_to_smaller_candidate_when_largest_is_invalid() {
        let text = r#"{not json at all, really not} then {"stage": 1}"#;
        let value = parse_provider_text(ProviderKind::Gemini, text).unwrap();
        assert_eq!(value["stage"], 1);
    }

    #[test]
    fn no_json_is_malformed_with_raw_text() {
        let err = parse_provider_text(ProviderKind::Groq, "I cannot help with that.").unwrap_err();
        match err {
            ProviderError::MalformedResponse { provider, reason, raw } => {
                assert_eq!(provider, ProviderKind::Groq);
                assert_eq!(reason, "no JSON object found");
                assert_eq!(raw, "I cannot help with that.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse_provider_text(ProviderKind::Gemini, "```json\n{invalid json}\n```").unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MalformedResponse { ref reason, .. } if reason.starts_with("JSON parse error")
        ));
    }

    #[test]
    fn truncated_object_is_malformed() {
        let err = parse_provider_text(ProviderKind::Gemini, r#"{"stage": 2, "causes": ["#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[test]
    fn empty_completion_is_malformed() {
        let err = parse_provider_text(ProviderKind::Gemini, "  \n").unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MalformedResponse { ref reason, .. } if reason == "empty completion"
        ));
    }

    #[test]
    fn raw_text_is_truncated() {
        let long = "x".repeat(MAX_RAW_DIAGNOSTIC_CHARS * 2);
        let err = parse_provider_text(ProviderKind::Gemini, &long).unwrap_err();
        match err {
            ProviderError::MalformedResponse { raw, .. } => {
                assert!(raw.chars().count() <= MAX_RAW_DIAGNOSTIC_CHARS + 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn thousands_of_unclosed_braces_scan_quickly() {
        let text = format!("{}{{\"stage\": 1}}", "{".repeat(50_000));
        let started = std::time::Instant::now();
        let value = parse_provider_text(ProviderKind::Gemini, &text).unwrap();
        assert_eq!(value["stage"], 1);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        let started = std::time::Instant::now();
        let err = parse_provider_text(ProviderKind::Gemini, &"{".repeat(50_000)).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn sibling_objects_are_separate_candidates() {
        let text = r#"{"a": {"b": 1}} and {"c": 2}"#;
        assert_eq!(find_json_candidates(text), vec![r#"{"a": {"b": 1}}"#, r#"{"c": 2}"#]);
    }

    #[test]
    fn stray_closing_brace_is_ignored() {
        let text = r#"oops } {"stage": 2}"#;
        assert_eq!(find_json_candidates(text), vec![r#"{"stage": 2}"#]);
    }

    #[test]
    fn multibyte_text_around_json() {
        let text = "Résultat 🌿: {\"description\": \"feuille abîmée\"} ✓";
        let value = parse_provider_text(ProviderKind::Gemini, text).unwrap();
        assert_eq!(value["description"], "feuille abîmée");
    }
}
