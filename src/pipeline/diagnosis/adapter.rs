//! Pieces shared by the HTTP provider adapters: error classification,
//! model-name validation and the parse-then-normalize tail of every call.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use super::normalize::normalize;
use super::parser::parse_provider_text;
use super::types::{AnalysisResult, ProviderKind, ProviderMeta};
use super::ProviderError;

/// Cap on error-body text carried into a `ProviderError` message.
const MAX_ERROR_MESSAGE_CHARS: usize = 300;

static QUOTA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)quota|rate[ _-]?limit|resource_exhausted|too many requests").unwrap()
});

static MODEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]{0,127}$").unwrap());

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// HTTP client with the adapter's per-request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Model names end up in URL paths; only plain identifiers are accepted.
pub(crate) fn validate_model(provider: ProviderKind, model: &str) -> Result<(), ProviderError> {
    if MODEL_NAME.is_match(model) && !model.contains("..") {
        Ok(())
    } else {
        Err(ProviderError::InvalidModel {
            provider,
            model: truncate_chars(model, 64),
        })
    }
}

/// Best human-readable message from an error body: `error.message` when the
/// body is JSON, otherwise the trimmed text.
pub(crate) fn error_message_from_body(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| match &v["error"] {
            Value::Object(_) => v["error"]["message"].as_str().map(str::to_string),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| body.trim().to_string());
    truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS)
}

/// Classify a non-success HTTP response.
///
/// 401/403 are credential problems; 429 or quota wording anywhere in the
/// body is a rate limit; everything else is a backend error.
pub(crate) fn classify_http_failure(provider: ProviderKind, status: u16, body: &str) -> ProviderError {
    let message = error_message_from_body(body);
    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        message
    };

    match status {
        401 | 403 => ProviderError::Configuration {
            provider,
            message: format!("{} was rejected: {message}", provider.api_key_env()),
        },
        429 => ProviderError::RateLimited { provider, message },
        _ if QUOTA_PATTERN.is_match(body) => ProviderError::RateLimited { provider, message },
        _ => ProviderError::Backend {
            provider,
            status: Some(status),
            message,
        },
    }
}

/// Map a transport-level reqwest failure.
pub(crate) fn map_transport_error(
    provider: ProviderKind,
    err: reqwest::Error,
    timeout_secs: u64,
) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider,
            secs: timeout_secs,
        }
    } else if err.is_connect() {
        ProviderError::Backend {
            provider,
            status: None,
            message: format!("connection failed: {err}"),
        }
    } else {
        ProviderError::Backend {
            provider,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Completion text to canonical result.
pub(crate) fn interpret_completion(
    provider: ProviderKind,
    model: &str,
    text: &str,
) -> Result<AnalysisResult, ProviderError> {
    let raw = parse_provider_text(provider, text)?;
    let result = normalize(&raw, ProviderMeta::new(provider, model));
    tracing::debug!(
        provider = %provider,
        model,
        leaf_present = result.leaf_present,
        health = result.health_percentage,
        "Provider completion normalized"
    );
    Ok(result)
}
