//! API error types with structured JSON responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::diagnosis::{
    summarize_failures, DiagnosisError, FailureKind, ImageError, ProviderFailure, ProviderKind,
};

/// Error response body consumed by the web UI.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_guide: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_rate_limit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_providers: Option<Vec<ProviderKind>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("{error}")]
    Diagnosis {
        error: DiagnosisError,
        /// Configured providers that were not rate limited.
        suggested: Vec<ProviderKind>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Image(ImageError::Missing) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: ImageError::Missing.to_string(),
                    ..ErrorBody::default()
                },
            ),
            ApiError::Image(err) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "Invalid image".into(),
                    details: Some(err.to_string()),
                    ..ErrorBody::default()
                },
            ),
            ApiError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "Invalid request".into(),
                    details: Some(detail),
                    ..ErrorBody::default()
                },
            ),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    error: "Image too large".into(),
                    ..ErrorBody::default()
                },
            ),
            ApiError::Diagnosis { error, suggested } => diagnosis_response(error, suggested),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "An internal error occurred".into(),
                        ..ErrorBody::default()
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn diagnosis_response(error: DiagnosisError, suggested: Vec<ProviderKind>) -> (StatusCode, ErrorBody) {
    match error {
        DiagnosisError::Cancelled => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorBody {
                error: "Analysis was cancelled".into(),
                is_rate_limit: Some(false),
                ..ErrorBody::default()
            },
        ),
        DiagnosisError::NoProviders => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody {
                error: "No vision providers are available".into(),
                setup_guide: Some(setup_guide(&ProviderKind::ALL)),
                is_rate_limit: Some(false),
                ..ErrorBody::default()
            },
        ),
        DiagnosisError::AllProvidersFailed { failures } => {
            let is_rate_limit = failures.iter().any(|f| f.kind == FailureKind::RateLimit);
            let misconfigured: Vec<ProviderKind> = failures
                .iter()
                .filter(|f| f.kind == FailureKind::Configuration)
                .map(|f| f.provider)
                .collect();

            let (status, message) = if is_rate_limit {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "The AI provider's rate limit was reached. Please choose a different provider or try again later.",
                )
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Analysis is unavailable right now. Please try again.",
                )
            };

            let body = ErrorBody {
                error: message.into(),
                details: Some(summarize_failures(&failures)),
                setup_guide: (!misconfigured.is_empty()).then(|| setup_guide(&misconfigured)),
                is_rate_limit: Some(is_rate_limit),
                suggested_providers: (is_rate_limit && !suggested.is_empty()).then_some(suggested),
                failures,
            };
            (status, body)
        }
    }
}

/// One setup line per provider.
fn setup_guide(providers: &[ProviderKind]) -> String {
    providers
        .iter()
        .map(|p| p.setup_hint())
        .collect::<Vec<_>>()
        .join(" ")
}
