//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::pipeline::diagnosis::{ProviderKind, PROMPT_VERSION};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub prompt_version: &'static str,
    pub providers: Vec<ProviderStatus>,
}

#[derive(Serialize)]
pub struct ProviderStatus {
    pub name: ProviderKind,
    pub model: String,
    pub configured: bool,
}

/// `GET /api/health`: liveness plus provider configuration.
///
/// Reports `degraded` when no provider has a credential.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let providers: Vec<ProviderStatus> = ctx
        .orchestrator
        .providers()
        .iter()
        .map(|p| ProviderStatus {
            name: p.kind(),
            model: p.model().to_string(),
            configured: p.is_configured(),
        })
        .collect();

    let status = if providers.iter().any(|p| p.configured) {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: crate::config::APP_VERSION,
        prompt_version: PROMPT_VERSION,
        providers,
    })
}
