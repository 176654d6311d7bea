//! `POST /api/analyze`: leaf photo in, normalized diagnosis out.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::Instrument;

use crate::api::error::ApiError;
use crate::api::types::{AnalyzeRequest, ApiContext};
use crate::pipeline::diagnosis::{AnalysisResult, AnalyzeOptions, ImagePayload, ProviderKind};

/// Validate the image, run the provider chain and return the result.
///
/// The request's cancellation token is a child of the server shutdown
/// token and is cancelled when this future is dropped, so a client
/// disconnect aborts the in-flight provider call.
pub async fn analyze(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Json(request) = payload?;

    let image = ImagePayload::from_client(
        request.image.as_deref().unwrap_or_default(),
        ctx.max_image_bytes,
    )?;
    let options = analyze_options(&request)?;

    let user = ctx.sessions.current_user(&headers).await;
    let span = tracing::info_span!(
        "analyze",
        user = user.as_ref().map_or("anonymous", |u| u.id.as_str()),
        mime = image.mime_type(),
        image_bytes = image.decoded_len(),
        preferred = options.preferred.map(ProviderKind::as_str),
    );

    let cancel = ctx.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match ctx
        .orchestrator
        .analyze(&image, &options, &cancel)
        .instrument(span)
        .await
    {
        Ok(result) => Ok(Json(result)),
        Err(error) => {
            let suggested = ctx.orchestrator.suggest_alternatives(error.failures());
            Err(ApiError::Diagnosis { error, suggested })
        }
    }
}

fn analyze_options(request: &AnalyzeRequest) -> Result<AnalyzeOptions, ApiError> {
    let preferred = request
        .provider
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse::<ProviderKind>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let model = request
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    Ok(AnalyzeOptions {
        preferred,
        model,
        fallback: request.fallback.unwrap_or(true),
    })
}
