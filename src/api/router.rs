//! HTTP router.
//!
//! Layer stack (outermost → innermost):
//! 1. Trace → 2. CORS → 3. Cache-Control → 4. Body limit → Handler

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Request};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Room for base64 expansion and the JSON envelope around the image.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Largest accepted request body for a given decoded image limit.
pub fn request_body_limit(max_image_bytes: usize) -> usize {
    max_image_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD_BYTES)
}

/// Build the API router with all endpoints under `/api/`.
pub fn api_router(ctx: ApiContext) -> Router {
    let body_limit = request_body_limit(ctx.max_image_bytes);

    let routes = Router::new()
        .route("/analyze", post(endpoints::analyze::analyze))
        .route("/health", get(endpoints::health::check))
        .route("/stats", get(endpoints::stats::summary))
        .with_state(ctx);

    Router::new()
        .nest("/api", routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %Uuid::new_v4(),
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::Response;
    use chrono::{DateTime, Utc};
    use tower::ServiceExt;

    use crate::api::collaborators::{SessionLookup, StatsError, User, UserStats};
    use crate::pipeline::diagnosis::{
        DiagnosisOrchestrator, MockVisionProvider, ProviderError, ProviderKind, VisionProvider,
        DEFAULT_CALL_TIMEOUT,
    };

    const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgo=";
    const HEALTHY: &str = r#"{"leafDetected": true, "stage": 0, "healthPercentage": 96, "confidence": 90}"#;

    fn ctx_with(providers: Vec<Arc<dyn VisionProvider>>) -> ApiContext {
        ApiContext::new(Arc::new(DiagnosisOrchestrator::new(
            providers,
            DEFAULT_CALL_TIMEOUT,
        )))
    }

    fn mock(provider: MockVisionProvider) -> Arc<dyn VisionProvider> {
        Arc::new(provider)
    }

    fn healthy_ctx() -> ApiContext {
        ctx_with(vec![
            mock(MockVisionProvider::text(ProviderKind::Gemini, HEALTHY)),
            mock(MockVisionProvider::text(ProviderKind::Groq, HEALTHY)),
        ])
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn analyze_returns_normalized_result() {
        let app = api_router(healthy_ctx());
        let body = serde_json::json!({"image": PNG_DATA_URL}).to_string();
        let response = app.oneshot(post_json("/api/analyze", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Cache-Control").unwrap(),
            "no-store"
        );
        let json = body_json(response).await;
        assert_eq!(json["leafPresent"], true);
        assert_eq!(json["stage"], 0);
        assert_eq!(json["severity"], "none");
        assert_eq!(json["confidence"], 0.9);
        assert_eq!(json["provider"], "gemini");
        assert_eq!(json["cost"], "free tier (daily quota)");
        assert_eq!(json["careTips"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn missing_image_is_400() {
        let app = api_router(healthy_ctx());
        let response = app.oneshot(post_json("/api/analyze", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "No image provided");
    }

    #[tokio::test]
    async fn non_json_body_is_400() {
        let app = api_router(healthy_ctx());
        let response = app
            .oneshot(post_json("/api/analyze", "image=abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_provider_is_400() {
        let app = api_router(healthy_ctx());
        let body = serde_json::json!({"image": PNG_DATA_URL, "provider": "openai"}).to_string();
        let response = app.oneshot(post_json("/api/analyze", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let ctx = healthy_ctx().with_max_image_bytes(16);
        let app = api_router(ctx);
        let image = "A".repeat(request_body_limit(16) + 1);
        let body = serde_json::json!({"image": image}).to_string();
        let response = app.oneshot(post_json("/api/analyze", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn preferred_provider_is_honored() {
        let app = api_router(healthy_ctx());
        let body = serde_json::json!({"image": PNG_DATA_URL, "provider": "groq"}).to_string();
        let response = app.oneshot(post_json("/api/analyze", &body)).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["provider"], "groq");
    }

    #[tokio::test]
    async fn all_failed_with_rate_limit_is_429() {
        let ctx = ctx_with(vec![
            mock(MockVisionProvider::failing(
                ProviderKind::Gemini,
                ProviderError::RateLimited {
                    provider: ProviderKind::Gemini,
                    message: "quota exhausted".into(),
                },
            )),
            mock(MockVisionProvider::failing(
                ProviderKind::Groq,
                ProviderError::Backend {
                    provider: ProviderKind::Groq,
                    status: Some(502),
                    message: "bad gateway".into(),
                },
            )),
        ]);
        let app = api_router(ctx);
        let body = serde_json::json!({"image": PNG_DATA_URL}).to_string();
        let response = app.oneshot(post_json("/api/analyze", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert_eq!(json["isRateLimit"], true);
        assert_eq!(json["suggestedProviders"], serde_json::json!(["groq"]));
        assert_eq!(json["failures"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn all_failed_without_rate_limit_is_500() {
        let ctx = ctx_with(vec![mock(
            MockVisionProvider::text(ProviderKind::Gemini, "no json here").unconfigured(),
        )]);
        let app = api_router(ctx);
        let body = serde_json::json!({"image": PNG_DATA_URL}).to_string();
        let response = app.oneshot(post_json("/api/analyze", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["isRateLimit"], false);
        assert_eq!(json["failures"][0]["kind"], "malformedResponse");
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_analysis() {
        let ctx = ctx_with(vec![mock(
            MockVisionProvider::text(ProviderKind::Gemini, HEALTHY)
                .with_delay(Duration::from_secs(30)),
        )]);
        let shutdown = ctx.shutdown.clone();
        let app = api_router(ctx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.cancel();
        });

        let body = serde_json::json!({"image": PNG_DATA_URL}).to_string();
        let response = app.oneshot(post_json("/api/analyze", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_lists_providers() {
        let ctx = ctx_with(vec![
            mock(MockVisionProvider::text(ProviderKind::Gemini, HEALTHY).with_model("gemini-2.0-flash")),
            mock(MockVisionProvider::text(ProviderKind::Groq, HEALTHY).unconfigured()),
        ]);
        let app = api_router(ctx);
        let response = app.oneshot(get_request("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::config::APP_VERSION);
        assert_eq!(json["promptVersion"], crate::pipeline::diagnosis::PROMPT_VERSION);
        assert_eq!(json["providers"][0]["name"], "gemini");
        assert_eq!(json["providers"][0]["model"], "gemini-2.0-flash");
        assert_eq!(json["providers"][0]["configured"], true);
        assert_eq!(json["providers"][1]["configured"], false);
    }

    #[tokio::test]
    async fn health_is_degraded_without_credentials() {
        let ctx = ctx_with(vec![mock(
            MockVisionProvider::text(ProviderKind::Gemini, HEALTHY).unconfigured(),
        )]);
        let response = api_router(ctx).oneshot(get_request("/api/health")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
    }

    struct FixedStats;

    #[async_trait]
    impl UserStats for FixedStats {
        async fn count_users(&self) -> Result<u64, StatsError> {
            Ok(42)
        }

        async fn count_active_sessions(&self, _now: DateTime<Utc>) -> Result<u64, StatsError> {
            Ok(7)
        }
    }

    struct BrokenStats;

    #[async_trait]
    impl UserStats for BrokenStats {
        async fn count_users(&self) -> Result<u64, StatsError> {
            Err(StatsError::Unavailable("connection refused".into()))
        }

        async fn count_active_sessions(&self, _now: DateTime<Utc>) -> Result<u64, StatsError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn stats_come_from_collaborator() {
        let ctx = healthy_ctx().with_stats(Arc::new(FixedStats));
        let response = api_router(ctx).oneshot(get_request("/api/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({"users": 42, "activeSessions": 7}));
    }

    #[tokio::test]
    async fn stats_default_to_zero() {
        let response = api_router(healthy_ctx()).oneshot(get_request("/api/stats")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({"users": 0, "activeSessions": 0}));
    }

    #[tokio::test]
    async fn stats_failure_is_500() {
        let ctx = healthy_ctx().with_stats(Arc::new(BrokenStats));
        let response = api_router(ctx).oneshot(get_request("/api/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    struct HeaderSessions;

    #[async_trait]
    impl SessionLookup for HeaderSessions {
        async fn current_user(&self, headers: &HeaderMap) -> Option<User> {
            headers
                .get("x-user-id")
                .and_then(|v| v.to_str().ok())
                .map(|id| User {
                    id: id.to_string(),
                    email: None,
                })
        }
    }

    #[tokio::test]
    async fn analyze_does_not_require_a_user() {
        let ctx = healthy_ctx().with_sessions(Arc::new(HeaderSessions));
        let app = api_router(ctx);
        let body = serde_json::json!({"image": PNG_DATA_URL}).to_string();

        let anonymous = app
            .clone()
            .oneshot(post_json("/api/analyze", &body))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::OK);

        let mut signed_in = post_json("/api/analyze", &body);
        signed_in
            .headers_mut()
            .insert("x-user-id", HeaderValue::from_static("user-1"));
        let response = app.oneshot(signed_in).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = api_router(healthy_ctx())
            .oneshot(get_request("/api/nonexistent"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn body_limit_covers_base64_expansion() {
        let limit = request_body_limit(crate::pipeline::diagnosis::DEFAULT_MAX_IMAGE_BYTES);
        assert!(limit > crate::pipeline::diagnosis::DEFAULT_MAX_IMAGE_BYTES * 4 / 3);
    }

    #[test]
    fn body_limit_saturates_for_huge_image_limit() {
        assert_eq!(request_body_limit(usize::MAX), usize::MAX);
    }
}
