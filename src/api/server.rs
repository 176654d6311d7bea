//! API server lifecycle: bind → spawn background task → return handle
//! with a shutdown token.

use std::net::SocketAddr;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::router::api_router;
use crate::api::types::ApiContext;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Failed to get server address: {0}")]
    LocalAddr(std::io::Error),
}

/// Handle to a running API server.
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ApiServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and cancel in-flight analyses.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait for the server task to finish.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!("API server task failed: {e}");
        }
    }
}

/// Bind `addr`, mount the router and serve in a background task.
///
/// Cancelling `ctx.shutdown` (or calling `ApiServer::shutdown`) stops the
/// server gracefully and cancels every in-flight request token.
pub async fn start_api_server(ctx: ApiContext, addr: SocketAddr) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let shutdown = ctx.shutdown.clone();
    let app = api_router(ctx);

    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::pipeline::diagnosis::{
        DiagnosisOrchestrator, MockVisionProvider, ProviderKind, VisionProvider,
        DEFAULT_CALL_TIMEOUT,
    };

    fn test_ctx(delay: Duration) -> ApiContext {
        let provider: Arc<dyn VisionProvider> = Arc::new(
            MockVisionProvider::text(ProviderKind::Gemini, r#"{"healthPercentage": 80, "stage": 1}"#)
                .with_delay(delay),
        );
        ApiContext::new(Arc::new(DiagnosisOrchestrator::new(
            vec![provider],
            DEFAULT_CALL_TIMEOUT,
        )))
    }

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn start_serve_and_stop() {
        let server = start_api_server(test_ctx(Duration::ZERO), localhost())
            .await
            .expect("server should start");
        assert!(server.local_addr().port() > 0);

        let client = reqwest::Client::new();
        let url = format!("http://{}/api/analyze", server.local_addr());
        let resp = client
            .post(&url)
            .json(&serde_json::json!({"image": "data:image/png;base64,iVBORw0KGgo="}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["stage"], 1);
        assert_eq!(json["severity"], "low");

        let health = reqwest::get(format!("http://{}/api/health", server.local_addr()))
            .await
            .unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), server.wait())
            .await
            .expect("server should stop");
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_request() {
        let server = start_api_server(test_ctx(Duration::from_secs(30)), localhost())
            .await
            .expect("server should start");
        let url = format!("http://{}/api/analyze", server.local_addr());

        let request = tokio::spawn(async move {
            reqwest::Client::new()
                .post(&url)
                .json(&serde_json::json!({"image": "iVBORw0KGgo="}))
                .send()
                .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        server.shutdown();

        let resp = tokio::time::timeout(Duration::from_secs(5), request)
            .await
            .expect("request should finish")
            .unwrap()
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        server.wait().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let server = start_api_server(test_ctx(Duration::ZERO), localhost())
            .await
            .expect("server should start");
        server.shutdown();
        server.shutdown();
        server.wait().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = start_api_server(test_ctx(Duration::ZERO), localhost())
            .await
            .unwrap();
        let err = start_api_server(test_ctx(Duration::ZERO), first.local_addr())
            .await
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown();
    }
}
