pub mod api;
pub mod config;
pub mod pipeline;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::{start_api_server, ApiContext, ServerError};
use crate::config::{AppConfig, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(std::io::Error),
}

/// Load configuration, start the API server and serve until ctrl-c.
pub async fn run() -> Result<(), StartupError> {
    let app_config = AppConfig::from_env()?;
    init_tracing(app_config.log_filter.as_deref());

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    for kind in &app_config.provider_order {
        let settings = app_config.settings_for(*kind);
        if settings.is_configured() {
            tracing::info!(provider = %kind, model = %settings.model, "Provider enabled");
        } else {
            tracing::warn!(
                provider = %kind,
                env = kind.api_key_env(),
                "Provider has no API key, requests to it will fail with a setup guide"
            );
        }
    }

    let ctx = ApiContext::new(Arc::new(app_config.build_orchestrator()))
        .with_max_image_bytes(app_config.max_image_bytes);
    let server = start_api_server(ctx, app_config.bind).await?;
    tracing::info!(addr = %server.local_addr(), "Listening");

    tokio::signal::ctrl_c().await.map_err(StartupError::Signal)?;
    tracing::info!("Shutdown requested");
    server.shutdown();
    server.wait().await;
    Ok(())
}

fn init_tracing(filter: Option<&str>) {
    let filter = filter
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new(config::default_log_filter()));
    // A subscriber may already be installed when embedded in a host process.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
