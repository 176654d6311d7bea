//! Application constants and environment configuration.
//!
//! Every setting is optional; blank values count as unset. Parsing runs
//! over a lookup closure so tests never touch the process environment.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::diagnosis::{
    DiagnosisOrchestrator, GeminiProvider, GroqProvider, ProviderKind, ProviderSettings,
    VisionProvider, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, DEFAULT_GROQ_BASE_URL,
    DEFAULT_GROQ_MODEL, DEFAULT_MAX_IMAGE_BYTES,
};

/// Application-level constants
pub const APP_NAME: &str = "Leafwise";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 45;
const MIN_PROVIDER_TIMEOUT_SECS: u64 = 5;
const MAX_PROVIDER_TIMEOUT_SECS: u64 = 120;
/// Ceiling for `LEAFWISE_MAX_IMAGE_BYTES`; larger values are clamped.
pub const MAX_IMAGE_BYTES_CEILING: usize = 64 * 1024 * 1024;

/// Log filter used when neither `LEAFWISE_LOG` nor `RUST_LOG` is set.
pub fn default_log_filter() -> &'static str {
    "leafwise=info,tower_http=info"
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: '{value}'")]
    InvalidBind { var: &'static str, value: String },
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var}: {message}")]
    InvalidProviderOrder { var: &'static str, message: String },
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub gemini: ProviderSettings,
    pub groq: ProviderSettings,
    /// Fallback order; always contains every provider exactly once.
    pub provider_order: Vec<ProviderKind>,
    pub provider_timeout: Duration,
    pub max_image_bytes: usize,
    pub log_filter: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_raw = get("LEAFWISE_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBind {
                var: "LEAFWISE_BIND",
                value: bind_raw.clone(),
            })?;

        let timeout_secs = match get("LEAFWISE_PROVIDER_TIMEOUT_SECS") {
            Some(raw) => parse_number("LEAFWISE_PROVIDER_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
        .clamp(MIN_PROVIDER_TIMEOUT_SECS, MAX_PROVIDER_TIMEOUT_SECS);
        let provider_timeout = Duration::from_secs(timeout_secs);

        let max_image_bytes = match get("LEAFWISE_MAX_IMAGE_BYTES") {
            Some(raw) => usize::try_from(parse_number("LEAFWISE_MAX_IMAGE_BYTES", &raw)?)
                .unwrap_or(usize::MAX)
                .min(MAX_IMAGE_BYTES_CEILING),
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        let provider_order = match get("LEAFWISE_PROVIDER_ORDER") {
            Some(raw) => parse_provider_order(&raw)?,
            None => ProviderKind::ALL.to_vec(),
        };

        let gemini = ProviderSettings::new(
            get("GEMINI_API_KEY"),
            &get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            &get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            provider_timeout,
        );
        let groq = ProviderSettings::new(
            get("GROQ_API_KEY"),
            &get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            &get("GROQ_BASE_URL").unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
            provider_timeout,
        );

        Ok(Self {
            bind,
            gemini,
            groq,
            provider_order,
            provider_timeout,
            max_image_bytes,
            log_filter: get("LEAFWISE_LOG").or_else(|| get("RUST_LOG")),
        })
    }

    pub fn settings_for(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Groq => &self.groq,
        }
    }

    /// Build the adapters in fallback order.
    pub fn build_providers(&self) -> Vec<Arc<dyn VisionProvider>> {
        self.provider_order
            .iter()
            .map(|kind| -> Arc<dyn VisionProvider> {
                let settings = self.settings_for(*kind).clone();
                match kind {
                    ProviderKind::Gemini => Arc::new(GeminiProvider::from_settings(settings)),
                    ProviderKind::Groq => Arc::new(GroqProvider::from_settings(settings)),
                }
            })
            .collect()
    }

    pub fn build_orchestrator(&self) -> DiagnosisOrchestrator {
        DiagnosisOrchestrator::new(self.build_providers(), self.call_timeout())
    }

    /// Orchestrator bound per call: the HTTP timeout plus parsing headroom.
    pub fn call_timeout(&self) -> Duration {
        self.provider_timeout + Duration::from_secs(5)
    }
}

fn parse_number(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::InvalidNumber {
            var,
            value: raw.to_string(),
        })
}

/// Comma-separated provider names. Duplicates are dropped and providers
/// not named are appended in default order.
fn parse_provider_order(raw: &str) -> Result<Vec<ProviderKind>, ConfigError> {
    let mut order = Vec::with_capacity(ProviderKind::ALL.len());
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = name
            .parse::<ProviderKind>()
            .map_err(|message| ConfigError::InvalidProviderOrder {
                var: "LEAFWISE_PROVIDER_ORDER",
                message,
            })?;
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    for kind in ProviderKind::ALL {
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    Ok(order)
}
