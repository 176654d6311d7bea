pub mod types;
pub mod image;
pub mod prompt;
pub mod parser;
pub mod normalize;
pub mod adapter;
pub mod gemini;
pub mod groq;
pub mod mock;
pub mod fallback;

pub use types::*;
pub use image::*;
pub use prompt::*;
pub use parser::*;
pub use normalize::*;
pub use gemini::*;
pub use groq::*;
pub use mock::*;
pub use fallback::*;

use thiserror::Error;

/// Failure of a single vision provider call.
///
/// Every variant carries the provider so the orchestrator can report
/// which backend failed and why once the whole chain is exhausted.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("{provider} is not configured: {message}")]
    Configuration {
        provider: ProviderKind,
        message: String,
    },

    #[error("Model name '{model}' is not valid for {provider}")]
    InvalidModel { provider: ProviderKind, model: String },

    #[error("{provider} rate limit exceeded: {message}")]
    RateLimited {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} request failed: {message}")]
    Backend {
        provider: ProviderKind,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} did not answer within {secs} seconds")]
    Timeout { provider: ProviderKind, secs: u64 },

    #[error("{provider} returned no usable JSON: {reason}")]
    MalformedResponse {
        provider: ProviderKind,
        reason: String,
        /// Raw completion text, truncated, kept for diagnostics only.
        raw: String,
    },
}

impl ProviderError {
    pub fn provider(&self) -> ProviderKind {
        match self {
            ProviderError::Configuration { provider, .. }
            | ProviderError::InvalidModel { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::Backend { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::MalformedResponse { provider, .. } => *provider,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Configuration { .. } => FailureKind::Configuration,
            ProviderError::InvalidModel { .. } => FailureKind::InvalidModel,
            ProviderError::RateLimited { .. } => FailureKind::RateLimit,
            ProviderError::Backend { .. } => FailureKind::Backend,
            ProviderError::Timeout { .. } => FailureKind::Timeout,
            ProviderError::MalformedResponse { .. } => FailureKind::MalformedResponse,
        }
    }

    /// Missing credential: the adapter never reached the network.
    pub fn missing_key(provider: ProviderKind) -> Self {
        ProviderError::Configuration {
            provider,
            message: format!("{} is not set", provider.api_key_env()),
        }
    }
}

/// Terminal outcome of the fallback chain.
#[derive(Error, Debug, Clone)]
pub enum DiagnosisError {
    #[error("No vision providers are available")]
    NoProviders,

    #[error("Analysis was cancelled")]
    Cancelled,

    #[error("All providers failed: {}", summarize_failures(.failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },
}

impl DiagnosisError {
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            DiagnosisError::AllProvidersFailed { failures } => failures,
            _ => &[],
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.failures()
            .iter()
            .any(|f| f.kind == FailureKind::RateLimit)
    }
}

/// One line per provider: `gemini: rate limit (quota exhausted)`.
pub fn summarize_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {} ({})", f.provider, f.kind, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
