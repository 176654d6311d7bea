//! Sequential provider fallback.
//!
//! Providers are tried one at a time in configured order (the caller's
//! preferred provider first). The first success wins, including a no-leaf
//! result. Every failure is classified and kept so the caller can explain
//! what went wrong per provider once the chain is exhausted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::image::ImagePayload;
use super::types::{
    AnalysisResult, AnalyzeOptions, FailureKind, ProviderFailure, ProviderKind, VisionProvider,
};
use super::{DiagnosisError, ProviderError};

/// Upper bound on a single provider call, network and parsing included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(45);

/// Runs the ordered provider chain for one image.
pub struct DiagnosisOrchestrator {
    providers: Vec<Arc<dyn VisionProvider>>,
    call_timeout: Duration,
}

impl DiagnosisOrchestrator {
    pub fn new(providers: Vec<Arc<dyn VisionProvider>>, call_timeout: Duration) -> Self {
        Self {
            providers,
            call_timeout,
        }
    }

    /// Configured chain, in default order.
    pub fn providers(&self) -> &[Arc<dyn VisionProvider>] {
        &self.providers
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Attempt order for one request.
    fn plan(&self, options: &AnalyzeOptions) -> Vec<Arc<dyn VisionProvider>> {
        let mut chain = self.providers.clone();
        if let Some(preferred) = options.preferred {
            if let Some(pos) = chain.iter().position(|p| p.kind() == preferred) {
                let first = chain.remove(pos);
                chain.insert(0, first);
            }
        }
        if !options.fallback {
            chain.truncate(1);
        }
        chain
    }

    /// Analyze an image, falling back across providers until one succeeds.
    pub async fn analyze(
        &self,
        image: &ImagePayload,
        options: &AnalyzeOptions,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, DiagnosisError> {
        let chain = self.plan(options);
        if chain.is_empty() {
            return Err(DiagnosisError::NoProviders);
        }

        let mut failures = Vec::with_capacity(chain.len());
        for (attempt, provider) in chain.iter().enumerate() {
            let kind = provider.kind();
            let model_override = if attempt == 0 {
                options.model.as_deref()
            } else {
                None
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(provider = %kind, attempt, "Analysis cancelled");
                    return Err(DiagnosisError::Cancelled);
                }
                outcome = tokio::time::timeout(
                    self.call_timeout,
                    provider.analyze(image, model_override),
                ) => outcome,
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(Ok(result)) => {
                    tracing::info!(
                        provider = %kind,
                        model = %result.model,
                        attempt,
                        elapsed_ms,
                        leaf_present = result.leaf_present,
                        stage = i8::from(result.stage),
                        health = result.health_percentage,
                        "Provider analysis succeeded"
                    );
                    return Ok(result);
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout {
                    provider: kind,
                    secs: self.call_timeout.as_secs(),
                },
            };

            if let ProviderError::MalformedResponse { raw, .. } = &error {
                tracing::debug!(provider = %kind, raw = %raw, "Unparseable provider output");
            }
            tracing::warn!(
                provider = %kind,
                attempt,
                elapsed_ms,
                kind = %error.kind(),
                error = %error,
                "Provider analysis failed"
            );
            failures.push(ProviderFailure::from(&error));
        }

        Err(DiagnosisError::AllProvidersFailed { failures })
    }

    /// Configured providers that were not rate limited in `failures`.
    pub fn suggest_alternatives(&self, failures: &[ProviderFailure]) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .map(|p| p.kind())
            .filter(|kind| {
                !failures
                    .iter()
                    .any(|f| f.provider == *kind && f.kind == FailureKind::RateLimit)
            })
            .collect()
    }
}
