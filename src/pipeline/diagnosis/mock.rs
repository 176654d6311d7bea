use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::adapter::interpret_completion;
use super::image::ImagePayload;
use super::types::{AnalysisResult, ProviderKind, VisionProvider};
use super::ProviderError;

/// What a scripted provider does when called.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Completion text, run through the real parse and normalize path.
    Text(String),
    Fail(ProviderError),
}

/// Mock vision provider for testing: returns a scripted outcome and counts calls.
pub struct MockVisionProvider {
    kind: ProviderKind,
    model: String,
    outcome: MockOutcome,
    delay: Option<Duration>,
    configured: bool,
    calls: AtomicUsize,
}

impl MockVisionProvider {
    pub fn new(kind: ProviderKind, outcome: MockOutcome) -> Self {
        Self {
            kind,
            model: format!("mock-{kind}"),
            outcome,
            delay: None,
            configured: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn text(kind: ProviderKind, completion: &str) -> Self {
        Self::new(kind, MockOutcome::Text(completion.to_string()))
    }

    pub fn failing(kind: ProviderKind, error: ProviderError) -> Self {
        Self::new(kind, MockOutcome::Fail(error))
    }

    /// Sleep before answering, to exercise timeouts and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn analyze(
        &self,
        _image: &ImagePayload,
        model_override: Option<&str>,
    ) -> Result<AnalysisResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.outcome {
            MockOutcome::Text(text) => {
                interpret_completion(self.kind, model_override.unwrap_or(&self.model), text)
            }
            MockOutcome::Fail(err) => Err(err.clone()),
        }
    }
}
