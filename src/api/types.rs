//! Shared types for the HTTP layer.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::api::collaborators::{AnonymousSessions, NoUserStats, SessionLookup, UserStats};
use crate::pipeline::diagnosis::{DiagnosisOrchestrator, DEFAULT_MAX_IMAGE_BYTES};

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes. Cheap to clone.
#[derive(Clone)]
pub struct ApiContext {
    pub orchestrator: Arc<DiagnosisOrchestrator>,
    pub sessions: Arc<dyn SessionLookup>,
    pub stats: Arc<dyn UserStats>,
    /// Parent of every per-request cancellation token.
    pub shutdown: CancellationToken,
    pub max_image_bytes: usize,
}

impl ApiContext {
    pub fn new(orchestrator: Arc<DiagnosisOrchestrator>) -> Self {
        Self {
            orchestrator,
            sessions: Arc::new(AnonymousSessions),
            stats: Arc::new(NoUserStats),
            shutdown: CancellationToken::new(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionLookup>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_stats(mut self, stats: Arc<dyn UserStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }
}

// ═══════════════════════════════════════════════════════════
// Request bodies
// ═══════════════════════════════════════════════════════════

/// `POST /api/analyze` body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// Data URL or bare base64.
    #[serde(default)]
    pub image: Option<String>,
    /// Provider to try first (`gemini` or `groq`).
    #[serde(default)]
    pub provider: Option<String>,
    /// Model override for the first provider.
    #[serde(default)]
    pub model: Option<String>,
    /// Defaults to true.
    #[serde(default)]
    pub fallback: Option<bool>,
}
