use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::image::ImagePayload;
use super::ProviderError;

// ──────────────────────────────────────────────
// Providers
// ──────────────────────────────────────────────

/// The vision backends this service knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Higher accuracy, free tier is quota-limited.
    Gemini,
    /// Low latency, OpenAI-compatible chat completions.
    Groq,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Gemini, ProviderKind::Groq];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Groq => "groq",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Google Gemini",
            ProviderKind::Groq => "Groq",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
        }
    }

    /// Billing note shown next to a result.
    pub fn cost_hint(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "free tier (daily quota)",
            ProviderKind::Groq => "free tier",
        }
    }

    /// Actionable setup text for a missing or rejected credential.
    pub fn setup_hint(self) -> String {
        let console = match self {
            ProviderKind::Gemini => "https://aistudio.google.com/app/apikey",
            ProviderKind::Groq => "https://console.groq.com/keys",
        };
        format!(
            "Create a {} API key at {console} and export it as {} before starting the server.",
            self.label(),
            self.api_key_env()
        )
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "groq" => Ok(ProviderKind::Groq),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// Construction-time settings for one adapter.
///
/// Credentials are injected here; adapters never read the environment.
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn new(api_key: Option<String>, model: &str, base_url: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Metadata the normalizer stamps onto every result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMeta {
    pub provider: ProviderKind,
    pub model: String,
    pub cost: String,
}

impl ProviderMeta {
    pub fn new(provider: ProviderKind, model: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
            cost: provider.cost_hint().to_string(),
        }
    }
}

/// A vision-capable backend behind the uniform analyze-image contract.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Default model used when the caller does not override it.
    fn model(&self) -> &str;

    fn is_configured(&self) -> bool;

    async fn analyze(
        &self,
        image: &ImagePayload,
        model_override: Option<&str>,
    ) -> Result<AnalysisResult, ProviderError>;
}

// ──────────────────────────────────────────────
// Canonical result
// ──────────────────────────────────────────────

/// Ordinal health bucket. Serialized as the integers -1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Stage {
    NoLeaf,
    Healthy,
    Mild,
    Moderate,
    Critical,
}

impl Stage {
    pub fn severity(self) -> Severity {
        match self {
            Stage::NoLeaf | Stage::Healthy => Severity::None,
            Stage::Mild => Severity::Low,
            Stage::Moderate => Severity::Medium,
            Stage::Critical => Severity::High,
        }
    }
}

impl From<Stage> for i8 {
    fn from(stage: Stage) -> i8 {
        match stage {
            Stage::NoLeaf => -1,
            Stage::Healthy => 0,
            Stage::Mild => 1,
            Stage::Moderate => 2,
            Stage::Critical => 3,
        }
    }
}

impl TryFrom<i8> for Stage {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Stage::NoLeaf),
            0 => Ok(Stage::Healthy),
            1 => Ok(Stage::Mild),
            2 => Ok(Stage::Moderate),
            3 => Ok(Stage::Critical),
            other => Err(format!("stage {other} is outside -1..=3")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PossibleDisease {
    pub name: String,
    pub description: String,
    /// Independent estimate 0–100; entries need not sum to 100.
    pub likelihood: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cause {
    pub disease: String,
    pub cause: String,
    pub explanation: String,
}

/// Fully defaulted diagnosis. Every field is always present so the
/// rendering layer never branches on absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub leaf_present: bool,
    pub stage: Stage,
    pub health_percentage: u8,
    pub severity: Severity,
    pub category: String,
    pub damage_type: String,
    pub description: String,
    pub primary_disease: String,
    pub possible_diseases: Vec<PossibleDisease>,
    pub causes: Vec<Cause>,
    pub care_tips: Vec<String>,
    pub symptoms: Vec<String>,
    pub detected_patterns: Vec<String>,
    /// Canonical 0.0–1.0 scale.
    pub confidence: f64,
    pub provider: ProviderKind,
    pub model: String,
    pub cost: String,
}

impl AnalysisResult {
    pub fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            provider: self.provider,
            model: self.model.clone(),
            cost: self.cost.clone(),
        }
    }
}

// ──────────────────────────────────────────────
// Orchestration
// ──────────────────────────────────────────────

/// Caller choices for one analysis request.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Provider tried first; the rest keep their configured order.
    pub preferred: Option<ProviderKind>,
    /// Model override for the first provider in the chain.
    pub model: Option<String>,
    /// When false only the first provider is attempted.
    pub fallback: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            preferred: None,
            model: None,
            fallback: true,
        }
    }
}

/// Classification of a provider failure, surfaced to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Configuration,
    /// The requested model name was rejected before any call was made.
    InvalidModel,
    RateLimit,
    Backend,
    MalformedResponse,
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Configuration => "configuration",
            FailureKind::InvalidModel => "invalid model",
            FailureKind::RateLimit => "rate limit",
            FailureKind::Backend => "backend error",
            FailureKind::MalformedResponse => "malformed response",
            FailureKind::Timeout => "timeout",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: ProviderKind,
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ProviderError> for ProviderFailure {
    fn from(err: &ProviderError) -> Self {
        let message = match err {
            ProviderError::Configuration { message, .. }
            | ProviderError::RateLimited { message, .. }
            | ProviderError::Backend { message, .. } => message.clone(),
            ProviderError::MalformedResponse { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        Self {
            provider: err.provider(),
            kind: err.kind(),
            message,
        }
    }
}
