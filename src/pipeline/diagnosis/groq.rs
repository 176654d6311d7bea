use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::adapter::{
    classify_http_failure, http_client, interpret_completion, map_transport_error,
    validate_model,
};
use super::image::ImagePayload;
use super::prompt::{DIAGNOSIS_SYSTEM_PROMPT, USER_INSTRUCTION};
use super::types::{AnalysisResult, ProviderKind, ProviderSettings, VisionProvider};
use super::ProviderError;

pub const DEFAULT_GROQ_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com";

/// Completion budget; a full diagnosis is well under this.
const MAX_COMPLETION_TOKENS: u32 = 1_024;

/// Groq adapter over the OpenAI-compatible chat completions API.
pub struct GroqProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    pub fn from_settings(settings: ProviderSettings) -> Self {
        let client = http_client(settings.timeout);
        Self::new(settings, client)
    }

    fn endpoint(&self) -> String {
        format!("{}/openai/v1/chat/completions", self.settings.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage<'a> {
    System { content: &'a str },
    User { content: Vec<ContentPart<'a>> },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl VisionProvider for GroqProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    async fn analyze(
        &self,
        image: &ImagePayload,
        model_override: Option<&str>,
    ) -> Result<AnalysisResult, ProviderError> {
        let provider = self.kind();
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_key(provider))?;
        let model = model_override.unwrap_or(&self.settings.model);
        validate_model(provider, model)?;

        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage::System {
                    content: DIAGNOSIS_SYSTEM_PROMPT,
                },
                ChatMessage::User {
                    content: vec![
                        ContentPart::Text {
                            text: USER_INSTRUCTION,
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: image.data_url(),
                            },
                        },
                    ],
                },
            ],
            temperature: 0.2,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let timeout_secs = self.settings.timeout.as_secs();
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(provider, e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(provider, status.as_u16(), &body));
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    provider,
                    reason: format!("unexpected response shape: {e}"),
                    raw: String::new(),
                })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        interpret_completion(provider, model, &text)
    }
}
