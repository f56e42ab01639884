//! Language model clients
//!
//! A `LanguageModel` turns one prompt into one completion. Retry, timeout
//! and fallback policy live with the caller; a client performs exactly one
//! remote call per `complete`.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Sampling options for one completion
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub system_prompt: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl CompletionOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            system_prompt: None,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

/// Text-generation backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `prompt`; an empty completion is an error
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    /// Provider/model identifier for logs
    fn name(&self) -> &str;

    /// False for stand-ins that can never produce a completion
    fn is_configured(&self) -> bool {
        true
    }
}

/// Map a non-success HTTP status to an error; 429 and 5xx may be retried
fn status_error(service: &str, status: reqwest::StatusCode, body: String) -> AppError {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        AppError::unavailable(service, format!("API error {}: {}", status, body))
    } else {
        AppError::Internal {
            message: format!("{} rejected request {}: {}", service, status, body),
        }
    }
}

fn non_empty(service: &str, text: Option<String>) -> Result<String> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(AppError::unavailable(service, "empty completion")),
    }
}

fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// OpenAI-compatible chat completions client
pub struct OpenAIChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string()),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("openai", status, body));
        }

        let chat: ChatResponse = response.json().await?;
        non_empty(
            "openai",
            chat.choices.into_iter().next().and_then(|c| c.message.content),
        )
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Google Gemini `generateContent` client
pub struct GeminiModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.endpoint, self.model);

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            system_instruction: options.system_prompt.as_deref().map(|text| GeminiContent {
                parts: vec![GeminiPart { text }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("gemini", status, body));
        }

        let body: GeminiResponse = response.json().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            });
        non_empty("gemini", text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Stand-in used when no provider is configured; every call fails fast
/// with `DependencyUnavailable` so callers take their fallback path.
pub struct UnconfiguredModel {
    reason: String,
}

impl UnconfiguredModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        Err(AppError::unavailable("llm", self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unconfigured"
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Create a language model client based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    let key = match config.api_key.as_deref() {
        Some(k) if !k.is_empty() && config.provider != "none" => k.to_string(),
        _ => {
            tracing::warn!(
                provider = %config.provider,
                "LLM provider not configured, answers will use fallback templates"
            );
            return Ok(Arc::new(UnconfiguredModel::new("no API key configured")));
        }
    };

    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config, key)?)),
        "gemini" => Ok(Arc::new(GeminiModel::new(config, key)?)),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider: {}", other),
        }),
    }
}
