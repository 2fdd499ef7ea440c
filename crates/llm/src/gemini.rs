//! Gemini backend
//!
//! Implements the Google Generative Language API (`generateContent` /
//! `streamGenerateContent?alt=sse`). Non-streaming calls retry transient
//! failures with exponential backoff; streaming calls fail fast since
//! partial output may already have been delivered.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::backend::{FinishReason, GenerationResult, LlmBackend};
use crate::prompt::{Message, Role};
use crate::LlmError;

/// Configuration for the Gemini backend
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key
    pub api_key: String,
    /// Model id, e.g. "gemini-2.5-flash-lite"
    pub model: String,
    /// API base URL
    pub endpoint: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash-lite".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl GeminiConfig {
    /// Build from application settings, reading the API key from the
    /// configured environment variable.
    pub fn from_settings(
        settings: &legal_assistant_config::LlmConfig,
    ) -> Result<Self, LlmError> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            LlmError::Configuration(format!("missing API key env var {}", settings.api_key_env))
        })?;

        Ok(Self {
            api_key,
            model: settings.model.clone(),
            endpoint: settings.endpoint.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            ..Self::default()
        })
    }

    /// Override the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Gemini HTTP backend
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration("empty API key".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, verb: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.endpoint, self.config.model, verb
        )
    }

    fn build_request(&self, messages: &[Message]) -> GeminiRequest {
        // Gemini carries the system prompt out-of-band; user/assistant
        // turns map to "user"/"model" contents.
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for message in messages {
            match message.role {
                Role::System => system_parts.push(GeminiPart {
                    text: message.content.clone(),
                }),
                Role::User => contents.push(GeminiContent {
                    role: "user".to_string(),
                    parts: vec![GeminiPart {
                        text: message.content.clone(),
                    }],
                }),
                Role::Assistant => contents.push(GeminiContent {
                    role: "model".to_string(),
                    parts: vec![GeminiPart {
                        text: message.content.clone(),
                    }],
                }),
            }
        }

        GeminiRequest {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(GeminiSystemInstruction {
                    parts: system_parts,
                })
            },
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            },
        }
    }

    async fn execute_request(&self, request: &GeminiRequest) -> Result<GeminiResponse, LlmError> {
        let response = self
            .client
            .post(self.api_url("generateContent"))
            .query(&[("key", self.config.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {}: {}", status, error)));
            }
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error)));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }

    fn convert_finish_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("STOP") | None => FinishReason::Stop,
            Some(_) => FinishReason::Error,
        }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = self.build_request(messages);

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    max = self.config.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Gemini request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(&request).await {
                Ok(response) => {
                    let candidate = response
                        .candidates
                        .into_iter()
                        .next()
                        .ok_or_else(|| LlmError::InvalidResponse("no candidates".to_string()))?;

                    let text: String = candidate
                        .content
                        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
                        .unwrap_or_default();

                    return Ok(GenerationResult {
                        text,
                        tokens: response
                            .usage_metadata
                            .map(|u| u.candidates_token_count)
                            .unwrap_or(0),
                        total_time_ms: start.elapsed().as_millis() as u64,
                        finish_reason: Self::convert_finish_reason(
                            candidate.finish_reason.as_deref(),
                        ),
                    });
                }
                Err(e) if Self::is_retryable(&e) => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("max retries exceeded".to_string())))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        use futures::StreamExt;

        let start = std::time::Instant::now();
        let request = self.build_request(messages);

        let response = self
            .client
            .post(self.api_url("streamGenerateContent"))
            .query(&[("alt", "sse"), ("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut full_text = String::new();
        let mut tokens = 0;
        let mut finish_reason = FinishReason::Stop;
        let mut receiver_open = true;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.extend_from_slice(&chunk);

            while let Some(line) = take_line(&mut buffer) {
                if line.is_empty() {
                    continue;
                }

                let Some(json_str) = line.strip_prefix("data: ") else {
                    continue;
                };

                let Ok(event) = serde_json::from_str::<GeminiResponse>(json_str) else {
                    continue;
                };

                if let Some(usage) = event.usage_metadata {
                    tokens = usage.candidates_token_count;
                }

                for candidate in event.candidates {
                    if let Some(reason) = candidate.finish_reason.as_deref() {
                        finish_reason = Self::convert_finish_reason(Some(reason));
                    }
                    if let Some(content) = candidate.content {
                        for part in content.parts {
                            full_text.push_str(&part.text);
                            if receiver_open && tx.send(part.text).await.is_err() {
                                // Caller dropped the receiver.
                                receiver_open = false;
                                finish_reason = FinishReason::Cancelled;
                            }
                        }
                    }
                }
            }

            if !receiver_open {
                break;
            }
        }

        Ok(GenerationResult {
            text: full_text,
            tokens,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason,
        })
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Pop the next newline-terminated line off `buffer`, trimmed.
///
/// Only complete lines are decoded, so a multibyte character split
/// across network chunks stays intact in the buffer until its line
/// arrives in full.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line[..end]).trim().to_string())
}

// =============================================================================
// Gemini API types
// =============================================================================

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: usize,
}
