//! Gemini generateContent client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::openai::{is_retryable_status, rate_limited, retry_delay, status_error, transport_error};
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Role, StopReason, TokenUsage};
use crate::config::LlmConfig;

/// Gemini API client
pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    http_retries: u32,
    temperature: f32,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a new client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "from_config: called");
        let api_key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            http_retries: config.http_retries,
            temperature: config.temperature,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Build the request body for generateContent
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, message_count = request.messages.len(), "build_request_body: called");
        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        serde_json::json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature.unwrap_or(self.temperature),
                "maxOutputTokens": request.max_tokens.min(self.max_tokens),
            },
        })
    }

    fn parse_response(&self, api_response: GeminiResponse) -> Result<CompletionResponse, LlmError> {
        let candidate = api_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("API returned no candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse("API returned empty text".to_string()));
        }

        let stop_reason = match candidate.finish_reason.as_deref() {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };
        let usage = api_response.usage_metadata.unwrap_or_default();

        Ok(CompletionResponse {
            content: Some(text),
            stop_reason,
            usage: TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            },
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "complete: called");
        let url = self.endpoint();
        let body = self.build_request_body(&request);

        let mut last_error: Option<LlmError> = None;
        for attempt in 0..=self.http_retries {
            if attempt > 0 {
                let backoff = retry_delay(last_error.as_ref(), attempt);
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "complete: retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .header("x-goog-api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "complete: transport error");
                    last_error = Some(transport_error(e, self.timeout));
                    continue;
                }
            };

            let status = response.status().as_u16();
            if status == 429 {
                debug!(attempt, "complete: rate limited (429)");
                last_error = Some(rate_limited(response.headers()));
                continue;
            }

            if is_retryable_status(status) && attempt < self.http_retries {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "complete: retryable error");
                last_error = Some(LlmError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "complete: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(status_error(status, &self.model, text));
            }

            debug!("complete: success");
            let api_response: GeminiResponse = response.json().await.map_err(|e| transport_error(e, self.timeout))?;
            return self.parse_response(api_response);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }

    fn describe(&self) -> String {
        format!("gemini:{}", self.model)
    }
}

// === API response types ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}
