//! OpenAI-compatible chat completions client
//!
//! Works against any endpoint speaking the Chat Completions API (OpenAI,
//! Featherless and similar hosts). Prompts are budgeted against the
//! configured context window before sending.

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::budget::fit_prompt;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, Role, StopReason, TokenUsage};
use crate::config::LlmConfig;

/// Initial backoff delay for retries
pub(crate) const INITIAL_BACKOFF_MS: u64 = 800;

/// Longest wait a server's retry-after header can impose between attempts
pub(crate) const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Request timeout, rate limit, or any 5xx
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Exponential backoff with a little jitter
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt.saturating_sub(1));
    let jitter = rand::rng().random_range(0..=base / 10);
    Duration::from_millis(base + jitter)
}

/// Wait before retry `attempt`, honouring a server-requested delay
pub(crate) fn retry_delay(last_error: Option<&LlmError>, attempt: u32) -> Duration {
    last_error
        .and_then(LlmError::retry_after)
        .map(|wait| wait.min(MAX_RATE_LIMIT_WAIT))
        .unwrap_or_else(|| backoff_delay(attempt))
}

/// Rate-limit error from a 429 response's `retry-after` seconds (60 when absent)
pub(crate) fn rate_limited(headers: &HeaderMap) -> LlmError {
    let retry_after = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(60);
    LlmError::RateLimited {
        retry_after: Duration::from_secs(retry_after),
    }
}

/// Map a reqwest failure to an LlmError, keeping timeouts distinct
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(timeout)
    } else {
        LlmError::Network(err)
    }
}

/// Error for a non-success status, with a clearer message for gated models
pub(crate) fn status_error(status: u16, model: &str, body: String) -> LlmError {
    if status == 403 {
        return LlmError::ApiError {
            status,
            message: format!(
                "unauthorized for model {}; the model may be gated or not on your plan: {}",
                model, body
            ),
        };
    }
    LlmError::ApiError { status, message: body }
}

/// OpenAI-compatible API client
pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    http_retries: u32,
    context_window: u32,
    temperature: f32,
    timeout: Duration,
}

impl OpenAIClient {
    /// Create a new client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.base_url, "from_config: called");
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
            context_window: config.context_window,
            temperature: config.temperature,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }

    /// Build the request body for the Chat Completions API
    fn build_request_body(&self, request: &CompletionRequest, messages: &[Message], max_tokens: u32) -> serde_json::Value {
        debug!(%self.model, max_tokens, "build_request_body: called");

        let mut api_messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];

        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            api_messages.push(serde_json::json!({
                "role": role,
                "content": msg.content,
            }));
        }

        serde_json::json!({
            "model": self.model,
            "messages": api_messages,
            "max_tokens": max_tokens,
            "temperature": request.temperature.unwrap_or(self.temperature),
        })
    }

    /// Fit the last user message into the context window
    fn budget_messages(&self, request: &CompletionRequest) -> Result<(Vec<Message>, u32), LlmError> {
        let mut messages = request.messages.clone();
        let last_user = messages.iter().rposition(|m| m.role == Role::User);
        let Some(idx) = last_user else {
            return Ok((messages, request.max_tokens.min(self.max_tokens)));
        };

        let (fitted, max_out) = fit_prompt(
            &request.system_prompt,
            &messages[idx].content,
            self.context_window,
            request.max_tokens.min(self.max_tokens),
        )?;
        messages[idx].content = fitted;
        Ok((messages, max_out))
    }

    /// Parse the Chat Completions response
    fn parse_response(&self, api_response: OpenAIResponse) -> Result<CompletionResponse, LlmError> {
        debug!(choices = api_response.choices.len(), "parse_response: called");
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("API returned no choices".to_string()))?;

        let content = choice.message.content.filter(|c| !c.trim().is_empty());
        if content.is_none() {
            return Err(LlmError::InvalidResponse("API returned empty content".to_string()));
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };

        let usage = api_response.usage.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            stop_reason,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "complete: called");
        let url = self.endpoint();
        let (messages, max_tokens) = self.budget_messages(&request)?;
        let body = self.build_request_body(&request, &messages, max_tokens);

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
                .header("Authorization", format!("Bearer {}", self.api_key))
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
            let api_response: OpenAIResponse = response.json().await.map_err(|e| transport_error(e, self.timeout))?;
            return self.parse_response(api_response);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }

    fn describe(&self) -> String {
        format!("openai:{}", self.model)
    }
}

// === API response types ===

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::llm::stub::{Reply, StubServer};
    use std::time::Instant;

    const OK_BODY: &str = r#"{"choices":[{"message":{"content":"ok"},"finish_reason":"stop"}]}"#;

    fn client(base_url: &str) -> OpenAIClient {
        OpenAIClient {
            model: "test-model".to_string(),
            api_key: "key".to_string(),
            base_url: base_url.to_string(),
            http: Client::new(),
            max_tokens: 4096,
            http_retries: 2,
            context_window: 32_768,
            temperature: 0.2,
            timeout: Duration::from_secs(90),
        }
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 429, 500, 501, 502, 503, 504, 599] {
            assert!(is_retryable_status(status));
        }
        for status in [400, 401, 403, 404] {
            assert!(!is_retryable_status(status));
        }
    }

    #[test]
    fn test_backoff_grows() {
        assert!(backoff_delay(1) >= Duration::from_millis(800));
        assert!(backoff_delay(2) >= Duration::from_millis(1600));
        assert!(backoff_delay(2) <= Duration::from_millis(1760));
    }

    #[test]
    fn test_endpoint_with_and_without_version() {
        assert_eq!(
            client("https://api.featherless.ai").endpoint(),
            "https://api.featherless.ai/v1/chat/completions"
        );
        assert_eq!(
            client("https://api.featherless.ai/v1").endpoint(),
            "https://api.featherless.ai/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_request_body() {
        let c = client("https://example.com");
        let request = CompletionRequest::single("sys", "user text", 1000);
        let (messages, max) = c.budget_messages(&request).unwrap();
        let body = c.build_request_body(&request, &messages, max);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user text");
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_parse_response_rejects_empty_content() {
        let c = client("https://example.com");
        let api: OpenAIResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "},"finish_reason":"stop"}]}"#).unwrap();
        assert!(matches!(c.parse_response(api), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_response_ok() {
        let c = client("https://example.com");
        let api: OpenAIResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"{}"},"finish_reason":"length"}],"usage":{"prompt_tokens":5,"completion_tokens":7}}"#,
        )
        .unwrap();
        let resp = c.parse_response(api).unwrap();
        assert_eq!(resp.content.as_deref(), Some("{}"));
        assert_eq!(resp.stop_reason, StopReason::MaxTokens);
        assert_eq!(resp.usage.output_tokens, 7);
    }

    #[test]
    fn test_gated_model_message() {
        let err = status_error(403, "big-model", "forbidden".to_string());
        assert!(err.to_string().contains("gated"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_persistent_5xx_exhausts_retries_as_transient() {
        let stub = StubServer::start(vec![Reply::new(503, "busy")]).await;
        let c = client(&stub.base_url);

        let err = c.complete(CompletionRequest::single("sys", "hi", 100)).await.unwrap_err();
        assert_eq!(stub.hits(), c.http_retries as usize + 1);
        assert!(matches!(err, LlmError::ApiError { status: 503, .. }), "{:?}", err);

        let err = PipelineError::from(err);
        assert!(matches!(err, PipelineError::Transient(_)));
        assert!(err.to_string().contains("503: busy"));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_status() {
        let stub = StubServer::start(vec![Reply::new(502, "bad gateway"), Reply::new(200, OK_BODY)]).await;
        let c = client(&stub.base_url);

        let resp = c.complete(CompletionRequest::single("sys", "hi", 100)).await.unwrap();
        assert_eq!(resp.content.as_deref(), Some("ok"));
        assert_eq!(stub.hits(), 2);
    }

    #[tokio::test]
    async fn test_retry_after_header_sets_wait() {
        let stub = StubServer::start(vec![
            Reply::new(429, "slow down").with_header("Retry-After", "2"),
            Reply::new(200, OK_BODY),
        ])
        .await;
        let c = client(&stub.base_url);

        let started = Instant::now();
        let resp = c.complete(CompletionRequest::single("sys", "hi", 100)).await.unwrap();
        // Exponential backoff alone would wait under a second
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(resp.content.as_deref(), Some("ok"));
        assert_eq!(stub.hits(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_without_retries_left() {
        let stub = StubServer::start(vec![Reply::new(429, "").with_header("Retry-After", "7")]).await;
        let c = OpenAIClient {
            http_retries: 0,
            ..client(&stub.base_url)
        };

        let err = c.complete(CompletionRequest::single("sys", "hi", 100)).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(stub.hits(), 1);
        assert!(matches!(PipelineError::from(err), PipelineError::Transient(_)));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let stub = StubServer::start(vec![Reply::new(400, "bad request")]).await;
        let c = client(&stub.base_url);

        let err = c.complete(CompletionRequest::single("sys", "hi", 100)).await.unwrap_err();
        assert_eq!(stub.hits(), 1);
        assert!(matches!(PipelineError::from(err), PipelineError::Backend(_)));
    }

    #[test]
    fn test_retry_delay_caps_server_wait() {
        let limited = LlmError::RateLimited {
            retry_after: Duration::from_secs(600),
        };
        assert_eq!(retry_delay(Some(&limited), 1), MAX_RATE_LIMIT_WAIT);
        assert!(retry_delay(None, 1) >= Duration::from_millis(INITIAL_BACKOFF_MS));
    }
}
