//! LLM Client module
//!
//! Provides LLM completion requests for the LLM-backed plan generator.

use std::sync::Arc;

use tracing::debug;

pub mod budget;
pub mod client;
mod error;
mod gemini;
mod openai;
#[cfg(test)]
mod stub;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Supports "openai" (any chat-completions endpoint) and "gemini".
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" | "featherless" => {
            debug!("create_client: creating OpenAI-compatible client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        "gemini" => {
            debug!("create_client: creating Gemini client");
            Ok(Arc::new(GeminiClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::Config(format!(
                "Unknown LLM provider: '{}'. Supported: openai, gemini",
                other
            )))
        }
    }
}
