//! LLM request/response types
//!
//! Provider-agnostic shapes shared by the chat-completions and
//! generateContent clients.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A completion request - everything needed for one LLM call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (rendered from a Handlebars template)
    pub system_prompt: String,

    /// Conversation, usually a single user message
    pub messages: Vec<Message>,

    /// Upper bound for response tokens
    pub max_tokens: u32,

    /// Sampling temperature, provider default when None
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Single-turn request with one user message
    pub fn single(system_prompt: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: vec![Message::user(user)],
            max_tokens,
            temperature: None,
        }
    }

    /// Concatenated text of all user messages
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Text content (if any)
    pub content: Option<String>,

    /// Why the model stopped
    pub stop_reason: StopReason,

    /// Token usage
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Plain text response, used by mocks and tests
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
}

/// Token usage for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
