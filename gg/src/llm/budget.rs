//! Prompt and output token budgeting
//!
//! Token counts are estimated at four characters per token, which is close
//! enough across providers to keep requests inside the context window.

use tracing::debug;

use super::LlmError;

/// Smallest output budget worth sending a request for
pub const MIN_OUTPUT_TOKENS: u32 = 512;

/// Headroom for chat framing tokens
pub const RESERVED_TOKENS: u32 = 128;

/// Marker inserted where the middle of a context was dropped
pub const TRUNCATION_MARKER: &str = "/* CONTEXT TRUNCATED */";

/// Estimate the token count of a text
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u64;
    ((chars + 3) / 4).clamp(1, u32::MAX as u64) as u32
}

/// Keep the head and tail of `text` so the result fits in about `max_chars`
pub fn truncate_context(text: &str, max_chars: usize) -> String {
    let len = text.chars().count();
    if len <= max_chars {
        return text.to_string();
    }
    debug!(len, max_chars, "truncate_context: truncating");
    let half = max_chars / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(len - half).collect();
    format!("{}\n{}\n{}", head, TRUNCATION_MARKER, tail)
}

/// Fit a user prompt into the context window and pick the output budget
///
/// Returns the (possibly truncated) prompt and the max output tokens.
pub fn fit_prompt(
    system_prompt: &str,
    prompt: &str,
    context_window: u32,
    max_tokens: u32,
) -> Result<(String, u32), LlmError> {
    debug!(context_window, max_tokens, "fit_prompt: called");
    let max_input = context_window as i64 - MIN_OUTPUT_TOKENS as i64 - RESERVED_TOKENS as i64;
    if max_input <= 0 {
        return Err(LlmError::Config(format!(
            "context window {} is too small; increase llm.context-window",
            context_window
        )));
    }
    let max_input = max_input as u32;

    let mut prompt = prompt.to_string();
    let mut combined = estimate_tokens(system_prompt) + estimate_tokens(&prompt);
    if combined > max_input {
        let system_chars = (estimate_tokens(system_prompt) as usize) * 4;
        let overhead = TRUNCATION_MARKER.len() + 2 + 4;
        let budget_chars = ((max_input as usize) * 4)
            .saturating_sub(system_chars + overhead)
            .max(800);
        debug!(combined, max_input, budget_chars, "fit_prompt: prompt over budget, truncating");
        prompt = truncate_context(&prompt, budget_chars);
        combined = estimate_tokens(system_prompt) + estimate_tokens(&prompt);
    }

    let available = context_window as i64 - combined as i64 - RESERVED_TOKENS as i64;
    if available < MIN_OUTPUT_TOKENS as i64 {
        return Err(LlmError::Config(
            "prompt is too large for the model context window after truncation".to_string(),
        ));
    }

    Ok((prompt, max_tokens.min(available as u32)))
}
