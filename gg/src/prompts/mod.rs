//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for plan, code and
//! source-edit generation and their repair passes.
//!
//! Template loading chain:
//! 1. `{prompts-dir}/{name}.pmt` (user override)
//! 2. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
