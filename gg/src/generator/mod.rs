//! Plan generators
//!
//! A [`PlanGenerator`] turns a prompt into a plan, a plan into a scene module,
//! and an existing scene source into an edited one. Each call either returns
//! a validated result or a terminal error; repair happens inside.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{Config, GeneratorBackend};
use crate::domain::Plan;
use crate::error::PipelineResult;
use crate::safety::SyntaxChecker;

mod deterministic;
pub mod extract;
mod llm;

pub use deterministic::{DeterministicGenerator, SCENE_MODULE, default_plan, extract_title, modified_plan};
pub use llm::{KEY_CONTRACT, LlmGenerator};

/// Source of plans and scene code
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// New plan, or a modification of `previous_plan`
    async fn generate_plan(&self, prompt: &str, previous_plan: Option<&Plan>) -> PipelineResult<Plan>;

    /// Scene module implementing `plan`
    async fn generate_code(&self, prompt: &str, plan: &Plan, previous_code: Option<&str>) -> PipelineResult<String>;

    /// Full updated `source` with the prompt's gameplay changes applied
    async fn edit_source(&self, prompt: &str, source: &str, physics_context: &str) -> PipelineResult<String>;

    /// Backend label for logs
    fn name(&self) -> String;
}

/// Pick the generator backend from configuration
///
/// `auto` uses the LLM backend when its API key is present and the
/// deterministic backend otherwise.
pub async fn create_generator(config: &Config) -> PipelineResult<Arc<dyn PlanGenerator>> {
    debug!(backend = ?config.generation.backend, "create_generator: called");
    let use_llm = match config.generation.backend {
        GeneratorBackend::Deterministic => false,
        GeneratorBackend::Llm => true,
        GeneratorBackend::Auto => config.llm.has_api_key(),
    };

    let generator: Arc<dyn PlanGenerator> = if use_llm {
        let syntax = SyntaxChecker::from_config(&config.generation).await;
        Arc::new(LlmGenerator::from_config(config, syntax)?)
    } else {
        Arc::new(DeterministicGenerator::new())
    };
    info!(generator = %generator.name(), "Plan generator selected");
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_backend() {
        let mut config = Config::default();
        config.generation.backend = GeneratorBackend::Deterministic;
        let generator = create_generator(&config).await.unwrap();
        assert_eq!(generator.name(), "deterministic");
    }

    #[tokio::test]
    async fn test_auto_without_key_is_deterministic() {
        let mut config = Config::default();
        config.llm.api_key_env = "GAMEGEN_TEST_UNSET_KEY_VAR".to_string();
        let generator = create_generator(&config).await.unwrap();
        assert_eq!(generator.name(), "deterministic");
    }

    #[tokio::test]
    async fn test_llm_without_key_fails() {
        let mut config = Config::default();
        config.generation.backend = GeneratorBackend::Llm;
        config.llm.api_key_env = "GAMEGEN_TEST_UNSET_KEY_VAR".to_string();
        assert!(create_generator(&config).await.is_err());
    }
}
