//! LLM-backed generator
//!
//! Every call runs through a [`RepairLoop`]: the model's reply is validated
//! and, when it falls short, the violations are sent back for a corrected
//! attempt.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};

use super::PlanGenerator;
use super::extract::{extract_javascript, extract_json};
use crate::config::Config;
use crate::domain::Plan;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::budget::truncate_context;
use crate::llm::{CompletionRequest, LlmClient, LlmError, create_client};
use crate::prompts::PromptLoader;
use crate::repair::{RepairLoop, RepairTask};
use crate::safety::{SyntaxChecker, scene_module_violations};

use super::deterministic::default_plan;

static CLASS_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid class regex"));

/// Exact plan shape, repeated in every plan prompt
pub const KEY_CONTRACT: &str = "Top-level required keys:
- title, genre, core_loop, controls, mechanics, player, enemy_archetypes,
  player_rules, enemy_rules, physics_rules, win_condition, lose_condition,
  ui_text, difficulty, scene_graph_objects

Required object shapes:
- physics_rules: { gravity, max_speed, friction }
- difficulty: { enemy_spawn_interval_ms, enemy_speed, score_per_enemy, target_score }
- player: { speed, radius, color, health }
- enemy_archetypes[]: { id, movement, speed, radius, color, count }
- scene_graph_objects[]: { id, kind }

Allowed values:
- mechanics: dodge, shoot, collect, survive (1 to 3 entries)
- movement: fall, zigzag, chase
- kind: player, enemy, projectile, pickup, decoration

Forbidden examples (do NOT use):
- physics_rules.collision_type, physics_rules.description
- difficulty.scaling_factor, difficulty.description
- scene_graph_objects[].name";

/// Class names declared in `source`
fn declared_classes(source: &str) -> Vec<String> {
    CLASS_DECL.captures_iter(source).map(|c| c[1].to_string()).collect()
}

/// Generator that asks a language model and repairs its answers
pub struct LlmGenerator {
    client: Arc<dyn LlmClient>,
    prompts: PromptLoader,
    repair: RepairLoop,
    syntax: SyntaxChecker,
    max_tokens: u32,
    context_chars: usize,
}

impl LlmGenerator {
    pub fn new(client: Arc<dyn LlmClient>, prompts: PromptLoader, repair: RepairLoop, syntax: SyntaxChecker) -> Self {
        Self {
            client,
            prompts,
            repair,
            syntax,
            max_tokens: 32_768,
            context_chars: 200_000,
        }
    }

    /// Build the client, prompt loader and limits from configuration
    pub fn from_config(config: &Config, syntax: SyntaxChecker) -> Result<Self, LlmError> {
        debug!(provider = %config.llm.provider, "LlmGenerator::from_config: called");
        let client = create_client(&config.llm)?;
        Ok(Self::new(
            client,
            PromptLoader::new(config.storage.prompts_dir.as_ref()),
            RepairLoop::new(config.generation.max_attempts),
            syntax,
        )
        .with_limits(config.llm.max_tokens, config.llm.context_chars))
    }

    pub fn with_limits(mut self, max_tokens: u32, context_chars: usize) -> Self {
        self.max_tokens = max_tokens;
        self.context_chars = context_chars.max(1);
        self
    }

    fn render(&self, template: &str, context: &serde_json::Value) -> PipelineResult<String> {
        self.prompts
            .render(template, context)
            .map_err(|e| PipelineError::Backend(format!("{:#}", e)))
    }

    /// One model round trip with the named template
    async fn call(&self, template: &str, context: serde_json::Value) -> PipelineResult<String> {
        debug!(%template, "LlmGenerator::call: called");
        let system = self.render("system", &json!({}))?;
        let user = self.render(template, &context)?;
        let response = self
            .client
            .complete(CompletionRequest::single(system, user, self.max_tokens))
            .await?;
        response
            .content
            .ok_or_else(|| PipelineError::Backend(format!("{} returned no content", self.client.describe())))
    }

    fn plan_json(plan: &Plan) -> PipelineResult<String> {
        plan.to_json_pretty()
            .map_err(|e| PipelineError::Backend(format!("Failed to serialize plan: {}", e)))
    }
}

// === Repair tasks ===

struct PlanTask<'a> {
    generator: &'a LlmGenerator,
    prompt: &'a str,
    current_plan: Option<String>,
    template_plan: String,
}

#[async_trait]
impl RepairTask for PlanTask<'_> {
    type Output = String;

    async fn generate(&self) -> PipelineResult<String> {
        let reply = self
            .generator
            .call(
                "plan",
                json!({
                    "prompt": self.prompt,
                    "key_contract": KEY_CONTRACT,
                    "current_plan": self.current_plan,
                    "template_plan": self.template_plan,
                }),
            )
            .await?;
        Ok(extract_json(&reply))
    }

    async fn validate(&self, output: &String) -> Vec<String> {
        Plan::from_json(output).err().unwrap_or_default()
    }

    async fn repair(&self, previous: &String, violations: &[String]) -> PipelineResult<String> {
        let reply = self
            .generator
            .call(
                "plan-repair",
                json!({
                    "prompt": self.prompt,
                    "key_contract": KEY_CONTRACT,
                    "current_plan": self.current_plan,
                    "invalid": previous,
                    "violations": violations,
                }),
            )
            .await?;
        Ok(extract_json(&reply))
    }

    fn label(&self) -> &str {
        "plan"
    }
}

struct CodeTask<'a> {
    generator: &'a LlmGenerator,
    prompt: &'a str,
    plan: String,
    previous_code: Option<String>,
}

#[async_trait]
impl RepairTask for CodeTask<'_> {
    type Output = String;

    async fn generate(&self) -> PipelineResult<String> {
        let reply = self
            .generator
            .call(
                "code",
                json!({
                    "prompt": self.prompt,
                    "plan": self.plan,
                    "previous_code": self.previous_code,
                }),
            )
            .await?;
        Ok(extract_javascript(&reply))
    }

    async fn validate(&self, output: &String) -> Vec<String> {
        let mut violations = scene_module_violations(output);
        if violations.is_empty() {
            // Syntax only matters once the module is structurally acceptable
            violations.extend(self.generator.syntax.check_scene_module(output).await.violation());
        }
        violations
    }

    async fn repair(&self, previous: &String, violations: &[String]) -> PipelineResult<String> {
        let reply = self
            .generator
            .call(
                "code-repair",
                json!({
                    "prompt": self.prompt,
                    "plan": self.plan,
                    "invalid": previous,
                    "violations": violations,
                }),
            )
            .await?;
        Ok(extract_javascript(&reply))
    }

    fn label(&self) -> &str {
        "code"
    }
}

struct EditTask<'a> {
    generator: &'a LlmGenerator,
    prompt: &'a str,
    source: String,
    physics_context: String,
    classes: Vec<String>,
}

#[async_trait]
impl RepairTask for EditTask<'_> {
    type Output = String;

    async fn generate(&self) -> PipelineResult<String> {
        let reply = self
            .generator
            .call(
                "edit",
                json!({
                    "prompt": self.prompt,
                    "physics_context": self.physics_context,
                    "source": self.source,
                }),
            )
            .await?;
        Ok(extract_javascript(&reply))
    }

    async fn validate(&self, output: &String) -> Vec<String> {
        if output.trim().is_empty() {
            return vec!["empty: edited source is empty".to_string()];
        }
        let kept = declared_classes(output);
        self.classes
            .iter()
            .filter(|name| !kept.contains(name))
            .map(|name| format!("missing: class {}", name))
            .collect()
    }

    async fn repair(&self, previous: &String, violations: &[String]) -> PipelineResult<String> {
        let reply = self
            .generator
            .call(
                "edit-repair",
                json!({
                    "prompt": self.prompt,
                    "source": self.source,
                    "invalid": previous,
                    "violations": violations,
                }),
            )
            .await?;
        Ok(extract_javascript(&reply))
    }

    fn label(&self) -> &str {
        "edit"
    }
}

#[async_trait]
impl PlanGenerator for LlmGenerator {
    async fn generate_plan(&self, prompt: &str, previous_plan: Option<&Plan>) -> PipelineResult<Plan> {
        debug!(has_previous = previous_plan.is_some(), "LlmGenerator::generate_plan: called");
        let task = PlanTask {
            generator: self,
            prompt,
            current_plan: previous_plan.map(Self::plan_json).transpose()?,
            template_plan: Self::plan_json(&default_plan(prompt))?,
        };
        let raw = self.repair.run(&task).await?;
        let plan = Plan::from_json(&raw).map_err(|violations| PipelineError::GenerationInvalid {
            attempts: self.repair.max_attempts(),
            violations,
        })?;
        info!(title = %plan.title, "Plan generated");
        Ok(plan)
    }

    async fn generate_code(&self, prompt: &str, plan: &Plan, previous_code: Option<&str>) -> PipelineResult<String> {
        debug!(has_previous = previous_code.is_some(), "LlmGenerator::generate_code: called");
        let task = CodeTask {
            generator: self,
            prompt,
            plan: Self::plan_json(plan)?,
            previous_code: previous_code.map(|code| truncate_context(code, self.context_chars)),
        };
        let code = self.repair.run(&task).await?;
        info!(len = code.len(), "Scene module generated");
        Ok(code)
    }

    async fn edit_source(&self, prompt: &str, source: &str, physics_context: &str) -> PipelineResult<String> {
        debug!(source_len = source.len(), "LlmGenerator::edit_source: called");
        let task = EditTask {
            generator: self,
            prompt,
            source: truncate_context(source, self.context_chars),
            physics_context: truncate_context(physics_context, (self.context_chars / 2).max(4000)),
            classes: declared_classes(source),
        };
        let edited = self.repair.run(&task).await?;
        info!(len = edited.len(), "Source edited");
        Ok(edited)
    }

    fn name(&self) -> String {
        format!("llm ({})", self.client.describe())
    }
}
