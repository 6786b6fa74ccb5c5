//! Job orchestrator
//!
//! Accepts generation requests, records them in the [`JobRegistry`] and drives
//! each job through plan generation, code generation or source editing,
//! bundle assembly and smoke checks. Every plan generator call holds a permit
//! from a shared semaphore; preset and editor paths never take one.

use std::sync::Arc;

use gamestore::is_valid_game_id;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::builder::{Artifact, ArtifactBuilder, extract_scene_module};
use crate::config::Config;
use crate::domain::{GenerationMode, JobRecord, JobStatus, Plan};
use crate::editor::{PromptEditor, physics_context};
use crate::error::{PipelineError, PipelineResult};
use crate::generator::{PlanGenerator, create_generator};
use crate::preset::Preset;
use crate::registry::{JobRegistry, JobWriter, RegistryError};
use crate::safety::SyntaxChecker;
use crate::smoke::SmokeChecker;
use gamestore::GameStore;

pub const MAX_PROMPT_CHARS: usize = 3000;
pub const MIN_BASE_ID_CHARS: usize = 6;
pub const MAX_BASE_ID_CHARS: usize = 128;

/// What a successful job leaves behind
struct JobOutcome {
    plan: Plan,
    artifact: Artifact,
    base_game_id: Option<String>,
}

/// Drives generation jobs from request to bundle
#[derive(Clone)]
pub struct Orchestrator {
    registry: JobRegistry,
    builder: ArtifactBuilder,
    generator: Arc<dyn PlanGenerator>,
    semaphore: Arc<Semaphore>,
    editor: PromptEditor,
    preset: Preset,
    smoke: SmokeChecker,
}

impl Orchestrator {
    pub fn new(
        registry: JobRegistry,
        builder: ArtifactBuilder,
        generator: Arc<dyn PlanGenerator>,
        preset: Preset,
        smoke: SmokeChecker,
        max_concurrent_calls: usize,
    ) -> Self {
        let permits = max_concurrent_calls.max(1);
        debug!(permits, generator = %generator.name(), "Orchestrator::new: called");
        Self {
            registry,
            builder,
            generator,
            semaphore: Arc::new(Semaphore::new(permits)),
            editor: PromptEditor::new(),
            preset,
            smoke,
        }
    }

    /// Wire up every collaborator from configuration
    ///
    /// Spawns the registry actor, so this must run inside a tokio runtime.
    pub async fn from_config(config: &Config) -> PipelineResult<Self> {
        debug!("Orchestrator::from_config: called");
        let store = GameStore::open(&config.storage.games_dir)?;
        let builder = ArtifactBuilder::new(
            store,
            config.storage.runtime_paths.clone(),
            config.preset.relay_path.clone(),
        );
        let syntax = SyntaxChecker::from_config(&config.generation).await;
        Ok(Self::new(
            JobRegistry::spawn(),
            builder,
            create_generator(config).await?,
            Preset::from_config(&config.preset, &config.storage),
            SmokeChecker::new(syntax),
            config.generation.max_concurrent_calls,
        ))
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn store(&self) -> &GameStore {
        self.builder.store()
    }

    /// Validate a request and record a new job in the Designing status
    ///
    /// No generation happens here; call [`Orchestrator::process`] or
    /// [`Orchestrator::spawn`] with the returned id.
    pub async fn create(&self, prompt: &str, mode: GenerationMode, base_game_id: Option<&str>) -> PipelineResult<JobRecord> {
        debug!(%mode, ?base_game_id, "create: called");
        let prompt = prompt.trim();
        let prompt_chars = prompt.chars().count();
        if prompt_chars == 0 || prompt_chars > MAX_PROMPT_CHARS {
            return Err(PipelineError::InvalidRequest(format!(
                "prompt must be 1 to {} characters, got {}",
                MAX_PROMPT_CHARS, prompt_chars
            )));
        }

        if let Some(base) = base_game_id {
            let base_chars = base.chars().count();
            if !(MIN_BASE_ID_CHARS..=MAX_BASE_ID_CHARS).contains(&base_chars) || !is_valid_game_id(base) {
                return Err(PipelineError::InvalidRequest(format!("malformed base game id: {}", base)));
            }
            if !self.store().has_plan(base) {
                return Err(PipelineError::InvalidRequest(format!("base game {} does not exist", base)));
            }
        } else if mode == GenerationMode::Modify {
            return Err(PipelineError::InvalidRequest(
                "modify mode requires a base game id".to_string(),
            ));
        }

        let record = JobRecord::new(prompt, mode, base_game_id.map(String::from));
        self.registry.insert(record.clone()).await?;
        info!(job_id = %record.id, %mode, "Job created");
        Ok(record)
    }

    pub async fn get(&self, job_id: &str) -> PipelineResult<Option<JobRecord>> {
        debug!(%job_id, "get: called");
        Ok(self.registry.get(job_id).await?)
    }

    /// Run `process` for a job on its own task
    pub fn spawn(&self, job_id: &str) -> JoinHandle<PipelineResult<JobRecord>> {
        debug!(%job_id, "spawn: called");
        let orchestrator = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move { orchestrator.process(&job_id).await })
    }

    /// Drive a job to Ready or Failed and return its final record
    ///
    /// Errors raised while generating or building are recorded on the job and
    /// do not surface here; only claim and registry failures do.
    pub async fn process(&self, job_id: &str) -> PipelineResult<JobRecord> {
        debug!(%job_id, "process: called");
        let writer = self.registry.claim(job_id).await.map_err(|e| match e {
            RegistryError::NotFound(id) => PipelineError::NotFound(format!("job {}", id)),
            other => other.into(),
        })?;
        let job = self
            .registry
            .get(job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("job {}", job_id)))?;

        match self.run(&writer, &job).await {
            Ok(outcome) => {
                let record = writer
                    .finish(outcome.plan, outcome.artifact.url, outcome.base_game_id)
                    .await?;
                info!(%job_id, url = ?record.game_url, "Job ready");
                Ok(record)
            }
            Err(e) => {
                warn!(%job_id, error = %e, "Job failed");
                Ok(writer.fail(e.to_string()).await?)
            }
        }
    }

    async fn run(&self, writer: &JobWriter, job: &JobRecord) -> PipelineResult<JobOutcome> {
        debug!(job_id = %job.id, "run: called");
        writer.set_status(JobStatus::Designing).await?;

        if self.preset.matches(&job.prompt) {
            info!(job_id = %job.id, preset = self.preset.name(), "Prompt routed to preset");
            return self.run_preset(writer, job).await;
        }

        match job.mode {
            GenerationMode::New => self.run_new(writer, job).await,
            GenerationMode::Modify => {
                let base = self.resolve_base(job.base_game_id.as_deref())?;
                writer.set_base(&base).await?;
                self.run_modify(writer, job, base).await
            }
        }
    }

    /// Serve the preset bundle as-is, without any generation call
    ///
    /// The result is a fresh preset copy, so a base requested by a modify job
    /// is dropped from the finished record.
    async fn run_preset(&self, writer: &JobWriter, job: &JobRecord) -> PipelineResult<JobOutcome> {
        debug!(job_id = %job.id, "run_preset: called");
        let plan = self.preset.plan();
        let source = self.preset.load_source()?;

        writer.set_status(JobStatus::Building).await?;
        let artifact = self.builder.passthrough(&job.id, &plan, &self.preset, &source)?;

        self.smoke_test(writer, &artifact).await?;
        Ok(JobOutcome {
            plan,
            artifact,
            base_game_id: None,
        })
    }

    async fn run_new(&self, writer: &JobWriter, job: &JobRecord) -> PipelineResult<JobOutcome> {
        debug!(job_id = %job.id, "run_new: called");
        let plan = {
            let _permit = self.permit().await?;
            self.generator.generate_plan(&job.prompt, None).await?
        };
        info!(job_id = %job.id, title = %plan.title, "Plan accepted");

        writer.set_status(JobStatus::Building).await?;
        let module = {
            let _permit = self.permit().await?;
            self.generator.generate_code(&job.prompt, &plan, None).await?
        };
        let artifact = self.builder.compose(&job.id, &plan, &module)?;

        self.smoke_test(writer, &artifact).await?;
        Ok(JobOutcome {
            plan,
            artifact,
            base_game_id: None,
        })
    }

    /// Derive a new bundle from a lineage-eligible base
    async fn run_modify(&self, writer: &JobWriter, job: &JobRecord, base: String) -> PipelineResult<JobOutcome> {
        debug!(job_id = %job.id, %base, "run_modify: called");
        let store = self.store();
        let base_plan: Plan = store.read_plan(&base)?;
        let base_program = store.read_program(&base)?;
        let base_source = extract_scene_module(&base_program).unwrap_or(base_program);

        let plan = {
            let _permit = self.permit().await?;
            self.generator.generate_plan(&job.prompt, Some(&base_plan)).await?
        };

        writer.set_status(JobStatus::Building).await?;
        let outcome = self.editor.apply(&base_source, &job.prompt);
        let source = if outcome.changed() {
            for edit in &outcome.edits {
                info!(job_id = %job.id, %edit, "Applied prompt edit");
            }
            outcome.source
        } else {
            debug!(job_id = %job.id, "run_modify: no directive matched, asking generator");
            let context = physics_context(&base_source);
            let _permit = self.permit().await?;
            self.generator.edit_source(&job.prompt, &base_source, &context).await?
        };

        let artifact = self.builder.passthrough(&job.id, &plan, &self.preset, &source)?;
        let preset = self.preset.name().to_string();
        store.update_metadata(&job.id, |meta| meta.derive_from(&preset, &base, "modify"))?;

        self.smoke_test(writer, &artifact).await?;
        Ok(JobOutcome {
            plan,
            artifact,
            base_game_id: Some(base),
        })
    }

    async fn smoke_test(&self, writer: &JobWriter, artifact: &Artifact) -> PipelineResult<()> {
        writer.set_status(JobStatus::Testing).await?;
        self.smoke.check(artifact).await
    }

    /// Base artifact for a modify job
    ///
    /// A supplied id must be lineage-eligible; without one the most recently
    /// written eligible artifact is used.
    fn resolve_base(&self, supplied: Option<&str>) -> PipelineResult<String> {
        debug!(?supplied, "resolve_base: called");
        let preset = self.preset.name();
        match supplied {
            Some(id) if self.store().is_lineage_eligible(id, preset) => Ok(id.to_string()),
            Some(id) => Err(PipelineError::InvariantViolation(format!(
                "game {} is not derived from preset {}",
                id, preset
            ))),
            None => self
                .store()
                .latest_lineage_eligible(preset)?
                .ok_or_else(|| PipelineError::NotFound(format!("no {} game available to modify", preset))),
        }
    }

    async fn permit(&self) -> PipelineResult<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| PipelineError::InvariantViolation("generation semaphore closed".to_string()))
    }
}
