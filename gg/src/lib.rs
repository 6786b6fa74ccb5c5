//! GameGen - prompt-to-game generation job pipeline
//!
//! A prompt becomes a plan, the plan becomes a scene module, and the module
//! is assembled into a self-contained browser bundle in the game store.
//! Every generation step is validated and repaired a bounded number of times,
//! concurrent generation calls are capped by a shared semaphore, and "modify"
//! jobs derive new bundles from earlier preset-lineage artifacts.
//!
//! # Modules
//!
//! - [`orchestrator`] - job lifecycle driver
//! - [`registry`] - in-memory job records behind an actor
//! - [`generator`] - plan generator trait with deterministic and LLM backends
//! - [`repair`] - bounded generate/validate/repair loop
//! - [`editor`] - prompt-directive numeric rewrites of scene source
//! - [`builder`] - bundle assembly into the game store
//! - [`safety`] - forbidden-primitive, marker and syntax checks
//! - [`llm`] - LLM clients
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod builder;
pub mod cli;
pub mod config;
pub mod domain;
pub mod editor;
pub mod error;
pub mod generator;
pub mod llm;
pub mod orchestrator;
pub mod preset;
pub mod prompts;
pub mod registry;
pub mod repair;
pub mod safety;
pub mod smoke;

// Re-export commonly used types
pub use builder::{Artifact, ArtifactBuilder, BuildStrategy};
pub use config::{Config, GeneratorBackend, LlmConfig};
pub use domain::{GenerationMode, JobRecord, JobStatus, Plan};
pub use editor::{EditOutcome, PromptEditor};
pub use error::{PipelineError, PipelineResult};
pub use generator::{DeterministicGenerator, LlmGenerator, PlanGenerator, create_generator};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, create_client};
pub use orchestrator::Orchestrator;
pub use preset::Preset;
pub use registry::{JobRegistry, JobWriter, RegistryError};
pub use repair::{RepairLoop, RepairTask};
pub use safety::{SyntaxChecker, SyntaxReport};
pub use smoke::SmokeChecker;
