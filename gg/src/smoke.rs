//! Post-build smoke checks
//!
//! Confirms a bundle is complete for its build strategy and, for composed
//! bundles, that the program parses.

use gamestore::{ASSETS_DIR, INDEX_FILE, PLAN_FILE, PROGRAM_FILE, RUNTIME_FILE};
use tracing::{debug, info};

use crate::builder::{Artifact, BuildStrategy};
use crate::error::{PipelineError, PipelineResult};
use crate::safety::{SyntaxChecker, SyntaxReport};

/// Files every bundle of a given strategy must contain
fn required_entries(strategy: BuildStrategy) -> &'static [&'static str] {
    match strategy {
        BuildStrategy::Composed => &[INDEX_FILE, PROGRAM_FILE, RUNTIME_FILE, PLAN_FILE],
        BuildStrategy::Passthrough => &[INDEX_FILE, ASSETS_DIR, PROGRAM_FILE, RUNTIME_FILE, PLAN_FILE],
    }
}

/// Runs smoke checks against freshly built artifacts
#[derive(Debug, Clone)]
pub struct SmokeChecker {
    syntax: SyntaxChecker,
}

impl SmokeChecker {
    pub fn new(syntax: SyntaxChecker) -> Self {
        Self { syntax }
    }

    pub async fn check(&self, artifact: &Artifact) -> PipelineResult<()> {
        debug!(job_id = %artifact.job_id, strategy = ?artifact.strategy, "SmokeChecker::check: called");
        let missing: Vec<String> = required_entries(artifact.strategy)
            .iter()
            .filter(|entry| !artifact.dir.join(entry).exists())
            .map(|entry| format!("missing artifact: {}", entry))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::ValidationFailed { violations: missing });
        }

        if artifact.strategy == BuildStrategy::Composed {
            let program = std::fs::read_to_string(artifact.dir.join(PROGRAM_FILE))?;
            match self.syntax.check(&program).await {
                SyntaxReport::Failed(detail) => {
                    return Err(PipelineError::ValidationFailed {
                        violations: vec![format!("syntax: {}", detail)],
                    });
                }
                SyntaxReport::Skipped => debug!("SmokeChecker::check: syntax check skipped"),
                SyntaxReport::Passed => debug!("SmokeChecker::check: syntax check passed"),
            }
        }

        info!(job_id = %artifact.job_id, "Smoke checks passed");
        Ok(())
    }
}
