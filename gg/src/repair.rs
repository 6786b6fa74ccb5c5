//! Bounded generate -> validate -> repair loop
//!
//! A [`RepairTask`] produces some output, reports what is wrong with it, and
//! can produce a corrected version given those problems. [`RepairLoop`] drives
//! a task until the output is clean or the attempt budget is spent.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};

/// One unit of repairable generation work
#[async_trait]
pub trait RepairTask: Send + Sync {
    type Output: Send + Sync;

    /// First attempt
    async fn generate(&self) -> PipelineResult<Self::Output>;

    /// Violation descriptors for `output`; empty means accepted
    async fn validate(&self, output: &Self::Output) -> Vec<String>;

    /// Corrected attempt given the previous output and all of its violations
    async fn repair(&self, previous: &Self::Output, violations: &[String]) -> PipelineResult<Self::Output>;

    /// Short label for logs
    fn label(&self) -> &str {
        "task"
    }
}

/// Drives a [`RepairTask`] for at most `max_attempts` validated outputs
#[derive(Debug, Clone, Copy)]
pub struct RepairLoop {
    max_attempts: u32,
}

impl Default for RepairLoop {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RepairLoop {
    /// `max_attempts` counts the initial generation; values below 1 are raised to 1
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the task to a clean output
    ///
    /// Errors from `generate` or `repair` propagate unchanged. When the budget
    /// runs out the last attempt's violations are returned in
    /// [`PipelineError::GenerationInvalid`].
    pub async fn run<T: RepairTask + ?Sized>(&self, task: &T) -> PipelineResult<T::Output> {
        debug!(label = task.label(), max_attempts = self.max_attempts, "RepairLoop::run: called");
        let mut output = task.generate().await?;
        let mut attempts = 1;

        loop {
            let violations = task.validate(&output).await;
            if violations.is_empty() {
                if attempts > 1 {
                    info!(label = task.label(), attempts, "Repaired output accepted");
                }
                debug!(label = task.label(), attempts, "RepairLoop::run: accepted");
                return Ok(output);
            }

            if attempts >= self.max_attempts {
                warn!(
                    label = task.label(),
                    attempts,
                    violation_count = violations.len(),
                    "Repair attempts exhausted"
                );
                return Err(PipelineError::GenerationInvalid { attempts, violations });
            }

            debug!(
                label = task.label(),
                attempts,
                violation_count = violations.len(),
                "RepairLoop::run: repairing"
            );
            output = task.repair(&output, &violations).await?;
            attempts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits a scripted sequence of outputs; "bad*" outputs are invalid
    struct Scripted {
        outputs: Mutex<Vec<&'static str>>,
        repairs: AtomicUsize,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(outputs: &[&'static str]) -> Self {
            let mut outputs = outputs.to_vec();
            outputs.reverse();
            Self {
                outputs: Mutex::new(outputs),
                repairs: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn next(&self) -> PipelineResult<String> {
            self.outputs
                .lock()
                .unwrap()
                .pop()
                .map(String::from)
                .ok_or_else(|| PipelineError::Backend("script exhausted".to_string()))
        }
    }

    #[async_trait]
    impl RepairTask for Scripted {
        type Output = String;

        async fn generate(&self) -> PipelineResult<String> {
            self.next()
        }

        async fn validate(&self, output: &String) -> Vec<String> {
            if output.starts_with("bad") {
                vec![format!("invalid: {}", output), "second".to_string()]
            } else {
                Vec::new()
            }
        }

        async fn repair(&self, _previous: &String, violations: &[String]) -> PipelineResult<String> {
            self.repairs.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(violations.to_vec());
            self.next()
        }
    }

    #[tokio::test]
    async fn test_valid_first_attempt_needs_no_repair() {
        let task = Scripted::new(&["good"]);
        let out = RepairLoop::new(3).run(&task).await.unwrap();
        assert_eq!(out, "good");
        assert_eq!(task.repairs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_on_second_attempt_stops_repairing() {
        let task = Scripted::new(&["bad1", "good", "never"]);
        let out = RepairLoop::new(3).run(&task).await.unwrap();
        assert_eq!(out, "good");
        assert_eq!(task.repairs.load(Ordering::SeqCst), 1);

        // Repair receives the full violation list
        let seen = task.seen.lock().unwrap();
        assert_eq!(seen[0], vec!["invalid: bad1".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_exhaustion_carries_last_violations() {
        let task = Scripted::new(&["bad1", "bad2", "bad3", "good"]);
        let err = RepairLoop::new(3).run(&task).await.unwrap_err();
        match err {
            PipelineError::GenerationInvalid { attempts, violations } => {
                assert_eq!(attempts, 3);
                assert_eq!(violations[0], "invalid: bad3");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(task.repairs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_generate_error_propagates() {
        let task = Scripted::new(&[]);
        let err = RepairLoop::default().run(&task).await.unwrap_err();
        assert!(matches!(err, PipelineError::Backend(_)));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_generates_once() {
        let task = Scripted::new(&["bad1"]);
        let err = RepairLoop::new(0).run(&task).await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationInvalid { attempts: 1, .. }));
    }
}
