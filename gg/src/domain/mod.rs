//! Domain types for generation jobs and plans

mod job;
mod plan;

pub use job::{GenerationMode, JobRecord, JobStatus};
pub use plan::{
    DifficultyParams, EnemyArchetype, Mechanic, Movement, PhysicsRules, Plan, PlayerConfig, SceneObject,
    SceneObjectKind, required_plan_keys,
};

#[cfg(test)]
pub(crate) use plan::tests::sample_plan_value;
