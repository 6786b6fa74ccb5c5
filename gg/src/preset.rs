//! Preset bundles
//!
//! A preset is a hand-built, tested game kept on disk as
//! `<presets-dir>/<name>/{bundle/, source/scene.js}`. Prompts that mention the
//! preset's trigger word are served from it without any generation call.

use std::path::PathBuf;

use tracing::debug;

use crate::config::{PresetConfig, StorageConfig};
use crate::domain::{
    DifficultyParams, EnemyArchetype, Mechanic, Movement, PhysicsRules, Plan, PlayerConfig, SceneObject,
    SceneObjectKind,
};
use crate::error::{PipelineError, PipelineResult};

const BUNDLE_DIR: &str = "bundle";
const SOURCE_FILE: &str = "source/scene.js";

/// Location and routing rule of one preset
#[derive(Debug, Clone)]
pub struct Preset {
    name: String,
    trigger: String,
    root: PathBuf,
}

impl Preset {
    pub fn new(name: impl Into<String>, trigger: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            trigger: trigger.into().to_lowercase(),
            root: root.into(),
        }
    }

    pub fn from_config(preset: &PresetConfig, storage: &StorageConfig) -> Self {
        Self::new(&preset.name, &preset.trigger, storage.presets_dir.join(&preset.name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the prompt routes to this preset (case-insensitive substring)
    pub fn matches(&self, prompt: &str) -> bool {
        !self.trigger.is_empty() && prompt.to_lowercase().contains(&self.trigger)
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.root.join(BUNDLE_DIR)
    }

    pub fn source_path(&self) -> PathBuf {
        self.root.join(SOURCE_FILE)
    }

    /// Scene source shipped with the preset
    pub fn load_source(&self) -> PipelineResult<String> {
        let path = self.source_path();
        debug!(path = %path.display(), "Preset::load_source: called");
        if !path.is_file() {
            return Err(PipelineError::MissingDependency(format!(
                "preset {} has no source at {}",
                self.name,
                path.display()
            )));
        }
        Ok(std::fs::read_to_string(&path)?)
    }

    /// Canonical plan describing the preset game
    pub fn plan(&self) -> Plan {
        Plan {
            title: "2D Shooter Preset".to_string(),
            genre: "Arena Shooter".to_string(),
            core_loop: "Move, aim, and shoot projectiles in a top-down arena.".to_string(),
            controls: ["ArrowLeft", "ArrowRight", "ArrowUp", "ArrowDown", "W", "A", "S", "D"]
                .into_iter()
                .map(String::from)
                .collect(),
            mechanics: vec![Mechanic::Shoot, Mechanic::Survive, Mechanic::Dodge],
            player: PlayerConfig {
                speed: 280.0,
                radius: 14,
                color: "#4cc9f0".to_string(),
                health: 10,
            },
            enemy_archetypes: vec![EnemyArchetype {
                id: "ducky_opponent".to_string(),
                movement: Movement::Chase,
                speed: 260.0,
                radius: 14,
                color: "#f94144".to_string(),
                count: 1,
            }],
            player_rules: vec![
                "Players move using arrow keys.".to_string(),
                "Projectiles are fired using WASD.".to_string(),
                "Health decreases on projectile hit.".to_string(),
            ],
            enemy_rules: vec!["The opponent mirrors networked player movement in multiplayer mode.".to_string()],
            physics_rules: PhysicsRules {
                gravity: 0.0,
                max_speed: 320.0,
                friction: 0.12,
            },
            win_condition: "Outlast the opposing player in the arena.".to_string(),
            lose_condition: "Health reaches zero.".to_string(),
            ui_text: [("title".to_string(), "2D Arena Shooter".to_string())]
                .into_iter()
                .collect(),
            difficulty: DifficultyParams {
                enemy_spawn_interval_ms: 1000,
                enemy_speed: 260.0,
                score_per_enemy: 1,
                target_score: 10,
            },
            scene_graph_objects: vec![
                SceneObject::new("player_1", SceneObjectKind::Player),
                SceneObject::new("player_2", SceneObjectKind::Enemy),
                SceneObject::new("projectile", SceneObjectKind::Projectile),
                SceneObject::new("arena_obstacle", SceneObjectKind::Decoration),
            ],
        }
    }
}
