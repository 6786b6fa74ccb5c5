//! Rule-based generator
//!
//! Produces a fixed arcade-survival plan and scene module without any model
//! call. Used when no LLM backend is configured and as the reference output
//! in tests.

use async_trait::async_trait;
use tracing::debug;

use super::PlanGenerator;
use crate::domain::{
    DifficultyParams, EnemyArchetype, Mechanic, Movement, PhysicsRules, Plan, PlayerConfig, SceneObject,
    SceneObjectKind,
};
use crate::error::PipelineResult;

const TITLE_MAX_CHARS: usize = 60;
const CORE_LOOP_MAX_CHARS: usize = 500;
const UPDATE_NOTE_CHARS: usize = 120;

/// Scene module used for every deterministic build
pub const SCENE_MODULE: &str = r#"function createGeneratedScene(Phaser, PLAN) {
  const toColor = (hex) => parseInt(String(hex).replace('#', ''), 16);

  return class GeneratedScene extends Phaser.Scene {
    constructor() {
      super('generated');
      this.score = 0;
    }

    create() {
      this.score = 0;
      this.cursors = this.input.keyboard.createCursorKeys();
      this.resetKey = this.input.keyboard.addKey(Phaser.Input.Keyboard.KeyCodes.R);
      this.shootKey = this.input.keyboard.addKey(Phaser.Input.Keyboard.KeyCodes.SPACE);

      const { width, height } = this.scale;
      this.player = this.add.circle(width / 2, height - 40, PLAN.player.radius, toColor(PLAN.player.color));
      this.playerSpeed = PLAN.player.speed;

      const archetype = PLAN.enemy_archetypes[0];
      this.enemies = [];
      for (let i = 0; i < Math.min(archetype.count, 25); i += 1) {
        const enemy = this.add.circle(60 + ((i * 137) % (width - 120)), -30 - i * 60, archetype.radius, toColor(archetype.color));
        enemy.speed = archetype.speed + i * 8;
        this.enemies.push(enemy);
      }
      this.bullets = [];

      this.scoreText = this.add.text(12, 12, 'Score: 0', { fontFamily: 'monospace', fontSize: '16px', color: '#d9faff' });
      this.hintText = this.add.text(12, height - 24, PLAN.ui_text.hint || '', { fontFamily: 'monospace', fontSize: '12px', color: '#8aa4b0' });
    }

    update(_time, deltaMs) {
      const dt = Math.min(deltaMs / 1000, 0.033);
      if (Phaser.Input.Keyboard.JustDown(this.resetKey)) {
        this.scene.restart();
        return;
      }

      const step = this.playerSpeed * dt;
      if (this.cursors.left.isDown) this.player.x -= step;
      if (this.cursors.right.isDown) this.player.x += step;
      if (this.cursors.up.isDown) this.player.y -= step;
      if (this.cursors.down.isDown) this.player.y += step;
      const r = PLAN.player.radius;
      this.player.x = Phaser.Math.Clamp(this.player.x, r, this.scale.width - r);
      this.player.y = Phaser.Math.Clamp(this.player.y, r, this.scale.height - r);

      if (Phaser.Input.Keyboard.JustDown(this.shootKey)) {
        const bullet = this.add.rectangle(this.player.x, this.player.y - 16, 4, 12, 0xa8f0ff);
        bullet.vy = -500;
        this.bullets.push(bullet);
      }
      this.bullets = this.bullets.filter((bullet) => {
        bullet.y += bullet.vy * dt;
        if (bullet.y < -20) {
          bullet.destroy();
          return false;
        }
        return true;
      });

      for (const enemy of this.enemies) {
        enemy.y += enemy.speed * dt;
        if (enemy.y > this.scale.height + 20) {
          enemy.y = -20;
          enemy.x = Phaser.Math.Between(20, this.scale.width - 20);
          this.score += PLAN.difficulty.score_per_enemy;
        }
      }
      this.scoreText.setText(`Score: ${this.score}`);
    }
  };
}
"#;

/// Title-case each word: a letter is upper-cased when it does not follow another letter
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Title derived from a prompt: collapsed whitespace, title-cased when short,
/// otherwise cut with an ellipsis
pub fn extract_title(prompt: &str) -> String {
    let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= TITLE_MAX_CHARS {
        return title_case(&collapsed);
    }
    let head: String = collapsed.chars().take(TITLE_MAX_CHARS - 3).collect();
    format!("{}...", head.trim_end())
}

/// Fixed arcade-survival plan titled after the prompt
pub fn default_plan(prompt: &str) -> Plan {
    let title = extract_title(prompt);
    Plan {
        title: title.clone(),
        genre: "Arcade Survival".to_string(),
        core_loop: "Move, dodge enemies, survive, and build score over time.".to_string(),
        controls: ["ArrowLeft", "ArrowRight", "ArrowUp", "ArrowDown", "R", "Space"]
            .into_iter()
            .map(String::from)
            .collect(),
        mechanics: vec![Mechanic::Dodge, Mechanic::Shoot, Mechanic::Survive],
        player: PlayerConfig {
            speed: 260.0,
            radius: 12,
            color: "#08f7ff".to_string(),
            health: 3,
        },
        enemy_archetypes: vec![EnemyArchetype {
            id: "enemy_faller".to_string(),
            movement: Movement::Fall,
            speed: 140.0,
            radius: 10,
            color: "#ff4d6d".to_string(),
            count: 6,
        }],
        player_rules: vec![
            "Player movement is 4-directional.".to_string(),
            "Player collision with enemy causes immediate loss.".to_string(),
        ],
        enemy_rules: vec![
            "Enemies descend from top to bottom.".to_string(),
            "Enemies respawn above screen when they exit viewport.".to_string(),
        ],
        physics_rules: PhysicsRules {
            gravity: 0.0,
            max_speed: 300.0,
            friction: 0.0,
        },
        win_condition: "Reach score 30.".to_string(),
        lose_condition: "Collide with any enemy.".to_string(),
        ui_text: [
            ("title".to_string(), title),
            (
                "hint".to_string(),
                "Use arrow keys to survive, Space to shoot, and R to reset.".to_string(),
            ),
        ]
        .into_iter()
        .collect(),
        difficulty: DifficultyParams {
            enemy_spawn_interval_ms: 700,
            enemy_speed: 140.0,
            score_per_enemy: 1,
            target_score: 30,
        },
        scene_graph_objects: vec![
            SceneObject::new("player", SceneObjectKind::Player),
            SceneObject::new("enemy_1", SceneObjectKind::Enemy),
            SceneObject::new("projectile_1", SceneObjectKind::Projectile),
        ],
    }
}

/// Copy of `previous` retitled after the prompt, with the request noted in its core loop
pub fn modified_plan(prompt: &str, previous: &Plan) -> Plan {
    let mut plan = previous.clone();
    plan.title = extract_title(prompt);
    let note: String = prompt.chars().take(UPDATE_NOTE_CHARS).collect();
    let core_loop = format!("{} | Update: {}", previous.core_loop, note);
    plan.core_loop = core_loop.chars().take(CORE_LOOP_MAX_CHARS).collect();
    plan
}

/// Generator that never calls a model
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicGenerator;

impl DeterministicGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlanGenerator for DeterministicGenerator {
    async fn generate_plan(&self, prompt: &str, previous_plan: Option<&Plan>) -> PipelineResult<Plan> {
        debug!(has_previous = previous_plan.is_some(), "DeterministicGenerator::generate_plan: called");
        Ok(match previous_plan {
            Some(previous) => modified_plan(prompt, previous),
            None => default_plan(prompt),
        })
    }

    async fn generate_code(&self, _prompt: &str, _plan: &Plan, _previous_code: Option<&str>) -> PipelineResult<String> {
        debug!("DeterministicGenerator::generate_code: called");
        Ok(SCENE_MODULE.to_string())
    }

    async fn edit_source(&self, _prompt: &str, source: &str, _physics_context: &str) -> PipelineResult<String> {
        debug!("DeterministicGenerator::edit_source: called");
        Ok(source.to_string())
    }

    fn name(&self) -> String {
        "deterministic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::scene_module_violations;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("a 2d space game"), "A 2D Space Game");
        assert_eq!(title_case("DODGE the ROCKS"), "Dodge The Rocks");
        assert_eq!(title_case("it's fun"), "It'S Fun");
    }

    #[test]
    fn test_extract_title_collapses_whitespace() {
        assert_eq!(extract_title("  dodge   falling\n rocks "), "Dodge Falling Rocks");
    }

    #[test]
    fn test_extract_title_long_prompt_is_cut() {
        let prompt = "word ".repeat(30);
        let title = extract_title(&prompt);
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= TITLE_MAX_CHARS);
        // Long titles are not title-cased
        assert!(title.starts_with("word word"));
    }

    #[test]
    fn test_default_plan_is_valid() {
        let plan = default_plan("dodge falling rocks");
        assert_eq!(plan.violations(), Vec::<String>::new());
        assert_eq!(plan.title, "Dodge Falling Rocks");
        assert_eq!(plan.ui_text["title"], plan.title);
        assert_eq!(plan.mechanics.len(), 3);
    }

    #[test]
    fn test_modified_plan_is_a_copy() {
        let base = default_plan("dodge falling rocks");
        let modified = modified_plan("make it faster", &base);
        assert_eq!(modified.title, "Make It Faster");
        assert!(modified.core_loop.ends_with("| Update: make it faster"));
        assert_eq!(modified.player, base.player);
        // Base is untouched
        assert_eq!(base.title, "Dodge Falling Rocks");
    }

    #[test]
    fn test_repeated_modification_stays_valid() {
        let mut plan = default_plan("dodge");
        let prompt = "x".repeat(200);
        for _ in 0..10 {
            plan = modified_plan(&prompt, &plan);
        }
        assert!(plan.is_valid(), "{:?}", plan.violations());
    }

    #[test]
    fn test_scene_module_passes_safety() {
        assert!(scene_module_violations(SCENE_MODULE).is_empty());
    }

    #[tokio::test]
    async fn test_generator_edit_source_is_identity() {
        let generator = DeterministicGenerator::new();
        let out = generator.edit_source("faster", "const a = 1;", "").await.unwrap();
        assert_eq!(out, "const a = 1;");
    }
}
