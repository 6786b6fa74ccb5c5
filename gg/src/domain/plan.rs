//! Plan domain type
//!
//! A plan is the structured description of a game. Plans arriving from a
//! generation backend are untrusted text, so they go through
//! [`Plan::from_json`], which reports every violation it can find instead of
//! stopping at the first one. The violation list is what the repair loop
//! feeds back to the backend.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid color regex"));

/// Gameplay mechanic tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanic {
    Dodge,
    Shoot,
    Collect,
    Survive,
}

/// How an enemy archetype moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Fall,
    Zigzag,
    Chase,
}

/// Kind of a scene graph object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneObjectKind {
    Player,
    Enemy,
    Projectile,
    Pickup,
    Decoration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerConfig {
    pub speed: f64,
    pub radius: i64,
    pub color: String,
    pub health: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnemyArchetype {
    pub id: String,
    pub movement: Movement,
    pub speed: f64,
    pub radius: i64,
    pub color: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhysicsRules {
    pub gravity: f64,
    pub max_speed: f64,
    pub friction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DifficultyParams {
    pub enemy_spawn_interval_ms: i64,
    pub enemy_speed: f64,
    pub score_per_enemy: i64,
    pub target_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneObject {
    pub id: String,
    pub kind: SceneObjectKind,
}

impl SceneObject {
    pub fn new(id: impl Into<String>, kind: SceneObjectKind) -> Self {
        Self { id: id.into(), kind }
    }
}

/// Structured, schema-validated description of a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub title: String,
    pub genre: String,
    pub core_loop: String,
    pub controls: Vec<String>,
    pub mechanics: Vec<Mechanic>,
    pub player: PlayerConfig,
    pub enemy_archetypes: Vec<EnemyArchetype>,
    pub player_rules: Vec<String>,
    pub enemy_rules: Vec<String>,
    pub physics_rules: PhysicsRules,
    pub win_condition: String,
    pub lose_condition: String,
    #[serde(default)]
    pub ui_text: BTreeMap<String, String>,
    pub difficulty: DifficultyParams,
    pub scene_graph_objects: Vec<SceneObject>,
}

// === Shape checking ===
//
// Structural rules (field names, presence, JSON types, enumerations) are
// checked on the raw JSON value so that every offending field is reported.

#[derive(Debug, Clone, Copy)]
enum Shape {
    Text,
    Number,
    Integer,
    Choice(&'static [&'static str]),
    TextList,
    ChoiceList(&'static [&'static str]),
    TextMap,
    Object(&'static [FieldSpec]),
    ObjectList(&'static [FieldSpec]),
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    shape: Shape,
    required: bool,
}

const fn req(name: &'static str, shape: Shape) -> FieldSpec {
    FieldSpec {
        name,
        shape,
        required: true,
    }
}

const fn opt(name: &'static str, shape: Shape) -> FieldSpec {
    FieldSpec {
        name,
        shape,
        required: false,
    }
}

const MECHANICS: &[&str] = &["dodge", "shoot", "collect", "survive"];
const MOVEMENTS: &[&str] = &["fall", "zigzag", "chase"];
const SCENE_KINDS: &[&str] = &["player", "enemy", "projectile", "pickup", "decoration"];

const PLAYER_FIELDS: &[FieldSpec] = &[
    req("speed", Shape::Number),
    req("radius", Shape::Integer),
    req("color", Shape::Text),
    req("health", Shape::Integer),
];

const ENEMY_FIELDS: &[FieldSpec] = &[
    req("id", Shape::Text),
    req("movement", Shape::Choice(MOVEMENTS)),
    req("speed", Shape::Number),
    req("radius", Shape::Integer),
    req("color", Shape::Text),
    req("count", Shape::Integer),
];

const PHYSICS_FIELDS: &[FieldSpec] = &[
    req("gravity", Shape::Number),
    req("max_speed", Shape::Number),
    req("friction", Shape::Number),
];

const DIFFICULTY_FIELDS: &[FieldSpec] = &[
    req("enemy_spawn_interval_ms", Shape::Integer),
    req("enemy_speed", Shape::Number),
    req("score_per_enemy", Shape::Integer),
    req("target_score", Shape::Integer),
];

const SCENE_OBJECT_FIELDS: &[FieldSpec] = &[req("id", Shape::Text), req("kind", Shape::Choice(SCENE_KINDS))];

const PLAN_FIELDS: &[FieldSpec] = &[
    req("title", Shape::Text),
    req("genre", Shape::Text),
    req("core_loop", Shape::Text),
    req("controls", Shape::TextList),
    req("mechanics", Shape::ChoiceList(MECHANICS)),
    req("player", Shape::Object(PLAYER_FIELDS)),
    req("enemy_archetypes", Shape::ObjectList(ENEMY_FIELDS)),
    req("player_rules", Shape::TextList),
    req("enemy_rules", Shape::TextList),
    req("physics_rules", Shape::Object(PHYSICS_FIELDS)),
    req("win_condition", Shape::Text),
    req("lose_condition", Shape::Text),
    opt("ui_text", Shape::TextMap),
    req("difficulty", Shape::Object(DIFFICULTY_FIELDS)),
    req("scene_graph_objects", Shape::ObjectList(SCENE_OBJECT_FIELDS)),
];

/// Top-level keys a plan document must carry, in canonical order
pub fn required_plan_keys() -> Vec<&'static str> {
    PLAN_FIELDS.iter().filter(|f| f.required).map(|f| f.name).collect()
}

fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

/// Largest integer an f64 holds exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER).then_some(f as i64)
}

/// Whole numbers count as integers even when written as `14.0`
fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.as_f64().and_then(integral).is_some()
}

/// Rewrite integral floats as integers so typed decoding accepts them
fn normalize_integral_floats(value: &mut Value) {
    if value.is_f64()
        && let Some(i) = value.as_f64().and_then(integral)
    {
        *value = Value::from(i);
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(normalize_integral_floats),
        Value::Object(map) => map.values_mut().for_each(normalize_integral_floats),
        _ => {}
    }
}

fn check_object(value: &Value, fields: &[FieldSpec], path: &str, violations: &mut Vec<String>) {
    let Some(map) = value.as_object() else {
        violations.push(format!("type: {} must be an object", display_path(path)));
        return;
    };

    for key in map.keys() {
        if !fields.iter().any(|f| f.name == key) {
            violations.push(format!("unknown_field: {}", join_path(path, key)));
        }
    }

    for field in fields {
        let child_path = join_path(path, field.name);
        match map.get(field.name) {
            Some(child) => check_shape(child, field.shape, &child_path, violations),
            None if field.required => violations.push(format!("missing_field: {}", child_path)),
            None => {}
        }
    }
}

fn check_shape(value: &Value, shape: Shape, path: &str, violations: &mut Vec<String>) {
    match shape {
        Shape::Text => {
            if !value.is_string() {
                violations.push(format!("type: {} must be a string", path));
            }
        }
        Shape::Number => {
            if !value.is_number() {
                violations.push(format!("type: {} must be a number", path));
            }
        }
        Shape::Integer => {
            if !is_integer(value) {
                violations.push(format!("type: {} must be an integer", path));
            }
        }
        Shape::Choice(choices) => check_choice(value, choices, path, violations),
        Shape::TextList => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_shape(item, Shape::Text, &format!("{}[{}]", path, i), violations);
                }
            }
            None => violations.push(format!("type: {} must be a list", path)),
        },
        Shape::ChoiceList(choices) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_choice(item, choices, &format!("{}[{}]", path, i), violations);
                }
            }
            None => violations.push(format!("type: {} must be a list", path)),
        },
        Shape::TextMap => match value.as_object() {
            Some(map) => {
                for (key, item) in map {
                    check_shape(item, Shape::Text, &join_path(path, key), violations);
                }
            }
            None => violations.push(format!("type: {} must be an object", path)),
        },
        Shape::Object(fields) => check_object(value, fields, path, violations),
        Shape::ObjectList(fields) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_object(item, fields, &format!("{}[{}]", path, i), violations);
                }
            }
            None => violations.push(format!("type: {} must be a list", path)),
        },
    }
}

fn check_choice(value: &Value, choices: &[&str], path: &str, violations: &mut Vec<String>) {
    match value.as_str() {
        Some(s) if choices.contains(&s) => {}
        _ => violations.push(format!("enum: {} must be one of {}", path, choices.join(", "))),
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "plan" } else { path }
}

// === Range checking ===

struct RangeCheck<'a> {
    violations: &'a mut Vec<String>,
}

impl RangeCheck<'_> {
    fn text(&mut self, path: &str, value: &str, max: usize) {
        let len = value.chars().count();
        if len == 0 || len > max {
            self.violations
                .push(format!("length: {} must have 1..={} characters, got {}", path, max, len));
        }
    }

    fn items(&mut self, path: &str, len: usize, max: usize) {
        if len == 0 || len > max {
            self.violations
                .push(format!("length: {} must have 1..={} items, got {}", path, max, len));
        }
    }

    fn int(&mut self, path: &str, value: i64, min: i64, max: i64) {
        if value < min || value > max {
            self.violations
                .push(format!("range: {} must be in [{}, {}], got {}", path, min, max, value));
        }
    }

    fn closed(&mut self, path: &str, value: f64, min: f64, max: f64) {
        if !(value >= min && value <= max) {
            self.violations
                .push(format!("range: {} must be in [{}, {}], got {}", path, min, max, value));
        }
    }

    /// Exclusive lower bound, inclusive upper bound
    fn half_open(&mut self, path: &str, value: f64, min: f64, max: f64) {
        if !(value > min && value <= max) {
            self.violations
                .push(format!("range: {} must be in ({}, {}], got {}", path, min, max, value));
        }
    }

    fn color(&mut self, path: &str, value: &str) {
        if !COLOR_RE.is_match(value) {
            self.violations
                .push(format!("format: {} must be a #RRGGBB color, got {:?}", path, value));
        }
    }
}

impl Plan {
    /// Parse and validate a plan document
    ///
    /// Returns the full list of violations when the document is not a valid
    /// plan. Violations are prefixed with their category (`json`,
    /// `unknown_field`, `missing_field`, `type`, `enum`, `length`, `range`,
    /// `format`).
    pub fn from_json(text: &str) -> Result<Plan, Vec<String>> {
        debug!(len = text.len(), "Plan::from_json: called");
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Plan::from_json: not valid JSON");
                return Err(vec![format!("json: {}", e)]);
            }
        };
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON value as a plan
    pub fn from_value(mut value: Value) -> Result<Plan, Vec<String>> {
        let mut violations = Vec::new();
        check_object(&value, PLAN_FIELDS, "", &mut violations);
        if !violations.is_empty() {
            debug!(count = violations.len(), "Plan::from_value: structural violations");
            return Err(violations);
        }

        normalize_integral_floats(&mut value);
        let plan: Plan = match serde_json::from_value(value) {
            Ok(p) => p,
            Err(e) => return Err(vec![format!("schema: {}", e)]),
        };

        let violations = plan.violations();
        if violations.is_empty() {
            debug!("Plan::from_value: plan accepted");
            Ok(plan)
        } else {
            debug!(count = violations.len(), "Plan::from_value: range violations");
            Err(violations)
        }
    }

    /// All bound and format violations of a typed plan
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut check = RangeCheck {
            violations: &mut violations,
        };

        check.text("title", &self.title, 120);
        check.text("genre", &self.genre, 80);
        check.text("core_loop", &self.core_loop, 500);
        check.items("controls", self.controls.len(), 20);
        check.items("mechanics", self.mechanics.len(), 3);

        check.half_open("player.speed", self.player.speed, 50.0, 800.0);
        check.int("player.radius", self.player.radius, 6, 48);
        check.color("player.color", &self.player.color);
        check.int("player.health", self.player.health, 1, 20);

        check.items("enemy_archetypes", self.enemy_archetypes.len(), 8);
        for (i, enemy) in self.enemy_archetypes.iter().enumerate() {
            let p = |field: &str| format!("enemy_archetypes[{}].{}", i, field);
            check.text(&p("id"), &enemy.id, 80);
            check.half_open(&p("speed"), enemy.speed, 20.0, 700.0);
            check.int(&p("radius"), enemy.radius, 6, 42);
            check.color(&p("color"), &enemy.color);
            check.int(&p("count"), enemy.count, 1, 25);
        }

        check.items("player_rules", self.player_rules.len(), 20);
        check.items("enemy_rules", self.enemy_rules.len(), 20);

        check.closed("physics_rules.gravity", self.physics_rules.gravity, 0.0, 40.0);
        check.half_open("physics_rules.max_speed", self.physics_rules.max_speed, 0.0, 1000.0);
        check.closed("physics_rules.friction", self.physics_rules.friction, 0.0, 1.0);

        check.text("win_condition", &self.win_condition, 200);
        check.text("lose_condition", &self.lose_condition, 200);

        check.int(
            "difficulty.enemy_spawn_interval_ms",
            self.difficulty.enemy_spawn_interval_ms,
            100,
            10_000,
        );
        check.half_open("difficulty.enemy_speed", self.difficulty.enemy_speed, 0.0, 1000.0);
        check.int("difficulty.score_per_enemy", self.difficulty.score_per_enemy, 1, 100_000);
        check.int("difficulty.target_score", self.difficulty.target_score, 5, 100_000);

        check.items("scene_graph_objects", self.scene_graph_objects.len(), 100);
        for (i, object) in self.scene_graph_objects.iter().enumerate() {
            check.text(&format!("scene_graph_objects[{}].id", i), &object.id, 80);
        }

        violations
    }

    pub fn is_valid(&self) -> bool {
        self.violations().is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
