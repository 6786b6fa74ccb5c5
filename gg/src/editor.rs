//! Prompt-pattern code editor
//!
//! Turns gameplay directives such as "shooting 3x faster" or "bullet speed
//! 900" into numeric rewrites of an existing scene source, without a
//! generation call. Unrecognised directives and absent tunables are no-ops;
//! the editor never fails.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, info};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid editor regex")
}

// Directive patterns, matched against the lowercased prompt
static SHOOT_FACTOR: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        re(r"shoot(?:ing)?\s*(\d+(?:\.\d+)?)x\s*(faster|slower)"),
        re(r"(\d+(?:\.\d+)?)x\s*(faster|slower)\s*shoot(?:ing)?"),
    ]
});
static PLAYER_FACTOR: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        re(r"player\s*(\d+(?:\.\d+)?)x\s*(faster|slower)"),
        re(r"(\d+(?:\.\d+)?)x\s*(faster|slower)\s*player"),
        re(r"movement\s*(\d+(?:\.\d+)?)x\s*(faster|slower)"),
    ]
});
static COOLDOWN_OVERRIDE: LazyLock<Regex> = LazyLock::new(|| re(r"(?:shot|shoot(?:ing)?)\s*cooldown[^0-9]*(\d+)\s*ms"));
static PROJECTILE_OVERRIDE: LazyLock<Regex> = LazyLock::new(|| re(r"(?:projectile|bullet)\s*speed[^0-9]*(\d+)"));
static PLAYER_OVERRIDE: LazyLock<Regex> = LazyLock::new(|| re(r"(?:player|movement)\s*speed[^0-9]*(\d+)"));

// Tunable patterns, matched against the source
static COOLDOWN_SITE: LazyLock<Regex> = LazyLock::new(|| re(r"shotCooldownMs\s*=\s*(\d+)"));
static VELOCITY_SITE: LazyLock<Regex> =
    LazyLock::new(|| re(r"setVelocity\(([^*,]*\*\s*)(\d+)\s*,\s*([^*,]*\*\s*)(\d+)\s*\)"));
static MAX_SPEED_SITE: LazyLock<Regex> = LazyLock::new(|| re(r"setMaxSpeed\(\s*(\d+)\s*\)"));
static ACCEL_SITE: LazyLock<Regex> = LazyLock::new(|| re(r"setAcceleration([XY])\(\s*(-?)\s*(\d+)\s*\)"));

const COOLDOWN_FLOOR: i64 = 20;
const PROJECTILE_FLOOR: i64 = 60;
const MAX_SPEED_FLOOR: i64 = 80;
const ACCEL_FLOOR: i64 = 100;

/// A numeric gameplay value the editor knows how to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tunable {
    ShotCooldown,
    ProjectileSpeed,
    PlayerMaxSpeed,
    PlayerAcceleration,
}

impl fmt::Display for Tunable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShotCooldown => write!(f, "shot cooldown"),
            Self::ProjectileSpeed => write!(f, "projectile speed"),
            Self::PlayerMaxSpeed => write!(f, "player max speed"),
            Self::PlayerAcceleration => write!(f, "player acceleration"),
        }
    }
}

/// One rewrite the editor performed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdit {
    pub tunable: Tunable,
    pub before: i64,
    pub after: i64,
}

impl fmt::Display for AppliedEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.tunable, self.before, self.after)
    }
}

/// Edited source plus the edits that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub source: String,
    pub edits: Vec<AppliedEdit>,
}

impl EditOutcome {
    /// Whether any directive matched a tunable
    pub fn changed(&self) -> bool {
        !self.edits.is_empty()
    }
}

/// Deterministic directive-to-rewrite engine
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptEditor;

impl PromptEditor {
    pub fn new() -> Self {
        Self
    }

    /// Apply every directive found in `prompt` to `source`
    ///
    /// Relative factors are applied first, then absolute overrides, so an
    /// override in the same prompt has the last word.
    pub fn apply(&self, source: &str, prompt: &str) -> EditOutcome {
        debug!(prompt_len = prompt.len(), source_len = source.len(), "PromptEditor::apply: called");
        let prompt = prompt.to_lowercase();
        let mut source = source.to_string();
        let mut edits = Vec::new();

        if let Some(factor) = extract_factor(&prompt, SHOOT_FACTOR.as_slice()) {
            debug!(factor, "PromptEditor::apply: shooting factor");
            edits.extend(rewrite_cooldown(&mut source, |n| scale(n, 1.0 / factor)));
            edits.extend(rewrite_velocity(&mut source, |n| scale(n, factor)));
        }

        if let Some(ms) = capture_int(&COOLDOWN_OVERRIDE, &prompt) {
            debug!(ms, "PromptEditor::apply: cooldown override");
            edits.extend(rewrite_cooldown(&mut source, |_| ms));
        }

        if let Some(speed) = capture_int(&PROJECTILE_OVERRIDE, &prompt) {
            debug!(speed, "PromptEditor::apply: projectile override");
            edits.extend(rewrite_velocity(&mut source, |_| speed));
        }

        if let Some(factor) = extract_factor(&prompt, PLAYER_FACTOR.as_slice()) {
            debug!(factor, "PromptEditor::apply: player factor");
            edits.extend(rewrite_max_speed(&mut source, |n| scale(n, factor)));
            edits.extend(rewrite_acceleration(&mut source, factor));
        }

        if let Some(speed) = capture_int(&PLAYER_OVERRIDE, &prompt) {
            debug!(speed, "PromptEditor::apply: player speed override");
            edits.extend(rewrite_max_speed(&mut source, |_| speed));
        }

        for edit in &edits {
            info!(%edit, "Applied prompt edit");
        }
        EditOutcome { source, edits }
    }
}

/// Identifiers that mark a source line as physics-related
const PHYSICS_KEYWORDS: &[&str] = &[
    "setVelocity",
    "setMaxSpeed",
    "setAcceleration",
    "setDrag",
    "setBounce",
    "shotCooldownMs",
    "gravity",
    "speed",
];

/// Physics-related lines of `source`, numbered, for a model edit prompt
pub fn physics_context(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| PHYSICS_KEYWORDS.iter().any(|k| line.contains(k)))
        .map(|(i, line)| format!("{:>5}: {}", i + 1, line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Relative factor from the first matching pattern; `slower` inverts it
fn extract_factor(prompt: &str, patterns: &[Regex]) -> Option<f64> {
    for pattern in patterns {
        let Some(caps) = pattern.captures(prompt) else {
            continue;
        };
        let factor: f64 = caps[1].parse().ok()?;
        if factor <= 0.0 || !factor.is_finite() {
            return None;
        }
        return Some(if &caps[2] == "faster" { factor } else { 1.0 / factor });
    }
    None
}

fn capture_int(pattern: &Regex, text: &str) -> Option<i64> {
    pattern.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// Halves round to the even neighbour
fn scale(n: i64, factor: f64) -> i64 {
    (n as f64 * factor).round_ties_even() as i64
}

fn rewrite_cooldown(source: &mut String, new_value: impl Fn(i64) -> i64) -> Option<AppliedEdit> {
    let (range, before) = {
        let caps = COOLDOWN_SITE.captures(source)?;
        (caps.get(0)?.range(), caps[1].parse::<i64>().ok()?)
    };
    let after = new_value(before).max(COOLDOWN_FLOOR);
    source.replace_range(range, &format!("shotCooldownMs = {}", after));
    Some(AppliedEdit {
        tunable: Tunable::ShotCooldown,
        before,
        after,
    })
}

fn rewrite_velocity(source: &mut String, new_value: impl Fn(i64) -> i64) -> Option<AppliedEdit> {
    let (range, before, after, replacement) = {
        let caps = VELOCITY_SITE.captures(source)?;
        let before: i64 = caps[2].parse().ok()?;
        let after = new_value(before).max(PROJECTILE_FLOOR);
        let replacement = format!("setVelocity({}{}, {}{})", &caps[1], after, &caps[3], after);
        (caps.get(0)?.range(), before, after, replacement)
    };
    source.replace_range(range, &replacement);
    Some(AppliedEdit {
        tunable: Tunable::ProjectileSpeed,
        before,
        after,
    })
}

fn rewrite_max_speed(source: &mut String, new_value: impl Fn(i64) -> i64) -> Option<AppliedEdit> {
    let (range, before) = {
        let caps = MAX_SPEED_SITE.captures(source)?;
        (caps.get(0)?.range(), caps[1].parse::<i64>().ok()?)
    };
    let after = new_value(before).max(MAX_SPEED_FLOOR);
    source.replace_range(range, &format!("setMaxSpeed({})", after));
    Some(AppliedEdit {
        tunable: Tunable::PlayerMaxSpeed,
        before,
        after,
    })
}

/// Scale the first non-zero acceleration and write that magnitude at every
/// non-zero call site, keeping each site's sign
fn rewrite_acceleration(source: &mut String, factor: f64) -> Option<AppliedEdit> {
    let before = ACCEL_SITE
        .captures_iter(source)
        .filter_map(|caps| caps[3].parse::<i64>().ok())
        .find(|n| *n > 0)?;
    let after = scale(before, factor).max(ACCEL_FLOOR);

    let rewritten = ACCEL_SITE.replace_all(source, |caps: &Captures| match caps[3].parse::<i64>() {
        Ok(n) if n > 0 => format!("setAcceleration{}({}{})", &caps[1], &caps[2], after),
        _ => caps[0].to_string(),
    });
    *source = rewritten.into_owned();
    Some(AppliedEdit {
        tunable: Tunable::PlayerAcceleration,
        before,
        after,
    })
}
