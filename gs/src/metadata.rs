//! Artifact metadata records

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid slug regex"));

/// Maximum slug length in characters
const MAX_SLUG_LEN: usize = 40;

/// Slug used when a title has no usable characters
const FALLBACK_SLUG: &str = "generated-game";

/// Derive a URL-friendly slug from a title
pub fn slugify(title: &str) -> String {
    debug!(%title, "slugify: called");
    let replaced = NON_ALNUM_RE.replace_all(title, "-");
    let slug: String = replaced.trim_matches('-').to_lowercase().chars().take(MAX_SLUG_LEN).collect();
    if slug.is_empty() {
        debug!("slugify: empty slug, using fallback");
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Contents of `metadata.json` for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub job_id: String,
    pub slug: String,
    pub title: String,

    /// Preset the bundle was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// True when the bundle was derived from a preset-lineage artifact
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub preset_derived: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_game_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl GameMetadata {
    /// Create metadata for a freshly built artifact
    pub fn new(job_id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            job_id: job_id.into(),
            slug: slugify(&title),
            title,
            preset: None,
            preset_derived: false,
            base_game_id: None,
            mode: None,
        }
    }

    /// Mark the artifact as built directly from a preset
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Record that this artifact was derived from `base_game_id`
    pub fn derive_from(&mut self, preset: &str, base_game_id: &str, mode: &str) {
        debug!(%preset, %base_game_id, %mode, "GameMetadata::derive_from: called");
        self.preset = Some(preset.to_string());
        self.preset_derived = true;
        self.base_game_id = Some(base_game_id.to_string());
        self.mode = Some(mode.to_string());
    }

    /// Whether a future modify job may use this artifact as its base
    pub fn is_lineage_eligible(&self, preset: &str) -> bool {
        self.preset_derived || self.preset.as_deref() == Some(preset)
    }
}
