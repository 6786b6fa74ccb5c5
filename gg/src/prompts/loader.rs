//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory
    user_dir: Option<PathBuf>,
}

fn engine() -> Handlebars<'static> {
    let mut hbs = Handlebars::new();
    // Prompts carry JSON and source code verbatim
    hbs.register_escape_fn(handlebars::no_escape);
    hbs
}

impl PromptLoader {
    /// Create a loader that checks `dir` before the embedded templates
    pub fn new(dir: Option<impl AsRef<Path>>) -> Self {
        let user_dir = dir.map(|d| d.as_ref().to_path_buf()).filter(|d| d.is_dir());
        debug!(?user_dir, "PromptLoader::new: called");
        Self { hbs: engine(), user_dir }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: engine(),
            user_dir: None,
        }
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `{dir}/{name}.pmt`
    /// 2. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            } else {
                debug!(?path, "PromptLoader::load_template: not found in user override");
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}
