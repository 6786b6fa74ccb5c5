//! GameGen configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main GameGen configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Generation backend and limits
    pub generation: GenerationConfig,

    /// Storage locations
    pub storage: StorageConfig,

    /// Preset selection
    pub preset: PresetConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Only the LLM backend needs an API key; the deterministic backend and
    /// preset jobs run offline.
    pub fn validate(&self) -> Result<()> {
        if self.generation.backend == GeneratorBackend::Llm && std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.generation.max_attempts == 0 {
            return Err(eyre::eyre!("generation.max-attempts must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .gamegen.yml
        let local_config = PathBuf::from(".gamegen.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/gamegen/gamegen.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("gamegen").join("gamegen.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed here; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" (any chat-completions endpoint) or "gemini"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Transport retries for transient failures
    #[serde(rename = "http-retries")]
    pub http_retries: u32,

    /// Model context window in tokens, used to budget prompt and output
    #[serde(rename = "context-window")]
    pub context_window: u32,

    /// Maximum characters of source context sent with a prompt
    #[serde(rename = "context-chars")]
    pub context_chars: usize,

    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "Qwen/Qwen2.5-Coder-32B-Instruct".to_string(),
            api_key_env: "FEATHERLESS_API_KEY".to_string(),
            base_url: "https://api.featherless.ai".to_string(),
            max_tokens: 32_768,
            timeout_ms: 90_000,
            http_retries: 2,
            context_window: 32_768,
            context_chars: 200_000,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("Environment variable {} is not set", self.api_key_env))
    }

    pub fn has_api_key(&self) -> bool {
        std::env::var(&self.api_key_env).map(|k| !k.is_empty()).unwrap_or(false)
    }
}

/// Which plan generator backs generation calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratorBackend {
    /// LLM when an API key is present, deterministic otherwise
    #[default]
    Auto,
    Deterministic,
    Llm,
}

/// Generation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: GeneratorBackend,

    /// Maximum generation calls in flight across all jobs
    #[serde(rename = "max-concurrent-calls")]
    pub max_concurrent_calls: usize,

    /// Validated outputs per repair loop (initial generation included)
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Run `node --check` on generated programs when node is installed
    #[serde(rename = "syntax-check")]
    pub syntax_check: bool,

    /// Time limit for a single `node --check` run
    #[serde(rename = "syntax-check-timeout-ms")]
    pub syntax_check_timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::Auto,
            max_concurrent_calls: 4,
            max_attempts: 3,
            syntax_check: true,
            syntax_check_timeout_ms: 15_000,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for generated game bundles
    #[serde(rename = "games-dir")]
    pub games_dir: PathBuf,

    /// Root directory holding preset bundles
    #[serde(rename = "presets-dir")]
    pub presets_dir: PathBuf,

    /// Directory with `.pmt` prompt overrides
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: Option<PathBuf>,

    /// Candidate locations of the game engine runtime, first match wins
    #[serde(rename = "runtime-paths")]
    pub runtime_paths: Vec<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/gamegen on Linux)
        let data_dir = dirs::data_dir()
            .map(|d| d.join("gamegen"))
            .unwrap_or_else(|| PathBuf::from(".gamegen"));

        Self {
            games_dir: data_dir.join("games"),
            presets_dir: PathBuf::from("presets"),
            prompts_dir: None,
            runtime_paths: vec![
                PathBuf::from("vendor/phaser.min.js"),
                PathBuf::from("node_modules/phaser/dist/phaser.min.js"),
                data_dir.join("vendor").join("phaser.min.js"),
            ],
        }
    }
}

/// Preset selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    /// Preset directory name under `presets-dir`
    pub name: String,

    /// Case-insensitive keyword that routes a prompt to the preset
    pub trigger: String,

    /// Relay endpoint written into copied bundles in place of absolute socket URLs
    #[serde(rename = "relay-path")]
    pub relay_path: String,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            name: "2dShooter".to_string(),
            trigger: "shooter".to_string(),
            relay_path: "./relay".to_string(),
        }
    }
}
