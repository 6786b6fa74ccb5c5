//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::GenerationMode;

/// GameGen - prompt to playable browser game
#[derive(Parser)]
#[command(
    name = "gg",
    about = "Generate browser game bundles from natural-language prompts",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a generation job to completion and print its record
    Generate {
        /// What to build or change
        prompt: String,

        /// new or modify
        #[arg(short, long, default_value = "new")]
        mode: GenerationMode,

        /// Game to modify (defaults to the latest preset-derived game)
        #[arg(short, long)]
        base: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List generated games
    Games {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a game's metadata
    Show {
        /// Game id
        id: String,
    },

    /// Apply gameplay directives from a prompt to a scene file and print the result
    Edit {
        /// Scene source file
        file: PathBuf,

        /// Directives such as "shooting 2x faster"
        #[arg(short, long)]
        prompt: String,
    },
}

/// Result of checking an optional tool
pub struct ToolCheck {
    pub name: &'static str,
    pub available: bool,
    pub version: Option<String>,
}

impl ToolCheck {
    /// Check if a tool is available and get its version
    pub fn check(name: &'static str, version_args: &[&str]) -> Self {
        debug!(name, ?version_args, "ToolCheck::check: called");
        match std::process::Command::new(name).args(version_args).output() {
            Ok(output) if output.status.success() => {
                let version = parse_version(&String::from_utf8_lossy(&output.stdout));
                debug!(name, %version, "ToolCheck::check: tool available");
                Self {
                    name,
                    available: true,
                    version: Some(version),
                }
            }
            _ => {
                debug!(name, "ToolCheck::check: tool not available");
                Self {
                    name,
                    available: false,
                    version: None,
                }
            }
        }
    }
}

/// First version-like word of command output ("v20.11.1" -> "20.11.1")
fn parse_version(output: &str) -> String {
    for word in output.split_whitespace() {
        let word = word.trim_start_matches('v');
        if word.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            let version: String = word.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
            if !version.is_empty() {
                return version;
            }
        }
    }
    "unknown".to_string()
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gamegen")
        .join("logs")
        .join("gamegen.log")
}

/// after_help text with optional tool status and the log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let node = ToolCheck::check("node", &["--version"]);

    let mut help = String::new();
    help.push_str("Optional Tools:\n");
    let icon = if node.available { "\u{2705}" } else { "\u{274C}" };
    let version = node.version.as_deref().unwrap_or("not found (syntax checks skipped)");
    help.push_str(&format!("  {} {:<10} {}\n", icon, node.name, version));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

/// Output format for job and game listings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate() {
        let cli = Cli::parse_from(["gg", "generate", "a shooter", "--mode", "modify", "-b", "abc123", "-f", "json"]);
        match cli.command {
            Command::Generate {
                prompt,
                mode,
                base,
                format,
            } => {
                assert_eq!(prompt, "a shooter");
                assert_eq!(mode, GenerationMode::Modify);
                assert_eq!(base.as_deref(), Some("abc123"));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v20.11.1\n"), "20.11.1");
        assert_eq!(parse_version("node"), "unknown");
    }
}
