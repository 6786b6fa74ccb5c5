//! GameGen CLI entry point

use std::fs;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use gamegen::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use gamegen::config::Config;
use gamegen::domain::{GenerationMode, JobRecord, JobStatus};
use gamegen::editor::PromptEditor;
use gamegen::orchestrator::Orchestrator;
use gamestore::GameStore;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Generate {
            prompt,
            mode,
            base,
            format,
        } => cmd_generate(&config, &prompt, mode, base.as_deref(), format).await,
        Command::Games { format } => cmd_games(&config, format),
        Command::Show { id } => cmd_show(&config, &id),
        Command::Edit { file, prompt } => cmd_edit(&file, &prompt),
    }
}

/// Run one job to completion
async fn cmd_generate(
    config: &Config,
    prompt: &str,
    mode: GenerationMode,
    base: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    debug!(%mode, ?base, "cmd_generate: called");
    config.validate()?;
    let orchestrator = Orchestrator::from_config(config).await?;

    let job = orchestrator.create(prompt, mode, base).await?;
    if format == OutputFormat::Text {
        println!("{} {}", "Job".bold(), job.id);
    }
    let record = orchestrator.spawn(&job.id).await.context("Job task panicked")??;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => print_record(&record, orchestrator.store()),
    }

    if record.status == JobStatus::Failed {
        return Err(eyre::eyre!("Job {} failed", record.id));
    }
    Ok(())
}

fn print_record(record: &JobRecord, store: &GameStore) {
    let status = match record.status {
        JobStatus::Ready => record.status.to_string().green(),
        JobStatus::Failed => record.status.to_string().red(),
        _ => record.status.to_string().yellow(),
    };
    println!("  status: {}", status);
    println!("  mode:   {}", record.mode);
    if let Some(base) = &record.base_game_id {
        println!("  base:   {}", base);
    }
    if let Some(plan) = &record.plan {
        println!("  title:  {}", plan.title);
    }
    if let Some(url) = &record.game_url {
        println!("  url:    {}", url);
        println!("  path:   {}", store.game_dir(&record.id).display());
    }
    if let Some(error) = &record.error {
        println!("  error:  {}", error.red());
    }
}

fn cmd_games(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_games: called");
    let store = GameStore::open(&config.storage.games_dir)?;
    let mut games = Vec::new();
    for id in store.list_games()? {
        if let Some(meta) = store.read_metadata(&id)? {
            games.push(meta);
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&games)?),
        OutputFormat::Text => {
            if games.is_empty() {
                println!("No games in {}", store.root().display());
            }
            for meta in &games {
                let lineage = if meta.preset_derived {
                    format!(" (from {})", meta.base_game_id.as_deref().unwrap_or("?"))
                } else if let Some(preset) = &meta.preset {
                    format!(" [{}]", preset)
                } else {
                    String::new()
                };
                println!("{}  {}{}", meta.job_id.cyan(), meta.title, lineage.dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_show(config: &Config, id: &str) -> Result<()> {
    debug!(%id, "cmd_show: called");
    let store = GameStore::open(&config.storage.games_dir)?;
    let meta = store
        .read_metadata(id)?
        .ok_or_else(|| eyre::eyre!("Game not found: {}", id))?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

fn cmd_edit(file: &Path, prompt: &str) -> Result<()> {
    debug!(?file, "cmd_edit: called");
    let source = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let outcome = PromptEditor::new().apply(&source, prompt);
    for edit in &outcome.edits {
        eprintln!("{} {}", "edited".green(), edit);
    }
    if !outcome.changed() {
        eprintln!("{}", "no directive matched".yellow());
    }
    print!("{}", outcome.source);
    Ok(())
}
