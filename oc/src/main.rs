//! oc - memo operation coordinator
//!
//! CLI entry point: print the conflict policy or replay scripted scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use opcoord::cli::{Cli, Command, OutputFormat, get_log_path};
use opcoord::config::Config;
use opcoord::policy::{ResolutionStrategy, RuleCondition};
use opcoord::simulate::{Script, render_text, run_script};

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str {
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
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_stderr: bool) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if log_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        let log_path = get_log_path();
        let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), cli.log_stderr)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Policy { format } => cmd_policy(&config, format),
        Command::Simulate {
            script,
            format,
            event_log,
        } => cmd_simulate(&config, &script, format, event_log.as_deref()).await,
    }
}

fn paint_strategy(strategy: ResolutionStrategy) -> String {
    let text = strategy.to_string();
    match strategy {
        ResolutionStrategy::Cancel => text.red().to_string(),
        ResolutionStrategy::Queue => text.yellow().to_string(),
        ResolutionStrategy::Replace => text.magenta().to_string(),
        ResolutionStrategy::Allow => text.green().to_string(),
    }
}

fn cmd_policy(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(%format, "cmd_policy: called");
    let policy = config.conflict_policy();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(policy.rules())?);
        }
        OutputFormat::Text => {
            let source = if config.policy.is_some() { "configured" } else { "built-in" };
            println!("{} ({} rules, {})", "Conflict policy".bold(), policy.rules().len(), source);
            println!("  {:<14} {:<14} {:<15} STRATEGY", "EXISTING", "PROPOSED", "WHEN");
            for rule in policy.rules() {
                let when = match rule.when {
                    RuleCondition::Always => "-".to_string(),
                    other => other.to_string(),
                };
                println!(
                    "  {:<14} {:<14} {:<15} {}",
                    rule.existing.to_string(),
                    rule.proposed.to_string(),
                    when,
                    paint_strategy(rule.strategy)
                );
            }
            println!("Pairs without a rule do not conflict.");
        }
    }
    Ok(())
}

async fn cmd_simulate(
    config: &Config,
    script_path: &Path,
    format: OutputFormat,
    event_log: Option<&Path>,
) -> Result<()> {
    debug!(script = %script_path.display(), %format, ?event_log, "cmd_simulate: called");
    let script = Script::load(script_path)?;

    if let Some(dir) = event_log {
        fs::create_dir_all(dir).context(format!("Failed to create event log directory {}", dir.display()))?;
    }

    let report = run_script(&script, config, event_log).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_text(&report)),
    }
    Ok(())
}
