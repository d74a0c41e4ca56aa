use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use roster_sync::Cursor;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

mod app;
mod config;
mod secrets;
mod telemetry;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "roster-sync")]
#[command(about = "Incremental BambooHR to Moodle user reconciliation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path; environment variables are used when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overriding the configured one
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass (default)
    Run {
        /// Records per run; zero or negative reconciles the whole page
        #[arg(short, long, allow_negative_numbers = true)]
        batch_size: Option<i64>,

        /// Look up users without writing to Moodle or the cursor store
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or reset the persisted cursor
    State {
        #[command(subcommand)]
        action: StateActions,
    },
    /// Validate configuration
    Config {
        #[command(subcommand)]
        action: ConfigActions,
    },
}

#[derive(Subcommand)]
enum StateActions {
    /// Print the stored cursor
    Show,
    /// Overwrite the stored cursor
    Reset {
        /// Watermark to restart from; defaults to now minus the lookback window
        #[arg(long)]
        since: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigActions {
    /// Validate configuration
    Validate,
    /// Show current configuration
    Show,
    /// Generate default configuration
    Generate {
        /// Output path for configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run {
        batch_size: None,
        dry_run: false,
    });

    if let Commands::Config {
        action: ConfigActions::Generate { output },
    } = &command
    {
        return report(generate_config(output.as_ref()).await);
    }

    let mut config = match load_config(cli.config.as_ref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    let _guard = match telemetry::init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        Commands::Run {
            batch_size,
            dry_run,
        } => {
            if let Some(batch_size) = batch_size {
                config.sync.batch_size = batch_size;
            }
            config.sync.dry_run |= dry_run;
            run(&config).await
        }
        Commands::State { action } => match action {
            StateActions::Show => show_state(&config).await,
            StateActions::Reset { since } => reset_state(&config, since).await,
        },
        Commands::Config { action } => match action {
            ConfigActions::Validate => validate_config(&config),
            ConfigActions::Show => show_config(&config),
            ConfigActions::Generate { output } => generate_config(output.as_ref()).await,
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

fn report(result: Result<ExitCode>) -> ExitCode {
    result.unwrap_or_else(|e| {
        eprintln!("Error: {e:#}");
        ExitCode::FAILURE
    })
}

async fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path).await,
        None => Ok(AppConfig::from_env()),
    }
}

/// Print the run summary as one JSON line on stdout and map it to the exit
/// status.
async fn run(config: &AppConfig) -> Result<ExitCode> {
    config.validate()?;

    let summary = app::run_once(config).await?;
    println!("{}", summary.to_json_line()?);

    Ok(ExitCode::from(summary.exit_code() as u8))
}

async fn show_state(config: &AppConfig) -> Result<ExitCode> {
    config.validate()?;

    let sdk_config = app::aws_config_if(config.state.file.is_none()).await;
    let store = app::state_store(config, sdk_config.as_ref()).await;
    let cursor = store.read().await.context("Failed to read sync cursor")?;

    println!("{}", serde_json::to_string_pretty(&cursor)?);
    Ok(ExitCode::SUCCESS)
}

async fn reset_state(config: &AppConfig, since: Option<String>) -> Result<ExitCode> {
    config.validate()?;

    let cursor = match since {
        Some(since) => Cursor::new(since, 0),
        None => Cursor::initial(Utc::now(), config.sync.initial_lookback_days),
    };

    let sdk_config = app::aws_config_if(config.state.file.is_none()).await;
    let store = app::state_store(config, sdk_config.as_ref()).await;
    let stored = store
        .write(&cursor)
        .await
        .context("Failed to write sync cursor")?;

    info!(cursor = %stored, store = %store.describe(), "Cursor reset");
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(ExitCode::SUCCESS)
}

fn validate_config(config: &AppConfig) -> Result<ExitCode> {
    config.validate()?;
    println!("✅ Configuration is valid");
    Ok(ExitCode::SUCCESS)
}

fn show_config(config: &AppConfig) -> Result<ExitCode> {
    let config_str = toml::to_string_pretty(config)?;
    println!("{}", config_str);
    Ok(ExitCode::SUCCESS)
}

async fn generate_config(output: Option<&PathBuf>) -> Result<ExitCode> {
    let config = AppConfig::default();

    if let Some(path) = output {
        config.save(path).await?;
        println!("✅ Configuration generated at {}", path.display());
    } else {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(ExitCode::SUCCESS)
}
