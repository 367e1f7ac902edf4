//! # Retention Configuration Validator
//!
//! Command-line tool for validating retention engine configuration across
//! environments before starting workers.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tasker_retention::config::{ConfigManager, RetentionConfig};
use tasker_retention::constants::batch_types;
use tasker_retention::models::BatchType;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate retention engine configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for `show` (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate all configuration sections
    All,

    /// Validate a single configuration section
    Component {
        /// Section name (batch, history, worker, database)
        name: String,
    },

    /// List environments with an override file
    Environments,

    /// Print the effective configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Show) => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<RetentionConfig> {
    let manager =
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)?;
    Ok(manager.config().clone())
}

fn validate_all_config(cli: &Cli) -> Result<()> {
    println!("Validating retention configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let config = match load(cli) {
        Ok(config) => {
            println!("✅ Configuration loaded and validated");
            config
        }
        Err(e) => {
            println!("❌ Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    validate_batch_config(&config)?;
    validate_history_config(&config)?;
    validate_worker_config(&config)?;
    validate_database_config(&config)?;

    println!("\nAll configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> Result<()> {
    println!("Validating component: {}", component_name);
    let config = load(cli)?;

    match component_name.to_lowercase().as_str() {
        "batch" => validate_batch_config(&config)?,
        "history" => validate_history_config(&config)?,
        "worker" => validate_worker_config(&config)?,
        "database" => validate_database_config(&config)?,
        _ => bail!("Unknown component: {}", component_name),
    }

    println!("✅ Component '{}' validation passed!", component_name);
    Ok(())
}

fn list_environments(cli: &Cli) -> Result<()> {
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("config"));
    println!("Available environments in {}:", config_dir.display());

    if !config_dir.exists() {
        println!("❌ Configuration directory not found");
        return Ok(());
    }

    let mut environments: Vec<String> = std::fs::read_dir(&config_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_prefix("tasker-retention.")
                .and_then(|rest| rest.strip_suffix(".yaml"))
                .map(str::to_string)
        })
        .collect();
    environments.sort();

    for env in environments {
        println!("  • {}", env);
    }
    Ok(())
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => {
            let rows = [
                ("batch.invocations_per_batch_job", config.batch.invocations_per_batch_job.to_string()),
                (
                    "batch.removal_time_update_chunk_size",
                    config.batch.removal_time_update_chunk_size.to_string(),
                ),
                (
                    "history.removal_time_strategy",
                    format!("{:?}", config.history.removal_time_strategy),
                ),
                (
                    "history.enable_historic_instance_permissions",
                    config.history.enable_historic_instance_permissions.to_string(),
                ),
                ("worker.concurrency", config.worker.concurrency.to_string()),
                ("worker.max_retries", config.worker.max_retries.to_string()),
                ("database.max_connections", config.database.max_connections.to_string()),
            ];
            for (key, value) in rows {
                println!("{key:<46} {value}");
            }
        }
    }
    Ok(())
}

fn validate_batch_config(config: &RetentionConfig) -> Result<()> {
    println!("Validating batch configuration...");
    let chunk_size = config.batch.chunk_size()?;
    println!("   ✅ Chunk size: {}", chunk_size.get());

    for tag in batch_types::ALL {
        let batch_type: BatchType = tag.parse().map_err(anyhow::Error::msg)?;
        println!(
            "   ✅ {}: {} roots per job",
            tag,
            config.batch.invocations_per_batch_job_for(batch_type)
        );
    }
    Ok(())
}

fn validate_history_config(config: &RetentionConfig) -> Result<()> {
    println!("Validating history configuration...");
    println!("   ✅ Removal time strategy: {:?}", config.history.removal_time_strategy);

    for tag in batch_types::ALL {
        match config.history.batch_time_to_live(tag) {
            Some(ttl) => println!("   ✅ {}: historic batches kept {} days", tag, ttl.as_days()),
            None => println!("   ℹ️  {}: historic batches kept without removal time", tag),
        }
    }
    Ok(())
}

fn validate_worker_config(config: &RetentionConfig) -> Result<()> {
    println!("Validating worker configuration...");
    println!(
        "   ✅ Concurrency: {}, retries: {}, poll interval: {}ms, lock time: {}ms",
        config.worker.concurrency,
        config.worker.max_retries,
        config.worker.poll_interval_ms,
        config.worker.lock_time_ms
    );
    Ok(())
}

fn validate_database_config(config: &RetentionConfig) -> Result<()> {
    println!("Validating database configuration...");

    match &config.database.url {
        Some(url) if url.is_empty() => {
            bail!("Database URL is configured but empty");
        }
        Some(_) => println!("   ✅ Database URL configured"),
        None => println!("   ℹ️  Database URL not configured (using DATABASE_URL)"),
    }
    if config.database.max_connections == 0 {
        bail!("Database max_connections must be at least 1");
    }

    println!("   ✅ Pool max connections: {}", config.database.max_connections);
    Ok(())
}
