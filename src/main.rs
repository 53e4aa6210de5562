// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the Modbus TCP slave simulator
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::signal;

use modbus_simulator::config::{self, Config, SystemConfig};
use modbus_simulator::daemon::Daemon;

/// Configurable Modbus TCP slave simulator
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Modbus server address
    #[arg(long)]
    address: Option<String>,

    /// Modbus server port
    #[arg(long)]
    port: Option<u16>,

    /// Milliseconds between two simulation ticks
    #[arg(long)]
    tick_interval_ms: Option<u64>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Initialize env_logger from the command line flags and the `system` section.
fn init_logging(args: &Args, system: &SystemConfig) -> Result<()> {
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        system.level_filter().unwrap_or(log::LevelFilter::Info)
    };

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(log_level).format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = &system.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = &args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        // Only the command line is known before the file is read
        let mut system = SystemConfig::default();
        if let Some(level) = &args.log_level {
            system.log_level = level.clone();
        }
        system.log_file = args.log_file.clone();
        init_logging(&args, &system)?;

        Config::from_file(validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {:#}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.address.clone(),
        args.port,
        args.tick_interval_ms,
        args.log_level.clone(),
        args.log_file.clone(),
    );

    init_logging(&args, &config.system)?;
    info!("Using configuration file {}", config_path.display());

    // Overrides bypass the file checks, and warnings raised while loading
    // happened before the logger existed
    config::validate_specific_rules(&config)?;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    daemon.shutdown();
    daemon.join().await?;

    Ok(())
}
