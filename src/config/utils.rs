// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, CONFIG_SCHEMA};
use crate::simulation::{CoilSpec, RegisterSpec};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./modbus_simulator --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **Port Range**: the listen port must be within 1-65535
/// - **Tick Interval**: at least one millisecond
/// - **Log Level**: one of off, error, warn, info, debug, trace
/// - **Generator Specs**: every register and coil spec must parse; the error
///   names the table and address of the first malformed entry
/// - **IP Address Format**: an unusual listen address only logs a warning,
///   since hostnames are resolved when binding
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.system.port == 0 {
        anyhow::bail!("Invalid port number: {}", config.system.port);
    }

    if config.system.tick_interval_ms == 0 {
        anyhow::bail!("Tick interval must be at least 1 ms");
    }

    if config.system.level_filter().is_none() {
        anyhow::bail!("Invalid log level: {}", config.system.log_level);
    }

    if !is_valid_ip_address(&config.system.address) {
        warn!(
            "Potentially invalid address format: {}",
            config.system.address
        );
    }

    let tables = config
        .generator_tables()
        .context("Invalid generator specification")?;

    // Sampling faster than a period is required to honour it
    let tick = config.system.tick_interval().as_secs_f64();
    let shortest = tables
        .registers
        .values()
        .filter_map(|spec| match spec {
            RegisterSpec::Dynamic(kind) => Some(kind.period()),
            RegisterSpec::Fixed(_) => None,
        })
        .chain(tables.coils.values().filter_map(|spec| match spec {
            CoilSpec::Dynamic(kind) => Some(kind.period()),
            CoilSpec::Fixed(_) => None,
        }))
        .fold(f64::INFINITY, f64::min);
    if shortest < 2.0 * tick {
        warn!(
            "Shortest period {}s is under twice the tick interval ({}s), updates may be missed",
            shortest, tick
        );
    }

    Ok(())
}
