// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the Modbus simulator
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! - `system`: listen address and port, logging, tick interval
//! - `registers`: holding register address → generator spec
//! - `coils`: coil address → generator spec
//!
//! ```yaml
//! system:
//!   address: 127.0.0.1
//!   port: 5020
//!   log_level: info
//!   tick_interval_ms: 50
//! registers:
//!   100: "5"
//!   200: "rand,0,10,1"
//!   300: "risefall,0,1000,60"
//! coils:
//!   1: "toggle,0.5"
//!   2: "rand,2"
//!   3: 1
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use modbus_simulator::config::Config;
//! use std::path::{Path, PathBuf};
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("0.0.0.0".to_string()), // Listen address
//!     Some(1502),                  // Listen port
//!     None,                        // Tick interval
//!     Some("debug".to_string()),   // Log level
//!     None,                        // Log file
//! );
//!
//! println!("Server port: {}", config.system.port);
//! ```

pub mod system;
pub mod utils;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::simulation::{GeneratorTables, TableError};

pub use system::SystemConfig;
pub use utils::{is_valid_ip_address, output_config_schema, validate_specific_rules};

/// Embedded JSON schema the YAML file is validated against.
pub const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// A generator spec as written in the configuration file.
///
/// Specs are strings (`"rand,0,10,1"`), but plain fixed values are often
/// written as bare YAML scalars (`100: 5`, `3: true`), so those are accepted
/// too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl SpecValue {
    pub fn as_spec(&self) -> Cow<'_, str> {
        match self {
            SpecValue::Flag(flag) => Cow::Borrowed(if *flag { "1" } else { "0" }),
            SpecValue::Number(n) => Cow::Owned(n.to_string()),
            SpecValue::Text(text) => Cow::Borrowed(text.as_str()),
        }
    }
}

impl fmt::Display for SpecValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_spec())
    }
}

impl From<&str> for SpecValue {
    fn from(spec: &str) -> Self {
        SpecValue::Text(spec.to_string())
    }
}

/// Root configuration structure of the simulator.
///
/// The structure is validated against a JSON schema before deserialization,
/// then every generator spec is parsed so that a malformed entry stops the
/// simulator before it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Network, logging and scheduler settings.
    #[serde(default)]
    pub system: SystemConfig,

    /// Holding register address → generator spec.
    #[serde(default)]
    pub registers: BTreeMap<u16, SpecValue>,

    /// Coil address → generator spec.
    #[serde(default)]
    pub coils: BTreeMap<u16, SpecValue>,
}

impl Default for Config {
    /// A small demonstration table, written out when no configuration file exists.
    fn default() -> Self {
        let registers = [
            (100, "5"),
            (200, "rand,0,10,1"),
            (300, "risefall,0,1000,60"),
        ];
        let coils = [(1, "toggle,0.5"), (2, "rand,2"), (3, "1")];
        Self {
            system: SystemConfig::default(),
            registers: registers
                .into_iter()
                .map(|(addr, spec)| (addr, SpecValue::from(spec)))
                .collect(),
            coils: coils
                .into_iter()
                .map(|(addr, spec)| (addr, SpecValue::from(spec)))
                .collect(),
        }
    }
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(sample_path)
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file failing schema
    /// validation, deserialization or the generator spec checks is rejected,
    /// and a `<name>.sample.yaml` file is written next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            let sample_path = Self::create_sample_config(path)?;
            anyhow::bail!(
                "Configuration validation failed: {} (sample configuration written to {:?})",
                error,
                sample_path
            );
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            let sample_path = Self::create_sample_config(path)?;
            return Err(err.context(format!(
                "Invalid configuration in {} (sample configuration written to {:?})",
                path.display(),
                sample_path
            )));
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Parse every register and coil spec of the configuration.
    pub fn generator_tables(&self) -> Result<GeneratorTables, TableError> {
        GeneratorTables::parse(
            self.registers
                .iter()
                .map(|(addr, spec)| (*addr, spec.as_spec())),
            self.coils.iter().map(|(addr, spec)| (*addr, spec.as_spec())),
        )
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only arguments that were explicitly provided override the file.
    ///
    /// # Parameters
    ///
    /// * `address` - Network address for the Modbus server to bind to
    /// * `port` - TCP port for the Modbus server
    /// * `tick_interval_ms` - Scheduler tick interval in milliseconds
    /// * `log_level` - Log level name
    /// * `log_file` - Log file path
    pub fn apply_args(
        &mut self,
        address: Option<String>,
        port: Option<u16>,
        tick_interval_ms: Option<u64>,
        log_level: Option<String>,
        log_file: Option<String>,
    ) {
        if let Some(address) = address {
            debug!("Overriding address from command line: {}", address);
            self.system.address = address;
        }
        if let Some(port) = port {
            debug!("Overriding port from command line: {}", port);
            self.system.port = port;
        }
        if let Some(interval) = tick_interval_ms {
            debug!("Overriding tick interval from command line: {} ms", interval);
            self.system.tick_interval_ms = interval;
        }
        if let Some(level) = log_level {
            debug!("Overriding log level from command line: {}", level);
            self.system.log_level = level;
        }
        if let Some(file) = log_file {
            debug!("Overriding log file from command line: {}", file);
            self.system.log_file = Some(file);
        }
    }
}
