// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! System settings
//!
//! Network binding, logging and scheduler cadence of the simulator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scalar settings of the `system` section.
///
/// # Example
///
/// ```
/// use modbus_simulator::config::SystemConfig;
///
/// let system = SystemConfig {
///     address: "0.0.0.0".to_string(),
///     port: 502,
///     ..SystemConfig::default()
/// };
/// assert_eq!(system.tick_interval_ms, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// The network address the Modbus server will bind to.
    ///
    /// Can be an IPv4/IPv6 address or a hostname. Default is "127.0.0.1".
    /// Use "0.0.0.0" to bind to all IPv4 interfaces.
    pub address: String,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Defaults to 5020 so the simulator runs without privileges; use 502 for
    /// the standard Modbus TCP port.
    pub port: u16,

    /// Log level: off, error, warn, info, debug or trace.
    pub log_level: String,

    /// Optional log file; logs go to stderr when unset.
    pub log_file: Option<String>,

    /// Milliseconds between two scheduler ticks.
    pub tick_interval_ms: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5020,
            log_level: "info".to_string(),
            log_file: None,
            tick_interval_ms: 50,
        }
    }
}

impl SystemConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Parsed log level, `None` if the configured text is not a level name.
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        self.log_level.parse().ok()
    }
}
