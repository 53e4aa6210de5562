// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! Starting the simulator happens in a fixed order:
//!
//! 1. Every generator spec is parsed; a malformed one aborts the startup.
//! 2. Fixed values are written to the data bank and dynamic generators are
//!    loaded into the simulator.
//! 3. The Modbus server binds its listener; failing to listen aborts the startup.
//! 4. The tick loop is spawned and runs until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::modbus::{ModbusDataBank, ModbusServerHandle};
use crate::simulation::Simulator;

/// Owns the background tasks of a running simulator.
pub struct Daemon {
    bank: Arc<ModbusDataBank>,
    server: Option<ModbusServerHandle>,
    simulation: Option<JoinHandle<()>>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    pub fn new() -> Self {
        Daemon {
            bank: Arc::new(ModbusDataBank::new()),
            server: None,
            simulation: None,
        }
    }

    /// Data bank served to Modbus clients and written by the simulation.
    pub fn data_bank(&self) -> Arc<ModbusDataBank> {
        self.bank.clone()
    }

    /// Address the Modbus server is listening on, once launched.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ModbusServerHandle::local_addr)
    }

    /// Launch the Modbus server and the simulation tick loop.
    ///
    /// # Errors
    ///
    /// This function can fail if:
    /// * A register or coil generator spec is malformed
    /// * The server fails to bind to the configured address/port
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        info!("Modbus simulator startup");

        let tables = config
            .generator_tables()
            .context("Invalid generator specification")?;

        let mut simulator = Simulator::new(self.bank.clone(), config.system.tick_interval());
        let summary = simulator.load(&tables);
        info!(
            "Loaded {} fixed and {} changing register(s), {} fixed and {} changing coil(s)",
            summary.fixed_registers,
            summary.dynamic_registers,
            summary.fixed_coils,
            summary.dynamic_coils
        );

        let server = ModbusServerHandle::start(
            &config.system.address,
            config.system.port,
            self.bank.clone(),
        )
        .await
        .map_err(|e| {
            error!("Failed to start Modbus server: {}", e);
            e
        })?;
        self.server = Some(server);

        self.simulation = Some(tokio::spawn(simulator.run()));
        info!("Modbus simulator started");
        Ok(())
    }

    /// Stop the tick loop and the Modbus server
    pub fn shutdown(&mut self) {
        info!("Shutting down simulator tasks");
        if let Some(task) = &self.simulation {
            task.abort();
        }
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
    }

    /// Wait for the tick loop to finish after [`Daemon::shutdown`]
    pub async fn join(self) -> Result<()> {
        if let Some(task) = self.simulation {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Err(e)) if e.is_panic() => error!("Simulation task panicked: {}", e),
                Ok(_) => info!("Simulation stopped"),
                Err(_) => warn!("Simulation shutdown timed out"),
            }
        }
        Ok(())
    }
}
