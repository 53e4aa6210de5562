// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Scheduler
//!
//! The [`Simulator`] owns the dynamic value table and drives the value engine
//! on a fixed cadence. It has two states:
//!
//! * `Initializing`: fixed values are written once to the address space and
//!   dynamic generators are inserted into the table.
//! * `Running`: the endless tick loop. Each tick captures `now`, computes the
//!   time elapsed since the simulator started running, updates the due
//!   registers then the due coils, and sleeps for the tick interval.
//!
//! The loop reads a monotonic clock: `now` is the number of seconds since the
//! loop started, so stepping the wall clock back or forth never stalls or
//! bursts the generators.
//!
//! Ticks never overlap: the next one starts only after every write of the
//! previous one returned. The tick interval is the sampling resolution and is
//! independent of any generator period; periods should be several times
//! longer than the interval.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::{self, Instant};

use super::engine::{TickReport, ValueEngine};
use super::generator::{CoilSpec, GeneratorTables, RegisterSpec};
use super::table::DynamicValueTable;
use crate::modbus::AddressSpace;

/// Default sampling resolution of the tick loop.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle of the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Initializing,
    Running,
}

/// Count of addresses set up by [`Simulator::load`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub fixed_registers: usize,
    pub dynamic_registers: usize,
    pub fixed_coils: usize,
    pub dynamic_coils: usize,
}

/// Drives the value engine over the dynamic value table.
pub struct Simulator<R = StdRng> {
    state: SimulatorState,
    table: DynamicValueTable,
    engine: ValueEngine<R>,
    space: Arc<dyn AddressSpace>,
    tick_interval: Duration,
    started_at: f64,
}

impl Simulator<StdRng> {
    pub fn new(space: Arc<dyn AddressSpace>, tick_interval: Duration) -> Self {
        Self::with_engine(space, tick_interval, ValueEngine::new())
    }
}

impl<R: Rng> Simulator<R> {
    pub fn with_engine(
        space: Arc<dyn AddressSpace>,
        tick_interval: Duration,
        engine: ValueEngine<R>,
    ) -> Self {
        Self {
            state: SimulatorState::Initializing,
            table: DynamicValueTable::new(),
            engine,
            space,
            tick_interval,
            started_at: 0.0,
        }
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn table(&self) -> &DynamicValueTable {
        &self.table
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Write fixed values to the address space and register dynamic generators.
    ///
    /// Dynamic addresses are not written here: the address space already holds
    /// 0/false, which is also the initial generator value, and the first tick
    /// always refreshes them.
    pub fn load(&mut self, tables: &GeneratorTables) -> LoadSummary {
        let mut summary = LoadSummary::default();

        for (&address, spec) in &tables.registers {
            match spec {
                RegisterSpec::Fixed(value) => {
                    info!("Setting fixed register {} to {}", address, value);
                    // Fixed words may exceed i16::MAX; store the raw bits
                    if let Err(e) = self.space.set_holding_registers(address, &[*value as i16]) {
                        warn!("Failed to set fixed register {}: {}", address, e);
                    }
                    summary.fixed_registers += 1;
                }
                RegisterSpec::Dynamic(kind) => {
                    info!("Setting changing register {} to {:?}", address, kind);
                    self.table.insert_register(address, *kind);
                    summary.dynamic_registers += 1;
                }
            }
        }

        for (&address, spec) in &tables.coils {
            match spec {
                CoilSpec::Fixed(value) => {
                    info!("Setting fixed coil {} to {}", address, *value as u8);
                    if let Err(e) = self.space.set_coils(address, &[*value]) {
                        warn!("Failed to set fixed coil {}: {}", address, e);
                    }
                    summary.fixed_coils += 1;
                }
                CoilSpec::Dynamic(kind) => {
                    info!("Setting changing coil {} to {:?}", address, kind);
                    self.table.insert_coil(address, *kind);
                    summary.dynamic_coils += 1;
                }
            }
        }

        summary
    }

    /// Enter the running state; `now` becomes the origin of the sine phase.
    pub fn start(&mut self, now: f64) {
        if self.state == SimulatorState::Running {
            return;
        }
        self.started_at = now;
        self.state = SimulatorState::Running;
        info!(
            "Simulator running: {} dynamic register(s), {} dynamic coil(s), tick every {:?}",
            self.table.register_count(),
            self.table.coil_count(),
            self.tick_interval
        );
    }

    /// Run one tick at timestamp `now`.
    ///
    /// Timestamps are seconds on a clock that never goes backwards; `now`
    /// must not be smaller than the one given to any previous tick.
    pub fn tick_at(&mut self, now: f64) -> TickReport {
        let elapsed = now - self.started_at;
        let report = self
            .engine
            .tick(&mut self.table, self.space.as_ref(), now, elapsed);
        if report.registers_updated + report.coils_updated > 0 {
            debug!("Tick at +{:.3}s: {:?}", elapsed, report);
        }
        report
    }

    /// Tick forever at the configured cadence.
    ///
    /// There is no way out of the running state; the loop ends only when the
    /// future is dropped or the process terminates.
    pub async fn run(mut self) {
        let origin = Instant::now();
        self.start(0.0);
        loop {
            self.tick_at(origin.elapsed().as_secs_f64());
            time::sleep(self.tick_interval).await;
        }
    }
}
